use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const SERVICES: &[&str] = &["api", "auth", "db", "cache", "worker", "scheduler", "gateway", "storage"];
const OPERATIONS: &[&str] = &["GET /users", "POST /orders", "SELECT", "UPDATE", "cache.get", "cache.set", "auth.verify", "queue.publish"];
const STATUS_CODES: &[i64] = &[200, 201, 204, 400, 401, 404, 429, 500, 502, 503];
const HOSTS: &[&str] = &["web-1", "web-2", "web-3", "db-1", "db-2", "cache-1"];

fn generate_spans(count: usize, rng: &mut StdRng) -> Value {
    let now = chrono::Utc::now();

    let spans: Vec<Value> = (0..count)
        .map(|_| {
            let start = now - chrono::Duration::milliseconds(rng.gen_range(0..60_000));
            json!({
                "traceId": format!("{:032x}", rng.gen::<u128>()),
                "spanId": format!("{:016x}", rng.gen::<u64>()),
                "operationName": OPERATIONS[rng.gen_range(0..OPERATIONS.len())],
                "startTime": start.to_rfc3339(),
                // Mostly short spans with a long tail
                "duration": if rng.gen_bool(0.05) {
                    rng.gen_range(1_000_000..30_000_000)
                } else {
                    rng.gen_range(100..500_000)
                },
                "tags": [
                    {"key": "http.status_code", "value": STATUS_CODES[rng.gen_range(0..STATUS_CODES.len())]},
                    {"key": "host", "value": HOSTS[rng.gen_range(0..HOSTS.len())]}
                ],
                "processId": "p1",
                "process": {"serviceName": SERVICES[rng.gen_range(0..SERVICES.len())]}
            })
        })
        .collect();

    json!({ "spans": spans })
}

struct LoadStats {
    total_spans: usize,
    total_duration: Duration,
    batch_latencies: Vec<Duration>,
}

impl LoadStats {
    fn spans_per_sec(&self) -> f64 {
        self.total_spans as f64 / self.total_duration.as_secs_f64()
    }

    fn percentile(&self, p: usize) -> Duration {
        let mut sorted = self.batch_latencies.clone();
        sorted.sort();
        sorted
            .get((sorted.len() * p / 100).min(sorted.len().saturating_sub(1)))
            .copied()
            .unwrap_or_default()
    }

    fn avg_latency(&self) -> Duration {
        if self.batch_latencies.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.batch_latencies.iter().sum();
        sum / self.batch_latencies.len() as u32
    }
}

async fn post_batch(client: &Client, url: &str, body: Value) -> Result<Duration, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let response = client.post(url).json(&body).send().await?;

    if !response.status().is_success() {
        return Err(format!("{}: {}", response.status(), response.text().await?).into());
    }
    Ok(start.elapsed())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let spans_per_batch: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(500);
    let num_batches: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let concurrency: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(4).max(1);
    let host = std::env::var("SPANCHUNK_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("SPANCHUNK_PORT").unwrap_or_else(|_| "8080".to_string());
    let base_url = format!("http://{}:{}", host, port);
    let ingest_url = format!("{}/api/spans", base_url);

    println!("spanchunk load generator");
    println!("========================");
    println!("Target:          {}", base_url);
    println!("Spans per batch: {}", spans_per_batch);
    println!("Batches:         {}", num_batches);
    println!("Concurrency:     {}", concurrency);
    println!();

    let client = Client::new();
    let mut rng = StdRng::seed_from_u64(12345);
    let mut batch_latencies = Vec::with_capacity(num_batches);
    let start = Instant::now();

    let mut remaining = num_batches;
    while remaining > 0 {
        let wave = remaining.min(concurrency);
        let bodies: Vec<Value> = (0..wave)
            .map(|_| generate_spans(spans_per_batch, &mut rng))
            .collect();

        let results = join_all(
            bodies
                .into_iter()
                .map(|body| post_batch(&client, &ingest_url, body)),
        )
        .await;

        for result in results {
            match result {
                Ok(latency) => batch_latencies.push(latency),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(());
                }
            }
        }
        remaining -= wave;
    }

    let stats = LoadStats {
        total_spans: spans_per_batch * num_batches,
        total_duration: start.elapsed(),
        batch_latencies,
    };

    println!("Spans/sec:   {:.0}", stats.spans_per_sec());
    println!("Total time:  {:?}", stats.total_duration);
    println!(
        "Latency:     avg={:?} p50={:?} p99={:?}",
        stats.avg_latency(),
        stats.percentile(50),
        stats.percentile(99)
    );
    println!();

    let resp: Value = client
        .get(format!("{}/stats", base_url))
        .send()
        .await?
        .json()
        .await?;

    println!("Server Statistics:");
    println!("  Tenant:         {}", resp["tenant"].as_str().unwrap_or("?"));
    println!("  Store:          {}", resp["store"].as_str().unwrap_or("?"));
    println!("  Spans:          {}", resp["spans"]);
    println!("  Chunks written: {}", resp["chunks_written"]);
    println!("  Store failures: {}", resp["store_failures"]);

    Ok(())
}
