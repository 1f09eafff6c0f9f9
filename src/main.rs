//! spanchunk server
//!
//! Run with: cargo run
//!
//! See [`spanchunk::config`] for the `SPANCHUNK_*` environment variables.
//! `RUST_LOG` sets the log level (default: spanchunk=info,tower_http=info).
//! With the `kafka` feature, `KAFKA_TOPICS` enables the Kafka consumer.

use spanchunk::api::run_server;
use spanchunk::config::{Config, StoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spanchunk=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("spanchunk configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Tenant: {}", config.writer.tenant);
    match &config.store {
        StoreConfig::Memory => tracing::info!("  Store: memory"),
        StoreConfig::Fs { data_dir } => tracing::info!("  Store: fs ({})", data_dir.display()),
    }
    tracing::info!(
        "  Static labels: {}",
        config
            .writer
            .static_labels
            .iter()
            .map(|l| format!("{}={}", l.name, l.value))
            .collect::<Vec<_>>()
            .join(",")
    );
    tracing::info!("  Reference instant: {}", config.writer.reference_instant.as_str());
    tracing::info!("  On store error: {}", config.writer.on_store_error.as_str());
    tracing::info!(
        "  Encoding: {} ({} KB blocks)",
        config.writer.encoding.as_str(),
        config.writer.block_size / 1024
    );
    tracing::info!("  Line template: {}", config.writer.line_template.as_str());

    println!(
        r#"
                                  _                 _
  ___ _ __   __ _ _ __   ___| |__  _   _ _ __ | | __
 / __| '_ \ / _` | '_ \ / __| '_ \| | | | '_ \| |/ /
 \__ \ |_) | (_| | | | | (__| | | | |_| | | | |   <
 |___/ .__/ \__,_|_| |_|\___|_| |_|\__,_|_| |_|_|\_\
     |_|

 Tracing spans as compressed log chunks
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
