use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::ingest::{write_spans, ProcessError, SpanBatch};
use crate::model::otlp_json::ExportTraceServiceRequest;
use crate::model::Span;
use crate::writer::{WriteError, WriteStats, Writer};

/// Application state shared across handlers
pub struct AppState {
    pub writer: Arc<Writer>,
    pub store_name: &'static str,
    totals: Mutex<Totals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    requests: u64,
    spans: u64,
    writes: WriteStats,
}

impl AppState {
    pub fn new(writer: Arc<Writer>, store_name: &'static str) -> Self {
        Self {
            writer,
            store_name,
            totals: Mutex::new(Totals::default()),
        }
    }

    fn record(&self, spans: usize, stats: WriteStats) {
        let mut totals = self.totals.lock();
        totals.requests += 1;
        totals.spans += spans as u64;
        totals.writes += stats;
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_name,
    })
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub spans: usize,
    #[serde(flatten)]
    pub stats: WriteStats,
}

/// Native span batches: `{"spans": [...]}`
pub async fn ingest_spans(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<SpanBatch>,
) -> Result<Json<IngestResponse>, ApiError> {
    write_batch(state, batch.spans).await
}

/// OTLP/JSON trace export
pub async fn handle_otlp_traces(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportTraceServiceRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let spans = request
        .into_spans()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    write_batch(state, spans).await
}

async fn write_batch(state: Arc<AppState>, spans: Vec<Span>) -> Result<Json<IngestResponse>, ApiError> {
    let count = spans.len();
    let writer = Arc::clone(&state.writer);

    let stats = tokio::task::spawn_blocking(move || write_spans(&writer, &spans))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    state.record(count, stats);
    tracing::debug!(
        spans = count,
        chunks = stats.chunks_written,
        failures = stats.store_failures,
        "Ingested span batch"
    );

    Ok(Json(IngestResponse {
        spans: count,
        stats,
    }))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub tenant: String,
    pub store: &'static str,
    pub requests: u64,
    pub spans: u64,
    #[serde(flatten)]
    pub writes: WriteStats,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let totals = *state.totals.lock();

    Json(StatsResponse {
        tenant: state.writer.context().tenant.clone(),
        store: state.store_name,
        requests: totals.requests,
        spans: totals.spans,
        writes: totals.writes,
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Store(String),
    Internal(String),
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Parse(msg) => ApiError::BadRequest(msg),
            ProcessError::Write(e @ WriteError::Bucket(_)) => ApiError::BadRequest(e.to_string()),
            ProcessError::Write(e @ WriteError::Store { .. }) => ApiError::Store(e.to_string()),
            ProcessError::Write(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
