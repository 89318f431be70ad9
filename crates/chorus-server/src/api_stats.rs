//! Service statistics: in-memory counters surfaced by `GET /stats`.

use crate::AppState;
use axum::{
    body::Body,
    extract::Extension,
    http::Request,
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic counters for the lifetime of the process.
#[derive(Debug)]
pub struct ServiceStats {
    started: Instant,
    pub requests_total: AtomicU64,
    pub audio_requests: AtomicU64,
    pub text_requests: AtomicU64,
    pub broadcast_requests: AtomicU64,
    pub pipeline_errors: AtomicU64,
    pub ws_connections_total: AtomicU64,
    pub ws_messages_in: AtomicU64,
    pub ws_messages_out: AtomicU64,
    /// Cumulative pipeline stage time, microseconds.
    pub stt_micros: AtomicU64,
    pub ai_micros: AtomicU64,
    pub tts_micros: AtomicU64,
    pub pipeline_runs: AtomicU64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_total: AtomicU64::new(0),
            audio_requests: AtomicU64::new(0),
            text_requests: AtomicU64::new(0),
            broadcast_requests: AtomicU64::new(0),
            pipeline_errors: AtomicU64::new(0),
            ws_connections_total: AtomicU64::new(0),
            ws_messages_in: AtomicU64::new(0),
            ws_messages_out: AtomicU64::new(0),
            stt_micros: AtomicU64::new(0),
            ai_micros: AtomicU64::new(0),
            tts_micros: AtomicU64::new(0),
            pipeline_runs: AtomicU64::new(0),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Records stage timings for one successful pipeline run.
    pub fn record_pipeline(&self, output: &chorus_voice::PipelineOutput) {
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        if let Some(stt) = output.stt_duration {
            self.stt_micros
                .fetch_add((stt * 1e6) as u64, Ordering::Relaxed);
        }
        self.ai_micros
            .fetch_add((output.ai_duration * 1e6) as u64, Ordering::Relaxed);
        self.tts_micros
            .fetch_add((output.tts_duration * 1e6) as u64, Ordering::Relaxed);
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

fn avg_secs(total_micros: u64, runs: u64) -> f64 {
    if runs == 0 {
        0.0
    } else {
        total_micros as f64 / runs as f64 / 1e6
    }
}

/// Middleware counting every request hitting the service.
pub async fn count_requests(req: Request<Body>, next: Next) -> Response {
    if let Some(state) = req.extensions().get::<Arc<AppState>>() {
        state.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    }
    next.run(req).await
}

/// Handler for `GET /stats`.
pub async fn stats_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let stats = &state.stats;
    let runs = stats.pipeline_runs.load(Ordering::Relaxed);

    let connections = state.connection_manager.connection_summaries().await;

    Json(json!({
        "service": "chorus",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": stats.uptime_secs(),
        "requests": {
            "total": stats.requests_total.load(Ordering::Relaxed),
            "process_audio": stats.audio_requests.load(Ordering::Relaxed),
            "process_text": stats.text_requests.load(Ordering::Relaxed),
            "tts_broadcast": stats.broadcast_requests.load(Ordering::Relaxed),
            "pipeline_errors": stats.pipeline_errors.load(Ordering::Relaxed),
        },
        "pipeline": {
            "runs": runs,
            "avg_stt_secs": avg_secs(stats.stt_micros.load(Ordering::Relaxed), runs),
            "avg_ai_secs": avg_secs(stats.ai_micros.load(Ordering::Relaxed), runs),
            "avg_tts_secs": avg_secs(stats.tts_micros.load(Ordering::Relaxed), runs),
        },
        "websocket": {
            "active_connections": state.connection_manager.active_count().await,
            "total_connections": stats.ws_connections_total.load(Ordering::Relaxed),
            "messages_received": stats.ws_messages_in.load(Ordering::Relaxed),
            "messages_sent": stats.ws_messages_out.load(Ordering::Relaxed),
            "connections": connections,
        },
        "conversations": state.pipeline.ai().conversation_count().await,
        "voices": state.catalog.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_handles_zero_runs() {
        assert_eq!(avg_secs(1_000_000, 0), 0.0);
        assert!((avg_secs(1_000_000, 2) - 0.5).abs() < 1e-9);
    }
}
