// crates/server/src/routes/inventory.rs
//! Inventory generation as a server-sent event stream.
//!
//! - POST /generate-inventory: start a job and stream its events

use std::convert::Infallible;
use std::sync::Arc;

use ari_web_core::GenerateInventoryBody;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::broadcast::error::RecvError;

use crate::events::EventPublisher;
use crate::jobs::spawn_job;
use crate::state::AppState;

/// POST /api/generate-inventory: run a job and stream its events.
///
/// Malformed JSON is rejected by the extractor before any stream opens.
/// The stream ends after the job's terminal event; dropping it early
/// marks the client as gone.
pub async fn generate_inventory(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateInventoryBody>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (publisher, rx) = EventPublisher::channel(state.config.event_buffer);
    let job_id = spawn_job(Arc::clone(&state.job_context), &state.jobs, body, publisher);
    tracing::info!(job_id = %job_id, "inventory job accepted");

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield Ok(event.to_sse());
                    if terminal {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %job_id, skipped, "slow client, dropped oldest job events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build the inventory router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate-inventory", post(generate_inventory))
}
