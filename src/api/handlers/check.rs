//! Check endpoint
//!
//! Validates the request, then streams progress events over SSE while a
//! spawned scheduler task works through the proxy list. The run always
//! processes the full list, even if the consumer disconnects.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::api::server::AppState;
use crate::checker::{Prober, Scheduler};
use crate::error::{PulseError, Result};
use crate::models::{CheckRequest, ProxyAddress};

/// Buffered events between the scheduler task and the SSE stream
const EVENT_BUFFER: usize = 256;

/// `POST /api/check` — start a verification run and stream its events
pub async fn start_check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    if request.proxies.is_empty() {
        return Err(PulseError::InvalidRequest("proxy list is empty".into()));
    }

    let proxies = ProxyAddress::parse_lines(&request.proxies);
    if proxies.is_empty() {
        return Err(PulseError::NoValidProxies);
    }

    let config = Arc::new(request.resolve(&state.config.checker));
    // An unusable target URL is rejected before any event is streamed.
    let prober = Arc::new(Prober::new(config.clone())?);

    info!(
        proxies = proxies.len(),
        rounds = config.round_count,
        target = %config.target_url,
        "Accepted check request"
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let window_size = state.config.checker.window_size;
    tokio::spawn(async move {
        let scheduler = Scheduler::new(config, window_size, tx);
        scheduler.run(prober, proxies).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
