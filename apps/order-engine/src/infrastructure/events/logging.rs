//! Structured-log sink for trade events.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventPublishError, TradeEvent};

/// Log one event as a JSON field. Rejections and stale data log at warn.
fn log_event(event: &TradeEvent) -> Result<(), EventPublishError> {
    let payload = serde_json::to_string(event).map_err(|e| EventPublishError::PublishFailed {
        message: e.to_string(),
    })?;
    match event {
        TradeEvent::OrderRejected { .. } | TradeEvent::StaleData { .. } => {
            tracing::warn!(event = %payload, "Trade event");
        }
        _ => tracing::info!(event = %payload, "Trade event"),
    }
    Ok(())
}

/// Drain a broadcast subscription into the log until `shutdown` is cancelled
/// or the channel closes.
pub async fn run_event_log(
    mut receiver: broadcast::Receiver<TradeEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    if let Err(e) = log_event(&event) {
                        tracing::warn!(error = %e, "Failed to log trade event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log lagged behind publishers");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
