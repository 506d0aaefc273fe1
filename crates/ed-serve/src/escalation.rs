use crate::{AppState, with_dispatcher};
use ed_core::RequestContext;
use ed_core::types::{RequestId, RequestStatus};
use ed_events::types::EventSource;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Drains fired deadlines. Each expiry re-checks the stored state, so a
/// deadline that lost the race to an accept is a no-op.
pub async fn run_deadlines(state: AppState, mut fired: UnboundedReceiver<RequestId>) {
    while let Some(id) = fired.recv().await {
        let ctx = RequestContext::new(EventSource::Escalator, None);
        let request_id = id.clone();
        match with_dispatcher(&state, move |dispatcher| {
            dispatcher.emergencies().expire(&ctx, &request_id)
        })
        .await
        {
            Ok(request) if request.status == RequestStatus::Escalated => {
                tracing::debug!(request_id = %id, "deadline handled");
            }
            Ok(request) => {
                tracing::debug!(request_id = %id, status = %request.status, "deadline ignored");
            }
            Err(err) => tracing::warn!(request_id = %id, error = %err, "deadline expiry failed"),
        }
    }
    tracing::info!("deadline channel closed");
}

/// Periodically escalates dispatched requests whose stored deadline passed
/// without a live timer, e.g. after a restart.
pub async fn run_sweep(state: AppState) {
    let every = state.runtime.config.sweep_interval.max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let ctx = RequestContext::new(EventSource::Escalator, None);
        match with_dispatcher(&state, move |dispatcher| {
            dispatcher.emergencies().sweep_expired(&ctx)
        })
        .await
        {
            Ok(escalated) if !escalated.is_empty() => {
                tracing::info!(count = escalated.len(), "sweep escalated overdue requests");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "sweep failed"),
        }
    }
}
