use ed_core::types::{EventBody, RequestId, RequestStatus, Urgency, WorkerId};
use ed_events::types::EventRecord;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;

/// Outbound notifications. Delivery is best effort; failures stay inside
/// the sink and never reach the dispatch path.
pub trait NotificationSink: Send + Sync {
    fn notify_candidate(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
        distance_km: f64,
        urgency: Urgency,
    );

    fn dispatch_status_changed(&self, request_id: &RequestId, status: RequestStatus);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify_candidate(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
        distance_km: f64,
        urgency: Urgency,
    ) {
        tracing::info!(
            request_id = %request_id,
            worker_id = %worker_id,
            distance_km,
            urgency = %urgency,
            "notify candidate"
        );
    }

    fn dispatch_status_changed(&self, request_id: &RequestId, status: RequestStatus) {
        tracing::info!(request_id = %request_id, status = %status, "dispatch status changed");
    }
}

/// Hands one journaled event to the sink. Returns false for events the sink
/// does not care about.
pub fn route(record: &EventRecord, sink: &dyn NotificationSink) -> bool {
    let body: EventBody = match serde_json::from_value(record.body.clone()) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(seq = record.seq, error = %err, "undecodable event body");
            return false;
        }
    };
    match body {
        EventBody::CandidateNotified {
            request_id,
            worker_id,
            distance_km,
            urgency,
        } => {
            sink.notify_candidate(&request_id, &worker_id, distance_km, urgency);
            true
        }
        EventBody::DispatchStatusChanged { request_id, to, .. } => {
            sink.dispatch_status_changed(&request_id, to);
            true
        }
        _ => false,
    }
}

/// Relays bus events to `sink` until the bus closes.
pub async fn run(mut events: Receiver<EventRecord>, sink: Arc<dyn NotificationSink>) {
    loop {
        match events.recv().await {
            Ok(record) => {
                route(&record, sink.as_ref());
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notification relay lagged; notifications dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ed_events::types::EventSource;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl NotificationSink for Recording {
        fn notify_candidate(
            &self,
            request_id: &RequestId,
            worker_id: &WorkerId,
            distance_km: f64,
            urgency: Urgency,
        ) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("candidate {request_id} {worker_id} {distance_km} {urgency}"));
        }

        fn dispatch_status_changed(&self, request_id: &RequestId, status: RequestStatus) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("status {request_id} {status}"));
        }
    }

    fn record(body: &EventBody) -> EventRecord {
        EventRecord {
            id: "evt_1".to_string(),
            seq: 1,
            at: Utc::now(),
            correlation_id: None,
            source: EventSource::Requester,
            body: serde_json::to_value(body).unwrap(),
        }
    }

    #[test]
    fn routes_only_notification_events() {
        let sink = Recording::default();
        let request_id = RequestId::generate();
        let worker_id = WorkerId::new("w-1".to_string()).unwrap();

        let notified = EventBody::CandidateNotified {
            request_id: request_id.clone(),
            worker_id: worker_id.clone(),
            distance_km: 1.5,
            urgency: Urgency::High,
        };
        let changed =
            EventBody::status_changed(&request_id, RequestStatus::Queued, RequestStatus::Dispatched);
        let assigned = EventBody::WorkerAssigned {
            request_id: request_id.clone(),
            worker_id,
        };

        assert!(route(&record(&notified), &sink));
        assert!(route(&record(&changed), &sink));
        assert!(!route(&record(&assigned), &sink));

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], format!("candidate {request_id} w-1 1.5 high"));
        assert_eq!(calls[1], format!("status {request_id} dispatched"));
    }

    #[tokio::test]
    async fn relay_stops_when_the_bus_closes() {
        let bus = ed_events::bus::EventBus::new(8);
        let sink = Arc::new(Recording::default());
        let relay = tokio::spawn(run(bus.subscribe(), sink.clone()));

        let request_id = RequestId::generate();
        let changed =
            EventBody::status_changed(&request_id, RequestStatus::Open, RequestStatus::Queued);
        bus.publish(record(&changed)).unwrap();
        drop(bus);

        relay.await.unwrap();
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }
}
