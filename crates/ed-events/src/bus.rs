use crate::types::EventRecord;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Fails only when nobody is subscribed; callers treat that as delivered.
    pub fn publish(
        &self,
        event: EventRecord,
    ) -> Result<usize, broadcast::error::SendError<EventRecord>> {
        self.sender.send(event)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
