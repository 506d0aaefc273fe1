use crate::error::EngineError;
use ed_events::types::EventRecord;

pub trait EventRepository {
    /// Assigns `id` and `seq` and returns the stored record.
    fn append(&self, event: EventRecord) -> Result<EventRecord, EngineError>;
    fn list(&self, after: Option<i64>, limit: Option<u32>)
    -> Result<Vec<EventRecord>, EngineError>;
}
