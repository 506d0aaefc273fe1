use crate::error::EngineError;
use crate::types::io::UpsertWorkerInput;
use crate::types::{ServiceId, WorkerId, WorkerSnapshot};

pub trait AvailabilityRepository {
    /// Available workers, optionally only those offering `service`.
    fn available(&self, service: Option<&ServiceId>) -> Result<Vec<WorkerSnapshot>, EngineError>;
    fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerSnapshot>, EngineError>;
    fn upsert(
        &self,
        worker_id: &WorkerId,
        input: UpsertWorkerInput,
    ) -> Result<WorkerSnapshot, EngineError>;
}
