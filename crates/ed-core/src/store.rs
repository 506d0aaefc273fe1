use crate::EngineError;
use crate::attempts::{AttemptRepository, DispatchLogRepository};
use crate::events::EventRepository;
use crate::requests::RequestRepository;
use crate::workers::AvailabilityRepository;

pub trait Store {
    type Requests<'a>: RequestRepository
    where
        Self: 'a;
    type Attempts<'a>: AttemptRepository
    where
        Self: 'a;
    type DispatchLog<'a>: DispatchLogRepository
    where
        Self: 'a;
    type Workers<'a>: AvailabilityRepository
    where
        Self: 'a;
    type Events<'a>: EventRepository
    where
        Self: 'a;

    fn requests(&self) -> Self::Requests<'_>;
    fn attempts(&self) -> Self::Attempts<'_>;
    fn dispatch_log(&self) -> Self::DispatchLog<'_>;
    fn workers(&self) -> Self::Workers<'_>;
    fn events(&self) -> Self::Events<'_>;

    fn with_tx<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Self) -> Result<T, EngineError>;
}
