pub mod attempt_repo;
pub mod dispatch_log_repo;
pub mod event_repo;
pub mod request_repo;
pub mod schema;
pub mod store;
pub mod util;
pub mod worker_repo;

pub use crate::store::DbStore;
