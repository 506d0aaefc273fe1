pub mod arbiter;
pub mod attempts;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod escalator;
pub mod events;
pub mod finder;
pub mod geo;
pub mod locks;
pub mod rate_limit;
pub mod requests;
pub mod store;
pub mod validation;
pub mod workers;

pub mod types;

pub use crate::config::DispatchConfig;
pub use crate::dispatcher::{Dispatcher, RequestContext, Runtime};
pub use crate::error::EngineError;
pub use crate::store::Store;
