pub mod escalation;
pub mod middleware;
pub mod notify;
pub mod openapi;
pub mod routes;
pub mod sse;

use axum::Router;
use axum::http::Request;
use ed_core::types::RequestId;
use ed_core::escalator::TimeoutEscalator;
use ed_core::{DispatchConfig, Dispatcher, EngineError, Runtime};
use ed_db::schema;
use ed_db::store::DbStore;
use ed_events::bus::EventBus;
use middleware::correlation::CorrelationId;
use notify::NotificationSink;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub db_path: String,
    pub runtime: Runtime,
}

impl AppState {
    /// Migrates the database and wires a runtime onto the current tokio
    /// runtime. The receiver yields request ids whose response window ran out.
    pub fn new(
        db_path: impl Into<String>,
        config: DispatchConfig,
    ) -> Result<(Self, UnboundedReceiver<RequestId>), EngineError> {
        let db_path = db_path.into();
        schema::open_and_migrate(&db_path).map_err(EngineError::store)?;
        let (escalator, fired) = TimeoutEscalator::current();
        let runtime = Runtime::new(config, EventBus::new(EVENT_BUS_CAPACITY), escalator);
        Ok((Self { db_path, runtime }, fired))
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.runtime.event_bus
    }
}

pub fn build_dispatcher(state: &AppState) -> Result<Dispatcher<DbStore>, EngineError> {
    let store = DbStore::open(&state.db_path)?;
    Ok(Dispatcher::new(store, state.runtime.clone()))
}

/// Runs `f` against a fresh dispatcher on the blocking pool. Request locks
/// and SQLite both block the calling thread.
pub async fn with_dispatcher<T, F>(state: &AppState, f: F) -> Result<T, EngineError>
where
    F: FnOnce(&Dispatcher<DbStore>) -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || {
        let dispatcher = build_dispatcher(&state)?;
        f(&dispatcher)
    })
    .await
    .map_err(EngineError::internal)?
}

pub fn correlation_id_from_request<B>(request: &Request<B>) -> Option<String> {
    request
        .extensions()
        .get::<CorrelationId>()
        .map(|value| value.0.clone())
}

pub fn app(state: AppState) -> Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Starts the background loops and serves the API until the listener fails.
pub async fn serve(
    state: AppState,
    fired: UnboundedReceiver<RequestId>,
    sink: Arc<dyn NotificationSink>,
    addr: std::net::SocketAddr,
) -> Result<(), std::io::Error> {
    tokio::spawn(notify::run(state.event_bus().subscribe(), sink));
    tokio::spawn(escalation::run_deadlines(state.clone(), fired));
    tokio::spawn(escalation::run_sweep(state.clone()));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, db_path = %state.db_path, "emergency dispatch listening");
    axum::serve(listener, app(state)).await
}
