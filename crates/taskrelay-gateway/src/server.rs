//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use taskrelay_core::config::RelayConfig;
use taskrelay_core::task::TaskType;
use taskrelay_core::traits::Providers;
use taskrelay_scheduler::{HandlerRegistry, TaskDb};

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<TaskDb>,
    /// Calendar adapters for the passthrough routes; the message channels
    /// are only used by the worker.
    pub providers: Providers,
    /// Submissions due within this many seconds are logged as immediate.
    pub immediate_threshold_secs: i64,
    /// Default Google calendar for routes without `calendar_id`.
    pub calendar_id: String,
    /// Default zone for Google events created over HTTP.
    pub calendar_timezone: String,
    /// Task types the configured providers can dispatch.
    pub dispatchable: Vec<TaskType>,
}

impl AppState {
    pub fn new(db: Arc<TaskDb>, providers: Providers, config: &RelayConfig) -> Self {
        let google = config.google.clone().unwrap_or_default();
        let dispatchable = HandlerRegistry::from_providers(&providers).types();
        Self {
            db,
            providers,
            dispatchable,
            immediate_threshold_secs: config.worker.immediate_threshold_secs,
            calendar_id: google.calendar_id,
            calendar_timezone: google.timezone,
        }
    }

    /// Whether a worker built from the same providers would pick up `task_type`.
    pub fn can_dispatch(&self, task_type: TaskType) -> bool {
        self.dispatchable.contains(&task_type)
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/", get(super::routes::health))
        // Intake
        .route("/tasks/", post(super::routes::create_task).get(super::routes::list_tasks))
        .route("/tasks/{id}", get(super::routes::get_task))
        // Google Calendar
        .route(
            "/calendar/events/",
            post(super::calendar::create_event).get(super::calendar::list_events),
        )
        .route("/calendar/events/schedule/", post(super::calendar::schedule_event))
        .route(
            "/calendar/events/{id}",
            get(super::calendar::get_event)
                .put(super::calendar::update_event)
                .delete(super::calendar::delete_event),
        )
        // Outlook Calendar
        .route(
            "/outlook/calendar/events/",
            post(super::outlook::create_event).get(super::outlook::list_events),
        )
        .route(
            "/outlook/calendar/events/schedule/",
            post(super::outlook::schedule_event),
        )
        .route(
            "/outlook/calendar/events/{id}",
            get(super::outlook::get_event)
                .put(super::outlook::update_event)
                .delete(super::outlook::delete_event),
        )
        .route(
            "/outlook/calendar/schedule/free-busy/",
            post(super::outlook::free_busy),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Serve the gateway on `host:port` until `shutdown` resolves.
pub async fn start<F>(host: &str, port: u16, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 TaskRelay gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("🛑 Gateway stopped");
    Ok(())
}
