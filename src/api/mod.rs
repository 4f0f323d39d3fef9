//! HTTP API for submitting and tracking training jobs.
//!
//! Routes:
//! - `GET  /` and `GET /health`: unauthenticated
//! - `POST /api/jobs/submit-job`, `GET /api/jobs`, `GET /api/jobs/summary`,
//!   `GET /api/jobs/{job_id}`, `PUT /api/jobs/{job_id}/status`: caller-scoped
//! - `GET  /api/admin/jobs`: service credential only

mod error;
mod handlers;
pub mod types;

pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post, put};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ServiceToken;
use crate::jobs::JobManager;

/// Shared state for the job API.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<JobManager>,
    /// Credential for the service tier (status callbacks and admin listing).
    pub service_token: ServiceToken,
    /// Accept submissions and reads from callers without a credential.
    pub allow_anonymous: bool,
}

/// Build the job API router.
pub fn router(state: ApiState) -> Router {
    let admin = Router::new()
        .route("/api/admin/jobs", get(handlers::list_all_jobs))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            handlers::service_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/jobs/submit-job", post(handlers::submit_job))
        .route("/api/jobs", get(handlers::list_jobs))
        .route("/api/jobs/", get(handlers::list_jobs))
        .route("/api/jobs/summary", get(handlers::job_summary))
        .route("/api/jobs/{job_id}", get(handlers::get_job))
        .route("/api/jobs/{job_id}/status", put(handlers::update_job_status))
        .merge(admin)
        .with_state(state)
}

/// CORS policy for the configured browser origins. Unparseable origins are
/// skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Router with CORS and request tracing applied.
pub fn app(state: ApiState, cors_origins: &[String]) -> Router {
    router(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// A running API server.
///
/// `start()` binds the listener and spawns the server task; `shutdown()`
/// stops accepting connections and waits for in-flight requests.
pub struct ApiServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub async fn start(addr: SocketAddr, app: Router) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Job API listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Job API shutting down");
                })
                .await
            {
                tracing::error!("Job API server error: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
