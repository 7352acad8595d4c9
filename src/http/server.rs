//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all /proxy handlers
//! - Wire up middleware (request ID, tracing, whole-request timeout)
//! - Spawn the cache sweeper alongside the accept loop
//! - Serve with graceful shutdown

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::http::handlers;
use crate::proxy::ProxyService;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ProxyService,
}

/// HTTP server for the resilient proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    service: ProxyService,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let service = ProxyService::new(config.clone());
        let state = AppState {
            service: service.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            service,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/proxy/fetch", get(handlers::fetch))
            .route("/proxy/invalidate", post(handlers::invalidate))
            .route("/proxy/health", get(handlers::health))
            .route("/proxy/stats", get(handlers::stats))
            .route("/proxy/circuit/reset", post(handlers::circuit_reset))
            .route("/proxy/execute", post(handlers::execute))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(axum::middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = self.service.clone();
        let sweeper_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            sweeper.run_sweeper(sweeper_shutdown).await;
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Get a handle to the underlying service.
    pub fn service(&self) -> ProxyService {
        self.service.clone()
    }
}

/// Assign (or propagate) an `x-request-id` and echo it on the response.
async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert("x-request-id", value);
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Wait for Ctrl+C or a programmatic shutdown signal.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received");
        }
        _ = shutdown.recv() => {
            tracing::info!("Shutdown signal received");
        }
    }
}
