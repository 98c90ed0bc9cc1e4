//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the protection components from config
//! - Create the Axum router and wire the middleware chain
//! - Run the server with graceful shutdown
//! - Own the session sweep and protection janitor lifecycles

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{CorsConfig, ServerConfig};
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::security::{
    auth::auth_middleware, enumeration::enumeration_guard_middleware, headers::InvalidHeader,
    rate_limit::rate_limit_middleware, EnumerationProtection, ProtectionJanitor,
    SecurityHeadersLayer, ServerToken, TokenBucketRateLimiter,
};
use crate::session::{RemoteSession, SessionManager};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Headers(#[from] InvalidHeader),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager<RemoteSession>>,
    pub kimai_url: Arc<str>,
}

/// Remote MCP server with its protection layer.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    sessions: Arc<SessionManager<RemoteSession>>,
    limiter: Arc<TokenBucketRateLimiter>,
    enumeration: Arc<EnumerationProtection>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, token: ServerToken) -> Result<Self, ServerError> {
        let sessions = Arc::new(SessionManager::new(config.sessions.clone()));
        let limiter = Arc::new(TokenBucketRateLimiter::new(config.rate_limit.clone()));
        let enumeration = Arc::new(EnumerationProtection::from_config(&config.enumeration));

        let state = AppState {
            sessions: sessions.clone(),
            kimai_url: Arc::from(config.kimai.base_url.as_str()),
        };

        let router = Self::build_router(&config, state, token, limiter.clone(), enumeration.clone())?;
        Ok(Self {
            router,
            config,
            sessions,
            limiter,
            enumeration,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: trace → security headers → CORS → timeout →
    /// rate limit → enumeration guard → (auth) → handler.
    #[allow(deprecated)]
    fn build_router(
        config: &ServerConfig,
        state: AppState,
        token: ServerToken,
        limiter: Arc<TokenBucketRateLimiter>,
        enumeration: Arc<EnumerationProtection>,
    ) -> Result<Router, ServerError> {
        let authenticated = Router::new()
            .route("/sse", get(handlers::sse_connect))
            .route("/messages", post(handlers::post_message))
            .route_layer(middleware::from_fn_with_state(token, auth_middleware));

        let router = Router::new()
            .route("/health", get(handlers::health))
            .merge(authenticated)
            .fallback(handlers::fallback)
            .with_state(state)
            .layer(middleware::from_fn_with_state(enumeration, enumeration_guard_middleware))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(cors_layer(&config.cors))
            .layer(SecurityHeadersLayer::with_extra_headers(
                &config.security.extra_headers,
            )?)
            .layer(TraceLayer::new_for_http());

        Ok(router)
    }

    /// Router for in-process use (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager<RemoteSession>> {
        self.sessions.clone()
    }

    pub fn rate_limiter(&self) -> Arc<TokenBucketRateLimiter> {
        self.limiter.clone()
    }

    pub fn enumeration(&self) -> Arc<EnumerationProtection> {
        self.enumeration.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.sessions.start().await;

        let janitor = ProtectionJanitor::new(
            self.limiter.clone(),
            self.enumeration.clone(),
            self.config.rate_limit.cleanup_interval(),
        );
        tokio::spawn(janitor.run(shutdown.subscribe()));

        // Open SSE streams would hold graceful shutdown forever; close them first.
        let sessions = self.sessions.clone();
        let mut signal = shutdown.subscribe();
        let drain = async move {
            let _ = signal.recv().await;
            sessions.stop().await;
            let closed = sessions.close_all().await;
            tracing::info!(closed, "Closed remaining sessions");
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(drain)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
