//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, panic recovery, metrics,
//!   timeout, admission, body limit)
//! - Hand the router to the shutdown coordinator, which owns the accept loop
//! - Run the limiter's eviction sweep for the lifetime of the server

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::http::request::{track_metrics, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::http::{healthcheck, movies, users};
use crate::lifecycle::{ShutdownCoordinator, ShutdownError, ShutdownReport};
use crate::mailer::Mailer;
use crate::models::{Movie, User};
use crate::net::Listener;
use crate::resilience::RetryPolicy;
use crate::security::{admission_middleware, RateLimiter};
use crate::store::MemoryStore;
use crate::tasks::BackgroundTasks;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub limiter: Arc<RateLimiter>,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub tasks: BackgroundTasks,
    pub movies: Arc<MemoryStore<Movie>>,
    pub users: Arc<MemoryStore<User>>,
    pub mailer: Arc<dyn Mailer>,
    /// Schedule for re-read-and-retry on edit conflicts.
    pub conflict_retry: RetryPolicy,
}

/// HTTP server for the API.
pub struct HttpServer {
    state: AppState,
    router: Router,
}

impl HttpServer {
    pub fn new(config: ApiConfig, coordinator: Arc<ShutdownCoordinator>, mailer: Arc<dyn Mailer>) -> Self {
        let state = AppState {
            limiter: Arc::new(RateLimiter::new(config.admission.clone())),
            tasks: coordinator.tasks().clone(),
            coordinator,
            movies: Arc::new(MemoryStore::new()),
            users: Arc::new(MemoryStore::new()),
            mailer,
            conflict_retry: RetryPolicy::default(),
            config: Arc::new(config),
        };
        let router = Self::build_router(state.clone());
        Self { state, router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers listed last run first: request id, trace span, panic
    /// recovery, metrics, timeout, then admission.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);
        let body_limit = state.config.limits.max_body_bytes;

        Router::new()
            .route("/v1/healthcheck", get(healthcheck::healthcheck))
            .route("/v1/movies", get(movies::list_movies).post(movies::create_movie))
            .route(
                "/v1/movies/{id}",
                get(movies::show_movie)
                    .patch(movies::update_movie)
                    .put(movies::replace_movie)
                    .delete(movies::delete_movie),
            )
            .route("/v1/users", axum::routing::post(users::register_user))
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(middleware::from_fn_with_state(state.clone(), admission_middleware))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(middleware::from_fn(track_metrics))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .with_state(state)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.state.limiter)
    }

    /// Serve until the coordinator finishes shutting down.
    pub async fn run(self, listener: Listener) -> Result<ShutdownReport, ShutdownError> {
        tracing::info!(
            environment = %self.state.config.environment,
            admission_enabled = self.state.limiter.is_enabled(),
            "HTTP server starting"
        );

        let sweeper = self.state.limiter.start_sweeper();
        let result = self.state.coordinator.serve(listener, self.router).await;
        sweeper.stop().await;

        tracing::info!("HTTP server stopped");
        result
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    let mut response = ApiError::Internal(format!("handler panicked: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AdmissionConfig;
    use crate::mailer::LogMailer;

    fn server(admission: AdmissionConfig) -> HttpServer {
        let config = ApiConfig {
            admission,
            ..ApiConfig::default()
        };
        let coordinator = Arc::new(ShutdownCoordinator::new(
            Duration::from_secs(1),
            BackgroundTasks::new(),
        ));
        HttpServer::new(config, coordinator, Arc::new(LogMailer))
    }

    fn request(method: Method, uri: &str, peer: Option<&str>) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn healthcheck_reports_environment() {
        let router = server(AdmissionConfig::default()).router();
        let (status, body) = send(&router, request(Method::GET, "/v1/healthcheck", Some("10.0.0.1:5000"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
        assert_eq!(body["system_info"]["environment"], "development");
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let router = server(AdmissionConfig::default()).router();
        let response = router
            .oneshot(request(Method::GET, "/v1/healthcheck", Some("10.0.0.1:5000")))
            .await
            .unwrap();
        assert!(response.headers().contains_key(&X_REQUEST_ID));
    }

    #[tokio::test]
    async fn exhausted_bucket_is_429_and_other_clients_pass() {
        let router = server(AdmissionConfig {
            burst: 2,
            requests_per_second: 0.01,
            ..AdmissionConfig::default()
        })
        .router();

        for _ in 0..2 {
            let (status, _) = send(&router, request(Method::GET, "/v1/healthcheck", Some("10.0.0.1:1"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(&router, request(Method::GET, "/v1/healthcheck", Some("10.0.0.1:2"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({ "error": "rate limit exceeded" }));

        let (status, _) = send(&router, request(Method::GET, "/v1/healthcheck", Some("10.0.0.2:1"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_peer_address_is_a_server_error_not_a_denial() {
        let router = server(AdmissionConfig::default()).router();
        let (status, _) = send(&router, request(Method::GET, "/v1/healthcheck", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn disabled_limiter_skips_key_extraction() {
        let server = server(AdmissionConfig {
            enabled: false,
            ..AdmissionConfig::default()
        });
        let router = server.router();
        let (status, _) = send(&router, request(Method::GET, "/v1/healthcheck", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(server.limiter().is_empty());
    }

    #[tokio::test]
    async fn draining_refuses_new_requests() {
        let server = server(AdmissionConfig::default());
        server.state().coordinator.trigger();

        let (status, _) = send(&server.router(), request(Method::GET, "/v1/healthcheck", Some("10.0.0.1:1"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_route_and_wrong_method() {
        let router = server(AdmissionConfig::default()).router();

        let (status, body) = send(&router, request(Method::GET, "/v1/nowhere", Some("10.0.0.1:1"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "the requested resource could not be found" }));

        let (status, body) = send(&router, request(Method::DELETE, "/v1/healthcheck", Some("10.0.0.1:1"))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "the DELETE method is not supported for this resource" }));
    }
}
