//! HTTP surface for the Redraft editing session engine
//!
//! Exposes the engine's operations as a plain request/response JSON API.
//! Each route maps onto exactly one engine operation; the server adds no
//! behavior of its own beyond input decoding, status-code mapping, and the
//! usual middleware (request logging, CORS, tracing). Streaming is
//! deliberately absent: a send-message turn is one bounded round trip.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{Json as AxumJson, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use redraft_core::engine::{ApplyOutcome, SessionEngine};
use redraft_core::session::{Proposal, Session, SessionSummary, VersionSnapshot, VersionSummary};
use redraft_core::Usage;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the redraft server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".parse().unwrap(),
            enable_cors: true,
            cors_origins: None, // Allow any origin
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state containing the engine and configuration.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub config: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub subject_content_id: String,
    #[serde(default)]
    pub initial_content: String,
    #[serde(default)]
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(default)]
    pub auto_apply: bool,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub reply: String,
    /// The reply with any proposal fence removed, for direct display.
    pub prose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Proposal>,
    pub auto_applied: bool,
    pub total_usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ApplyChangesRequest {
    pub new_content: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyChangesResponse {
    pub version_count: usize,
    pub current_content: String,
}

impl From<ApplyOutcome> for ApplyChangesResponse {
    fn from(outcome: ApplyOutcome) -> Self {
        Self {
            version_count: outcome.version_count,
            current_content: outcome.current_content,
        }
    }
}

type HandlerResult<T> = std::result::Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

fn engine_err(e: redraft_core::EngineError) -> (StatusCode, Json<serde_json::Value>) {
    ServerError::from(e).into_response_parts()
}

/// Handler for the POST /sessions endpoint.
async fn create_session_handler(
    State(app_state): State<AppState>,
    AxumJson(request): AxumJson<CreateSessionRequest>,
) -> HandlerResult<Session> {
    log::info!(
        "create session request for subject: {}",
        request.subject_content_id
    );
    let session = app_state
        .engine
        .create_session(
            &request.subject_content_id,
            &request.initial_content,
            request.initial_prompt,
        )
        .await
        .map_err(engine_err)?;
    Ok(Json(session))
}

/// Handler for the GET /sessions/{id} endpoint.
async fn get_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<Session> {
    let session = app_state
        .engine
        .get_session(&session_id)
        .await
        .map_err(engine_err)?;
    Ok(Json(session))
}

/// Handler for the DELETE /sessions/{id} endpoint.
async fn delete_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    app_state
        .engine
        .delete_session(&session_id)
        .await
        .map_err(engine_err)?;
    log::info!("deleted session {}", session_id);
    Ok(Json(json!({
        "status": "deleted",
        "session_id": session_id,
        "timestamp": chrono::Utc::now(),
    })))
}

/// Handler for the POST /sessions/{id}/messages endpoint.
async fn send_message_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
    AxumJson(request): AxumJson<SendMessageRequest>,
) -> HandlerResult<SendMessageResponse> {
    log::info!(
        "send message to session {} (auto_apply: {})",
        session_id,
        request.auto_apply
    );
    let outcome = app_state
        .engine
        .send_message(&session_id, &request.text, request.auto_apply)
        .await
        .map_err(|e| {
            log::warn!("send message failed for session {}: {}", session_id, e);
            engine_err(e)
        })?;
    Ok(Json(SendMessageResponse {
        reply: outcome.reply,
        prose: outcome.prose,
        proposal: outcome.proposal,
        auto_applied: outcome.auto_applied,
        total_usage: outcome.total_usage,
    }))
}

/// Handler for the POST /sessions/{id}/apply endpoint.
async fn apply_changes_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
    AxumJson(request): AxumJson<ApplyChangesRequest>,
) -> HandlerResult<ApplyChangesResponse> {
    let outcome = app_state
        .engine
        .apply_changes(&session_id, &request.new_content, request.description)
        .await
        .map_err(engine_err)?;
    Ok(Json(outcome.into()))
}

/// Handler for the DELETE /sessions/{id}/proposal endpoint.
async fn discard_proposal_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<serde_json::Value> {
    app_state
        .engine
        .discard_proposal(&session_id)
        .await
        .map_err(engine_err)?;
    Ok(Json(json!({
        "status": "discarded",
        "session_id": session_id,
        "timestamp": chrono::Utc::now(),
    })))
}

/// Handler for the GET /sessions/{id}/versions endpoint.
async fn version_history_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<Vec<VersionSummary>> {
    let history = app_state
        .engine
        .get_version_history(&session_id)
        .await
        .map_err(engine_err)?;
    Ok(Json(history))
}

/// Handler for the GET /sessions/{id}/versions/{index} endpoint.
async fn version_content_handler(
    State(app_state): State<AppState>,
    Path((session_id, index)): Path<(String, usize)>,
) -> HandlerResult<VersionSnapshot> {
    let snapshot = app_state
        .engine
        .get_version_content(&session_id, index)
        .await
        .map_err(engine_err)?;
    Ok(Json(snapshot))
}

/// Handler for the POST /sessions/{id}/versions/{index}/revert endpoint.
async fn revert_handler(
    State(app_state): State<AppState>,
    Path((session_id, index)): Path<(String, usize)>,
) -> HandlerResult<ApplyChangesResponse> {
    log::info!("revert session {} to version {}", session_id, index);
    let outcome = app_state
        .engine
        .revert_to_version(&session_id, index)
        .await
        .map_err(engine_err)?;
    Ok(Json(outcome.into()))
}

/// Handler for the POST /sessions/{id}/complete endpoint.
async fn complete_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<SessionSummary> {
    let summary = app_state
        .engine
        .complete_session(&session_id)
        .await
        .map_err(engine_err)?;
    Ok(Json(summary))
}

/// The redraft HTTP server.
pub struct RedraftServer {
    engine: Arc<SessionEngine>,
    config: ServerConfig,
}

impl RedraftServer {
    /// Create a new server with the given engine and default configuration.
    pub fn new(engine: Arc<SessionEngine>) -> Self {
        Self {
            engine,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(engine: Arc<SessionEngine>, config: ServerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/sessions", post(create_session_handler))
            .route("/sessions/{id}", get(get_session_handler))
            .route("/sessions/{id}", delete(delete_session_handler))
            .route("/sessions/{id}/messages", post(send_message_handler))
            .route("/sessions/{id}/apply", post(apply_changes_handler))
            .route("/sessions/{id}/proposal", delete(discard_proposal_handler))
            .route("/sessions/{id}/versions", get(version_history_handler))
            .route(
                "/sessions/{id}/versions/{index}",
                get(version_content_handler),
            )
            .route(
                "/sessions/{id}/versions/{index}/revert",
                post(revert_handler),
            )
            .route("/sessions/{id}/complete", post(complete_session_handler))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();
                    log::info!("Response {} completed in {:?}", request_id, duration);

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => CorsLayer::permissive(),
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("redraft server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Sessions: http://{}/sessions", self.config.bind_addr);

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "redraft server starting on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("redraft server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use redraft_core::engine::EngineConfig;
    use redraft_core::generator::{CompletionGenerator, GenerationContext};
    use redraft_core::repository::InMemorySessionRepository;
    use redraft_core::{EngineError, Generation};
    use tower::ServiceExt; // for `oneshot`

    /// Always replies with the same canned text.
    struct StaticGenerator {
        reply: String,
    }

    #[async_trait]
    impl CompletionGenerator for StaticGenerator {
        async fn generate(
            &self,
            _context: GenerationContext,
        ) -> std::result::Result<Generation, EngineError> {
            Ok(Generation {
                reply: self.reply.clone(),
                usage: Some(Usage {
                    prompt_tokens: 5,
                    completion_tokens: 5,
                    total_tokens: 10,
                }),
            })
        }
    }

    fn test_router(reply: &str) -> Router {
        let engine = Arc::new(SessionEngine::new(
            Arc::new(StaticGenerator {
                reply: reply.to_string(),
            }),
            Arc::new(InMemorySessionRepository::new()),
            EngineConfig::default(),
        ));
        RedraftServer::with_config(engine, ServerConfig::default().with_logging(false))
            .build_router()
    }

    async fn request_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router("ok");
        let (status, body) = request_json(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let app = test_router("ok");
        let (status, created) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({
                "subject_content_id": "file-1",
                "initial_content": "draft"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap();
        assert_eq!(created["current_content"], "draft");
        assert_eq!(created["versions"].as_array().unwrap().len(), 1);

        let (status, fetched) =
            request_json(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], id);
        assert_eq!(fetched["status"], "Active");
    }

    #[tokio::test]
    async fn test_create_session_without_subject_is_bad_request() {
        let app = test_router("ok");
        let (status, body) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({ "subject_content_id": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_get_unknown_session_is_404() {
        let app = test_router("ok");
        let (status, body) = request_json(&app, "GET", "/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
        assert_eq!(body["retriable"], false);
    }

    #[tokio::test]
    async fn test_send_message_returns_proposal() {
        let app = test_router(
            "Here you go.\n```proposal\nDraft (formal)\n```\nChanges:\n- formalized\n",
        );
        let (_, created) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({
                "subject_content_id": "file-1",
                "initial_content": "draft"
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/messages", id),
            Some(json!({ "text": "make it formal" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proposal"]["new_content"], "Draft (formal)");
        assert_eq!(body["prose"], "Here you go.\nChanges:\n- formalized");
        assert_eq!(body["auto_applied"], false);
        assert_eq!(body["total_usage"]["total_tokens"], 10);

        // Proposal pending, versions untouched.
        let (_, fetched) = request_json(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(fetched["versions"].as_array().unwrap().len(), 1);
        assert_eq!(fetched["pending_proposal"]["new_content"], "Draft (formal)");
    }

    #[tokio::test]
    async fn test_apply_versions_revert_complete_flow() {
        let app = test_router("ok");
        let (_, created) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({
                "subject_content_id": "file-1",
                "initial_content": "v0"
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, applied) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/apply", id),
            Some(json!({ "new_content": "v1", "description": "tightened" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["version_count"], 2);
        assert_eq!(applied["current_content"], "v1");

        let (status, history) =
            request_json(&app, "GET", &format!("/sessions/{}/versions", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1]["description"], "tightened");
        // List entries carry no content.
        assert!(history[1].get("content").is_none());

        let (status, snapshot) = request_json(
            &app,
            "GET",
            &format!("/sessions/{}/versions/0", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["content"], "v0");

        let (status, reverted) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/versions/0/revert", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reverted["current_content"], "v0");
        assert_eq!(reverted["version_count"], 3);

        let (status, body) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/versions/9/revert", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "index_out_of_range");

        let (status, summary) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/complete", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["final_content"], "v0");
        assert_eq!(summary["version_count"], 3);

        // Mutations on a completed session map to 409.
        let (status, body) = request_json(
            &app,
            "POST",
            &format!("/sessions/{}/messages", id),
            Some(json!({ "text": "more" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "session_closed");

        // History remains readable.
        let (status, _) =
            request_json(&app, "GET", &format!("/sessions/{}/versions", id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_discard_proposal_is_idempotent_over_http() {
        let app = test_router("prose only");
        let (_, created) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({
                "subject_content_id": "file-1",
                "initial_content": "draft"
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        for _ in 0..2 {
            let (status, body) = request_json(
                &app,
                "DELETE",
                &format!("/sessions/{}/proposal", id),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "discarded");
        }
    }

    #[tokio::test]
    async fn test_delete_session_endpoint() {
        let app = test_router("ok");
        let (_, created) = request_json(
            &app,
            "POST",
            "/sessions",
            Some(json!({
                "subject_content_id": "file-1",
                "initial_content": "draft"
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, _) = request_json(&app, "DELETE", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = request_json(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
