//! CENYCA Web Server
//!
//! Axum-based REST API for the CENYCA reconciliation tool.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (file type and size limits before any parsing)
//! - Sanitized error responses; the API key never leaves the server process

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use cenyca_core::{MemoryQuota, ModelBackend, ModelClient};

mod handlers;


/// Maximum upload size per CSV file (5 MB), shared with the core gate.
pub const MAX_UPLOAD_SIZE: usize = cenyca_core::MAX_FILE_SIZE;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
    /// Monthly remote-reconciliation limit
    pub monthly_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            monthly_limit: cenyca_core::DEFAULT_MONTHLY_LIMIT,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Remote model backend, None when no API key is configured
    pub backend: Option<ModelClient>,
    pub quota: Arc<MemoryQuota>,
    /// One reconciliation attempt in flight at a time
    busy: AtomicBool,
}

impl AppState {
    /// Claim the in-flight slot, or fail if an attempt is already running.
    ///
    /// The returned guard frees the slot on drop, so an erroring handler
    /// can never leave the server stuck busy.
    pub fn try_begin_attempt(self: &Arc<Self>) -> Option<AttemptGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(AttemptGuard {
                state: self.clone(),
            })
        } else {
            None
        }
    }
}

/// RAII guard for the single in-flight reconciliation attempt.
pub struct AttemptGuard {
    state: Arc<AppState>,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

/// Authentication middleware - validates the Bearer API key
///
/// Keys are compared using constant-time comparison to prevent timing
/// attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time
/// comparison to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() {
            if provided_bytes.ct_eq(key_bytes).into() {
                return true;
            }
        }
    }
    false
}

/// Create the application router
pub fn create_router(static_dir: Option<&str>, config: ServerConfig) -> Router {
    let backend = ModelClient::from_env();
    match backend {
        Some(ref client) => {
            info!(
                "Model backend configured: {} (model: {})",
                client.host(),
                client.model()
            );
        }
        None => {
            info!("Model backend not configured (set GEMINI_API_KEY to enable reconciliation)");
        }
    }
    create_router_with_backend(static_dir, config, backend)
}

/// Create the application router with an explicit backend (for testing)
pub fn create_router_with_backend(
    static_dir: Option<&str>,
    config: ServerConfig,
    backend: Option<ModelClient>,
) -> Router {
    let quota = Arc::new(MemoryQuota::new(config.monthly_limit));

    let state = Arc::new(AppState {
        config: config.clone(),
        backend,
        quota,
        busy: AtomicBool::new(false),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/quota", get(handlers::get_quota))
        .route("/reconcile", post(handlers::run_reconciliation))
        .route("/reconcile/offline", post(handlers::run_offline_reconciliation))
        .route("/reconcile/export", post(handlers::export_reconciliation))
        // Two files per form plus multipart overhead; per-file size is
        // enforced again field by field.
        .layer(axum::extract::DefaultBodyLimit::max(2 * MAX_UPLOAD_SIZE + 64 * 1024));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    // Security headers
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(host: &str, port: u16, static_dir: Option<&str>) -> anyhow::Result<()> {
    serve_with_config(host, port, static_dir, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    }

    check_backend_connection().await;

    let app = create_router(static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log model backend connection status
async fn check_backend_connection() {
    match ModelClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "Model backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "Model backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("Model backend not configured (set GEMINI_API_KEY to enable reconciliation)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn service_unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a pipeline error onto the HTTP surface.
    ///
    /// File problems are the client's fault, quota is 429, a slow or broken
    /// remote is a gateway problem. Everything else stays a sanitized 500.
    pub fn from_core(err: cenyca_core::Error) -> Self {
        use cenyca_core::Error as E;
        let status = match &err {
            E::File(_) | E::Csv(_) => StatusCode::BAD_REQUEST,
            E::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            E::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            E::Remote { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            Self {
                status,
                message: "An internal error occurred".to_string(),
                internal: Some(err.into()),
            }
        } else {
            Self {
                status,
                message: err.to_string(),
                internal: None,
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
