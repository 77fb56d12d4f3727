use crate::api::files::file_routes;
use crate::auth::TokenAuth;
use crate::config::Config;
use crate::error::{HomeCloudError, Result as HomeCloudResult};
use crate::filesystem::FileStore;
use axum::{
    http::{
        header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderName, Method, StatusCode,
    },
    extract::State,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: FileStore,
    pub auth: Arc<TokenAuth>,
}

impl AppState {
    pub fn new(config: Config, store: FileStore) -> Self {
        let auth = Arc::new(TokenAuth::new(config.auth.token.clone()));
        Self { config, store, auth }
    }
}

pub struct Server {
    config: Config,
    app: Router,
}

impl Server {
    pub async fn new(config: Config, store: FileStore) -> HomeCloudResult<Self> {
        let app_state = AppState::new(config.clone(), store);
        let app = create_app(app_state);

        Ok(Self { config, app })
    }

    pub async fn run(self) -> HomeCloudResult<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);

        info!("HomeCloud server starting on {}", addr);
        info!("Serving files from {}", self.config.storage.root.display());

        let listener = TcpListener::bind(&addr).await?;

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down HomeCloud server...");
}

pub fn create_app(state: AppState) -> Router {
    let protected = file_routes(state.config.storage.max_upload_bytes).route_layer(
        middleware::from_fn_with_state(state.auth.clone(), TokenAuth::require_token),
    );

    Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::HEAD,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            RANGE,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([CONTENT_LENGTH, CONTENT_RANGE, ACCEPT_RANGES])
        .max_age(Duration::from_secs(86400))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "homecloud",
        "version": env!("CARGO_PKG_VERSION"),
        "used_bytes": state.store.tracker().current_usage_bytes(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// Password check used by clients before they start sending the token.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, HomeCloudError> {
    if !state.auth.verify(&request.password) {
        warn!("Login rejected: incorrect password");
        return Err(HomeCloudError::authentication("Incorrect Password"));
    }

    info!("Client connected");
    Ok((StatusCode::OK, "Server connected").into_response())
}
