//! `api` crate — HTTP REST API layer.
//!
//! Exposes, under `/api`:
//!   GET    /workflows                     list
//!   POST   /workflows                     create
//!   GET    /workflows/:id                 fetch
//!   PUT    /workflows/:id                 replace
//!   DELETE /workflows/:id                 delete (cascades executions)
//!   POST   /workflows/:id/execute        start an execution, 202
//!   GET    /workflows/:id/executions     execution history
//!   GET    /executions/:id               fetch one execution
//!   GET    /executions/:id/stream        SSE progress stream
//!   GET    /credentials                  list (ciphertext never returned)
//!   POST   /credentials                  create (encrypts plaintext body)
//!   DELETE /credentials/:id              delete
//!   POST   /oauth/gmail/auth-url         begin OAuth consent
//!   GET    /oauth/gmail/callback         finish OAuth, store credential

pub mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::routing::{delete, get, post};
use axum::Router;
use crypto::Cipher;
use db::PgStore;
use engine::{ProgressBus, Scheduler};
use nodes::config::OAuthAppConfig;
use nodes::oauth::OAuthClient;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// OAuth flow state issued by `auth-url`, redeemed by the callback.
pub struct PendingOAuth {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgStore>,
    pub bus: ProgressBus,
    pub scheduler: Arc<Scheduler>,
    pub cipher: Arc<Cipher>,
    pub oauth: Arc<OAuthClient>,
    pub oauth_config: OAuthAppConfig,
    /// Issued OAuth `state` tokens awaiting their callback.
    pub pending_oauth: Arc<Mutex<HashMap<String, PendingOAuth>>>,
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route(
            "/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/workflows/:id",
            get(handlers::workflows::get)
                .put(handlers::workflows::update)
                .delete(handlers::workflows::delete),
        )
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/workflows/:id/executions", get(handlers::executions::list))
        .route("/executions/:id", get(handlers::executions::get))
        .route("/executions/:id/stream", get(handlers::executions::stream))
        .route(
            "/credentials",
            get(handlers::credentials::list).post(handlers::credentials::create),
        )
        .route("/credentials/:id", delete(handlers::credentials::delete))
        .route("/oauth/gmail/auth-url", post(handlers::oauth::auth_url))
        .route("/oauth/gmail/callback", get(handlers::oauth::callback));

    let app = Router::new()
        .nest("/api", api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
