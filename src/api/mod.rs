use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{any, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, SessionManagerLayer};
use tracing::info;

use crate::config::Config;
use crate::session_store::FileSessionStore;
use crate::state::SharedState;

pub mod auth;
mod error;
mod login;
mod observability;
mod settings;
mod users;
mod validation;
mod views;

pub use error::ApiError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "user";

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub session_store: FileSessionStore,

    /// Signs session cookies. Generated per process, so a restart
    /// invalidates every cookie handed out before it.
    pub cookie_key: Key,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn crate::services::AuthService> {
        &self.shared.auth_service
    }
}

pub async fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let session_store = FileSessionStore::open(&shared.config.server.session_dir).await?;
    info!("Storing sessions in {}", session_store.dir().display());

    Ok(Arc::new(AppState {
        shared,
        session_store,
        cookie_key: Key::generate(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle).await
}

pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config();

    let session_layer = SessionManagerLayer::new(state.session_store.clone())
        .with_name(SESSION_COOKIE)
        .with_signed(state.cookie_key.clone())
        .with_secure(config.server.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.server.session_inactivity_minutes,
        )));

    let public_dir = config.server.public_dir.clone();

    Router::new()
        .merge(create_admin_router(state.clone()))
        .merge(create_protected_router(state.clone()))
        .route(
            "/login",
            get(login::show_login).post(login::login),
        )
        .route(
            "/login/2fa",
            get(login::show_login_2fa).post(login::login_2fa),
        )
        .route("/logout", any(login::logout))
        .fallback_service(ServeDir::new(public_dir))
        .layer(session_layer)
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .with_state(state)
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(login::index))
        .route("/settings", get(settings::show).post(settings::update))
        .route("/settings/2fa/generate", get(settings::generate))
        .route("/settings/2fa/verify", post(settings::verify))
        .route("/settings/2fa/disable", post(settings::disable))
        .route_layer(middleware::from_fn_with_state(state, auth::require_login))
}

fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(users::list))
        .route("/users/new", post(users::create))
        .route("/users/delete", post(users::delete))
        .route("/users/admin", post(users::toggle_admin))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::require_admin))
}
