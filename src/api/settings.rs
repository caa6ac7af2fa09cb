use std::sync::Arc;

use axum::{
    Extension, Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, warn};

use super::auth::{CurrentUser, PENDING_SECRET_KEY, USERNAME_KEY, is_ajax};
use super::login::TokenForm;
use super::{AppState, ApiError, views};
use crate::services::AuthError;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SettingsForm {
    pub username: String,
    pub password: String,
}

/// GET /settings
pub async fn show(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Html<String> {
    Html(views::settings(&user))
}

/// POST /settings
///
/// Blank fields keep their current value. A renamed user stays logged in.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    session: Session,
    Form(form): Form<SettingsForm>,
) -> Result<Redirect, ApiError> {
    match state
        .auth()
        .update_credentials(user.id, &form.username, &form.password)
        .await
    {
        Ok(updated) => {
            if updated.username != user.username {
                info!("{} renamed to {}", user.username, updated.username);
                session.insert(USERNAME_KEY, &updated.username).await?;
            }
        }
        Err(e) => warn!("Error updating settings for {}: {e}", user.username),
    }

    Ok(Redirect::to("/settings"))
}

/// GET /settings/2fa/generate
///
/// Returns a new secret and its `otpauth://` URI. The secret is only kept in
/// the session until the user confirms it.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, ApiError> {
    if !is_ajax(&headers) {
        return Ok(Redirect::to("/settings").into_response());
    }

    let enrollment = state.auth().begin_enrollment(&user.username).await?;
    session
        .insert(PENDING_SECRET_KEY, &enrollment.secret)
        .await?;

    Ok(Json(enrollment).into_response())
}

/// POST /settings/2fa/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    session: Session,
    Form(form): Form<TokenForm>,
) -> Result<Response, ApiError> {
    if !is_ajax(&headers) {
        return Ok(Redirect::to("/settings").into_response());
    }

    let secret = session
        .get::<String>(PENDING_SECRET_KEY)
        .await?
        .unwrap_or_default();

    match state
        .auth()
        .confirm_enrollment(user.id, &secret, &form.token)
        .await
    {
        Ok(_) => {
            session.remove::<String>(PENDING_SECRET_KEY).await?;
            Ok(Redirect::to("/settings").into_response())
        }
        Err(AuthError::InvalidToken) => {
            warn!("Wrong enrollment token from {}", user.username);
            Ok((StatusCode::EXPECTATION_FAILED, "Wrong token").into_response())
        }
        Err(e) => {
            warn!("Error enabling two-factor for {}: {e}", user.username);
            Ok(Redirect::to("/settings").into_response())
        }
    }
}

/// POST /settings/2fa/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Response {
    if !is_ajax(&headers) {
        return Redirect::to("/settings").into_response();
    }

    if let Err(e) = state.auth().disable_two_factor(user.id).await {
        warn!("Error disabling two-factor for {}: {e}", user.username);
    }

    Redirect::to("/settings").into_response()
}
