use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, warn};

use super::auth::{CurrentUser, TEMP_KEY, USERNAME_KEY, authenticated_user, is_temporary};
use super::{AppState, ApiError, views};
use crate::services::AuthError;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct TokenForm {
    pub token: String,
}

/// GET /
pub async fn index(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Html<String> {
    Html(views::index(&user))
}

/// GET /login
pub async fn show_login(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    if authenticated_user(&state, &session).await.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    if has_pending_login(&session).await? {
        return Ok(Redirect::to("/login/2fa").into_response());
    }

    Ok(Html(views::login()).into_response())
}

/// POST /login
///
/// Starts a fresh session. Two-factor users get a temporary one and are sent
/// on to `/login/2fa`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    let outcome = match state.auth().login(&form.username, &form.password).await {
        Ok(outcome) => outcome,
        Err(AuthError::InvalidCredentials) => {
            warn!("Failed login for {:?}", form.username);
            return Ok(Redirect::to("/login"));
        }
        Err(e) => {
            warn!("Error during login: {e}");
            return Ok(Redirect::to("/login"));
        }
    };

    session.clear().await;
    session.cycle_id().await?;
    session.insert(USERNAME_KEY, &outcome.username).await?;
    session
        .insert(TEMP_KEY, outcome.requires_two_factor)
        .await?;

    if outcome.requires_two_factor {
        info!("{} passed the password check, waiting for code", outcome.username);
        Ok(Redirect::to("/login/2fa"))
    } else {
        info!("{} logged in", outcome.username);
        Ok(Redirect::to("/"))
    }
}

/// GET /login/2fa
pub async fn show_login_2fa(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    if authenticated_user(&state, &session).await.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    if has_pending_login(&session).await? {
        return Ok(Html(views::login_2fa()).into_response());
    }

    Ok(Redirect::to("/login").into_response())
}

/// POST /login/2fa
///
/// Promotes the temporary session once the code matches.
pub async fn login_2fa(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<TokenForm>,
) -> Result<Redirect, ApiError> {
    let Some(username) = session.get::<String>(USERNAME_KEY).await? else {
        return Ok(Redirect::to("/login"));
    };

    if let Err(e) = state.auth().verify_login_token(&username, &form.token).await {
        warn!("Two-factor check failed for {username}: {e}");
        return Ok(Redirect::to("/login/2fa"));
    }

    session.insert(TEMP_KEY, false).await?;
    session.cycle_id().await?;

    info!("{username} logged in with two-factor");
    Ok(Redirect::to("/"))
}

/// Any method on /logout.
pub async fn logout(session: Session) -> Result<Redirect, ApiError> {
    session.flush().await?;
    Ok(Redirect::to("/"))
}

async fn has_pending_login(session: &Session) -> Result<bool, ApiError> {
    let username = session.get::<String>(USERNAME_KEY).await?;
    Ok(username.is_some() && is_temporary(session).await)
}
