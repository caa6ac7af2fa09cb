use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::warn;

use super::AppState;
use crate::db::User;

/// Name of the logged-in user.
pub const USERNAME_KEY: &str = "username";
/// Set while a two-factor user has passed the password but not the code.
pub const TEMP_KEY: &str = "temp";
/// Secret generated during enrollment, kept until it is confirmed.
pub const PENDING_SECRET_KEY: &str = "secret";

/// The authenticated user, inserted into request extensions by
/// [`require_login`] and [`require_admin`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolves the session to a fully authenticated user.
///
/// A session naming a user that no longer exists is flushed. A two-factor
/// user whose session is still temporary is not authenticated. Session
/// backend failures are logged and count as "not authenticated".
pub async fn authenticated_user(state: &AppState, session: &Session) -> Option<User> {
    let username = match session.get::<String>(USERNAME_KEY).await {
        Ok(Some(username)) => username,
        Ok(None) => return None,
        Err(e) => {
            warn!("Error reading session: {e}");
            return None;
        }
    };

    let Some(user) = state.auth().find_user(&username).await else {
        warn!("Session refers to unknown user {username}, clearing it");
        if let Err(e) = session.flush().await {
            warn!("Error flushing session: {e}");
        }
        return None;
    };

    if user.two_factor && is_temporary(session).await {
        return None;
    }

    Some(user)
}

/// Whether the session is waiting for a second factor.
pub async fn is_temporary(session: &Session) -> bool {
    match session.get::<bool>(TEMP_KEY).await {
        Ok(temp) => temp.unwrap_or(false),
        Err(e) => {
            warn!("Error reading session: {e}");
            false
        }
    }
}

pub async fn require_login(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user) = authenticated_user(&state, &session).await else {
        return Redirect::to("/login").into_response();
    };

    tracing::Span::current().record("user", user.username.as_str());
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Like [`require_login`], but sends authenticated non-admins to `/`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user) = authenticated_user(&state, &session).await else {
        return Redirect::to("/login").into_response();
    };

    if !user.admin {
        warn!("Non-admin {} tried to reach {}", user.username, request.uri().path());
        return Redirect::to("/").into_response();
    }

    tracing::Span::current().record("user", user.username.as_str());
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Whether the request was sent by the settings page script.
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_ajax() {
        let mut headers = HeaderMap::new();
        assert!(!is_ajax(&headers));

        headers.insert("x-requested-with", HeaderValue::from_static("fetch"));
        assert!(!is_ajax(&headers));

        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        assert!(is_ajax(&headers));
    }
}
