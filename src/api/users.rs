use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::State,
    response::{Html, Redirect},
};
use serde::Deserialize;
use tracing::warn;

use super::auth::CurrentUser;
use super::validation::{parse_form_bool, parse_user_id};
use super::{AppState, views};

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct NewUserForm {
    pub username: String,
    pub password: String,
    pub admin: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct DeleteUserForm {
    pub username: String,
    pub accept: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ToggleAdminForm {
    pub id: String,
}

/// GET /users
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Html<String> {
    let users = state.auth().list_users().await;
    Html(views::users(&user, &users))
}

/// POST /users/new
pub async fn create(
    State(state): State<Arc<AppState>>,
    Form(form): Form<NewUserForm>,
) -> Redirect {
    let admin = parse_form_bool("admin", &form.admin);

    if let Err(e) = state
        .auth()
        .create_user(&form.username, &form.password, admin)
        .await
    {
        warn!("Error creating user {:?}: {e}", form.username);
    }

    Redirect::to("/users")
}

/// POST /users/delete
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
    Form(form): Form<DeleteUserForm>,
) -> Redirect {
    let confirmed = parse_form_bool("accept", &form.accept);

    match state.auth().delete_user(&form.username, confirmed).await {
        Ok(()) => tracing::info!("{} deleted user {}", current.username, form.username),
        Err(e) => warn!("Error deleting user {:?}: {e}", form.username),
    }

    Redirect::to("/users")
}

/// POST /users/admin
pub async fn toggle_admin(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ToggleAdminForm>,
) -> Redirect {
    let Some(id) = parse_user_id(&form.id) else {
        return Redirect::to("/users");
    };

    if let Err(e) = state.auth().toggle_admin(id).await {
        warn!("Error toggling admin for user {id}: {e}");
    }

    Redirect::to("/users")
}
