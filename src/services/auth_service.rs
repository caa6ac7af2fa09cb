//! Domain service for authentication and user management.
//!
//! Handles password login, the TOTP second factor and the admin-only user
//! operations.

use thiserror::Error;

use crate::db::User;
use crate::services::two_factor::Enrollment;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Wrong token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// Result of a successful first-factor login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub username: String,
    pub requires_two_factor: bool,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn find_user(&self, username: &str) -> Option<User>;

    async fn find_user_by_id(&self, id: i32) -> Option<User>;

    async fn list_users(&self) -> Vec<User>;

    /// Verifies username and password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails.
    async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError>;

    /// Checks a one-time code against the user's stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if the code does not match.
    async fn verify_login_token(&self, username: &str, token: &str) -> Result<(), AuthError>;

    /// Generates a secret for `username`. Nothing is persisted.
    async fn begin_enrollment(&self, username: &str) -> Result<Enrollment, AuthError>;

    /// Persists `secret` and enables two-factor if `token` matches it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] and persists nothing otherwise.
    async fn confirm_enrollment(
        &self,
        user_id: i32,
        secret: &str,
        token: &str,
    ) -> Result<User, AuthError>;

    async fn disable_two_factor(&self, user_id: i32) -> Result<User, AuthError>;

    /// Changes username and/or password. Blank fields keep the current value.
    async fn update_credentials(
        &self,
        user_id: i32,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError>;

    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if username or password is blank.
    async fn create_user(
        &self,
        username: &str,
        password: &str,
        admin: bool,
    ) -> Result<User, AuthError>;

    async fn toggle_admin(&self, user_id: i32) -> Result<User, AuthError>;

    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] unless `confirmed` is set.
    async fn delete_user(&self, username: &str, confirmed: bool) -> Result<(), AuthError>;
}
