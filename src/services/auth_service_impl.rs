//! [`AuthService`] backed by the in-memory [`UserDirectory`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::{CredentialChange, User};
use crate::services::auth_service::{AuthError, AuthService, LoginOutcome};
use crate::services::two_factor::{Enrollment, TwoFactor};
use crate::services::user_directory::UserDirectory;

pub struct DirectoryAuthService {
    directory: Arc<UserDirectory>,
    two_factor: TwoFactor,
}

impl DirectoryAuthService {
    #[must_use]
    pub const fn new(directory: Arc<UserDirectory>, two_factor: TwoFactor) -> Self {
        Self {
            directory,
            two_factor,
        }
    }
}

#[async_trait]
impl AuthService for DirectoryAuthService {
    async fn find_user(&self, username: &str) -> Option<User> {
        self.directory.find_by_username(username).await
    }

    async fn find_user_by_id(&self, id: i32) -> Option<User> {
        self.directory.find_by_id(id).await
    }

    async fn list_users(&self) -> Vec<User> {
        self.directory.list().await
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let is_valid = self.directory.verify_password(username, password).await?;

        let user = if is_valid {
            self.directory.find_by_username(username).await
        } else {
            None
        };

        let Some(user) = user else {
            metrics::counter!("sorbet_logins_total", "outcome" => "failure").increment(1);
            return Err(AuthError::InvalidCredentials);
        };

        metrics::counter!("sorbet_logins_total", "outcome" => "success").increment(1);

        Ok(LoginOutcome {
            username: user.username,
            requires_two_factor: user.two_factor,
        })
    }

    async fn verify_login_token(&self, username: &str, token: &str) -> Result<(), AuthError> {
        let user = self
            .directory
            .find_by_username(username)
            .await
            .ok_or(AuthError::UserNotFound)?;

        if user.two_factor && self.two_factor.verify(&user.two_factor_secret, token) {
            metrics::counter!("sorbet_two_factor_checks_total", "outcome" => "success")
                .increment(1);
            Ok(())
        } else {
            metrics::counter!("sorbet_two_factor_checks_total", "outcome" => "failure")
                .increment(1);
            Err(AuthError::InvalidToken)
        }
    }

    async fn begin_enrollment(&self, username: &str) -> Result<Enrollment, AuthError> {
        Ok(self.two_factor.generate(username))
    }

    async fn confirm_enrollment(
        &self,
        user_id: i32,
        secret: &str,
        token: &str,
    ) -> Result<User, AuthError> {
        if secret.is_empty() || !self.two_factor.verify(secret, token) {
            metrics::counter!("sorbet_two_factor_checks_total", "outcome" => "failure")
                .increment(1);
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .directory
            .set_two_factor(user_id, secret)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        metrics::counter!("sorbet_two_factor_checks_total", "outcome" => "success").increment(1);
        info!("Two-factor enabled for {}", user.username);
        Ok(user)
    }

    async fn disable_two_factor(&self, user_id: i32) -> Result<User, AuthError> {
        let user = self
            .directory
            .clear_two_factor(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!("Two-factor disabled for {}", user.username);
        Ok(user)
    }

    async fn update_credentials(
        &self,
        user_id: i32,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let change = CredentialChange {
            username: Some(username.trim())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            password: Some(password)
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string),
        };

        if change.username.is_none() && change.password.is_none() {
            return self
                .directory
                .find_by_id(user_id)
                .await
                .ok_or(AuthError::UserNotFound);
        }

        self.directory
            .update_credentials(user_id, change)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn create_user(
        &self,
        username: &str,
        password: &str,
        admin: bool,
    ) -> Result<User, AuthError> {
        let username = username.trim();
        let password = password.trim();

        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let user = self.directory.create(username, password, admin).await?;
        info!("Created user {} (admin: {})", user.username, user.admin);
        Ok(user)
    }

    async fn toggle_admin(&self, user_id: i32) -> Result<User, AuthError> {
        let user = self
            .directory
            .toggle_admin(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!("User {} admin: {}", user.username, user.admin);
        Ok(user)
    }

    async fn delete_user(&self, username: &str, confirmed: bool) -> Result<(), AuthError> {
        if !confirmed {
            return Err(AuthError::Validation(
                "Deletion was not confirmed".to_string(),
            ));
        }

        if self.directory.delete_by_username(username).await? {
            Ok(())
        } else {
            warn!("Refusing to delete unknown user {username}");
            Err(AuthError::UserNotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::db::tests::{cheap_security, temp_store};
    use crate::services::two_factor::tests::current_code;

    async fn service() -> DirectoryAuthService {
        let store = temp_store().await;
        store.ensure_default_admin(&cheap_security()).await.unwrap();
        let directory = UserDirectory::load(store, cheap_security()).await.unwrap();
        DirectoryAuthService::new(
            Arc::new(directory),
            TwoFactor::new(&SecurityConfig::default()),
        )
    }

    #[tokio::test]
    async fn login_checks_password() {
        let svc = service().await;

        let outcome = svc.login("admin", "admin").await.unwrap();
        assert_eq!(outcome.username, "admin");
        assert!(!outcome.requires_two_factor);

        assert!(matches!(
            svc.login("admin", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            svc.login("nobody", "admin").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn enrollment_requires_matching_token() {
        let svc = service().await;
        let admin = svc.find_user("admin").await.unwrap();
        let enrollment = svc.begin_enrollment("admin").await.unwrap();

        // Nothing is persisted until confirmation.
        assert!(!svc.find_user("admin").await.unwrap().two_factor);

        assert!(matches!(
            svc.confirm_enrollment(admin.id, &enrollment.secret, "000000x")
                .await,
            Err(AuthError::InvalidToken)
        ));
        assert!(!svc.find_user("admin").await.unwrap().two_factor);

        let code = current_code(&enrollment.secret);
        let user = svc
            .confirm_enrollment(admin.id, &enrollment.secret, &code)
            .await
            .unwrap();
        assert!(user.two_factor);
        assert_eq!(user.two_factor_secret, enrollment.secret);

        let outcome = svc.login("admin", "admin").await.unwrap();
        assert!(outcome.requires_two_factor);
        assert!(svc.verify_login_token("admin", &code).await.is_ok());
        assert!(matches!(
            svc.verify_login_token("admin", "abcdef").await,
            Err(AuthError::InvalidToken)
        ));

        let user = svc.disable_two_factor(admin.id).await.unwrap();
        assert!(!user.two_factor);
        assert!(user.two_factor_secret.is_empty());
    }

    #[tokio::test]
    async fn login_token_fails_without_two_factor() {
        let svc = service().await;
        assert!(matches!(
            svc.verify_login_token("admin", "123456").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn blank_fields_keep_credentials() {
        let svc = service().await;
        let admin = svc.find_user("admin").await.unwrap();

        let same = svc.update_credentials(admin.id, "  ", "").await.unwrap();
        assert_eq!(same.username, "admin");
        assert!(svc.login("admin", "admin").await.is_ok());

        let renamed = svc.update_credentials(admin.id, "root", "").await.unwrap();
        assert_eq!(renamed.username, "root");
        assert!(svc.login("root", "admin").await.is_ok());

        svc.update_credentials(admin.id, "", "n3w").await.unwrap();
        assert!(svc.login("root", "n3w").await.is_ok());
        assert!(svc.login("root", "admin").await.is_err());
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let svc = service().await;

        assert!(matches!(
            svc.create_user(" ", "pw", false).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            svc.create_user("frank", "  ", false).await,
            Err(AuthError::Validation(_))
        ));

        let user = svc.create_user(" frank ", " pw ", true).await.unwrap();
        assert_eq!(user.username, "frank");
        assert!(user.admin);
        assert!(svc.login("frank", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let svc = service().await;
        svc.create_user("gina", "pw", false).await.unwrap();

        assert!(matches!(
            svc.delete_user("gina", false).await,
            Err(AuthError::Validation(_))
        ));
        assert!(svc.find_user("gina").await.is_some());

        svc.delete_user("gina", true).await.unwrap();
        assert!(svc.find_user("gina").await.is_none());
        assert!(svc.login("gina", "pw").await.is_err());

        assert!(matches!(
            svc.delete_user("gina", true).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
