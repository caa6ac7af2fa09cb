use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// Username and password of the account created on an empty database.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// User data returned from repository (without the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub admin: bool,
    pub two_factor: bool,
    #[serde(skip)]
    pub two_factor_secret: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            admin: model.admin,
            two_factor: model.two_factor,
            two_factor_secret: model.two_factor_secret,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Fields of a credential update. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct CredentialChange {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialChange {
    /// Hashes the new password, if any, ready for storage.
    pub async fn hashed(self, config: &SecurityConfig) -> Result<CredentialUpdate> {
        let password_hash = match self.password {
            Some(password) => Some(hash_password_blocking(&password, config).await?),
            None => None,
        };

        Ok(CredentialUpdate {
            username: self.username,
            password_hash,
        })
    }
}

/// A [`CredentialChange`] whose password has already been hashed.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Verify password for a user
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || password_matches_hash(&password, &password_hash))
            .await
            .context("Password verification task panicked")?;

        Ok(is_valid)
    }

    /// Inserts a user. `password_hash` comes from [`hash_password_blocking`].
    pub async fn create(&self, username: &str, password_hash: &str, admin: bool) -> Result<User> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            admin: Set(admin),
            two_factor: Set(false),
            two_factor_secret: Set(String::new()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .with_context(|| format!("Failed to insert user {username}"))?;

        Ok(User::from(model))
    }

    /// Creates the default administrator when the table is empty.
    /// Returns whether a user was created.
    pub async fn ensure_default_admin(&self, config: &SecurityConfig) -> Result<bool> {
        if self.count().await? > 0 {
            return Ok(false);
        }

        let password_hash = hash_password_blocking(DEFAULT_ADMIN_PASSWORD, config).await?;
        self.create(DEFAULT_ADMIN_USERNAME, &password_hash, true)
            .await?;

        Ok(true)
    }

    pub async fn update_credentials(
        &self,
        id: i32,
        update: CredentialUpdate,
    ) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for credential update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(username) = update.username {
            active.username = Set(username);
        }
        if let Some(hash) = update.password_hash {
            active.password_hash = Set(hash);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user credentials")?;

        Ok(Some(User::from(model)))
    }

    /// Enables two-factor with `secret`, or disables it when `secret` is `None`.
    pub async fn set_two_factor(&self, id: i32, secret: Option<&str>) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for two-factor update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.two_factor = Set(secret.is_some());
        active.two_factor_secret = Set(secret.unwrap_or_default().to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update two-factor settings")?;

        Ok(Some(User::from(model)))
    }

    pub async fn toggle_admin(&self, id: i32) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for admin toggle")?
        else {
            return Ok(None);
        };

        let admin = user.admin;
        let mut active: users::ActiveModel = user.into();
        active.admin = Set(!admin);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to toggle admin flag")?;

        Ok(Some(User::from(model)))
    }

    /// Hard delete. Returns whether a row was removed.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = users::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .with_context(|| format!("Failed to delete user {id}"))?;

        Ok(result.rows_affected > 0)
    }
}

/// Hash a password using Argon2id with the configured costs.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Checks a plaintext password against a stored PHC hash string.
/// Params are read back from the hash, so any cost settings verify.
#[must_use]
pub fn password_matches_hash(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// [`hash_password`] on the blocking pool. Argon2 would stall the runtime.
pub async fn hash_password_blocking(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();

    task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .context("Password hashing task panicked")?
}
