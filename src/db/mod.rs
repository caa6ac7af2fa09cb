use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, DatabaseDriver, SecurityConfig};

pub mod migrator;
pub mod repositories;

pub use repositories::server::Server;
pub use repositories::user::{CredentialChange, CredentialUpdate, User, hash_password_blocking};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    /// Opens the configured database, checks it answers and applies migrations.
    pub async fn connect(config: &DatabaseConfig, sql_logging: bool) -> Result<Self> {
        let url = config.url()?;

        if config.driver()? == DatabaseDriver::Sqlite {
            prepare_sqlite_file(&url).await?;
        }

        Self::with_pool_options(
            &url,
            config.max_connections,
            config.min_connections,
            sql_logging,
        )
        .await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        sql_logging: bool,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(sql_logging);

        let conn = Database::connect(opt)
            .await
            .context("Error connecting to database")?;

        let store = Self { conn };
        store.ping().await.context("Error pinging database")?;

        debug!("Running database migrations");
        migrator::Migrator::up(&store.conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn server_repo(&self) -> repositories::server::ServerRepository {
        repositories::server::ServerRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn ensure_default_admin(&self, config: &SecurityConfig) -> Result<bool> {
        self.user_repo().ensure_default_admin(config).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list_all().await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn create_user(&self, username: &str, password_hash: &str, admin: bool) -> Result<User> {
        self.user_repo().create(username, password_hash, admin).await
    }

    pub async fn update_user_credentials(
        &self,
        id: i32,
        update: CredentialUpdate,
    ) -> Result<Option<User>> {
        self.user_repo().update_credentials(id, update).await
    }

    pub async fn set_user_two_factor(&self, id: i32, secret: Option<&str>) -> Result<Option<User>> {
        self.user_repo().set_two_factor(id, secret).await
    }

    pub async fn toggle_user_admin(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().toggle_admin(id).await
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    // ========================================================================
    // Servers
    // ========================================================================

    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        self.server_repo().list().await
    }

    pub async fn get_server(&self, id: i32) -> Result<Option<Server>> {
        self.server_repo().get(id).await
    }

    pub async fn add_server(&self, host: &str, port: u16, password: &str) -> Result<Server> {
        self.server_repo().add(host, port, password).await
    }

    pub async fn remove_server(&self, id: i32) -> Result<bool> {
        self.server_repo().remove(id).await
    }
}

/// `SQLite` refuses to open a file inside a directory that does not exist.
async fn prepare_sqlite_file(url: &str) -> Result<()> {
    if url.starts_with("sqlite::memory:") {
        return Ok(());
    }

    let path_str = url.trim_start_matches("sqlite:");
    let path_str = path_str.split('?').next().unwrap_or(path_str);

    if let Some(parent) = Path::new(path_str).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Ok(())
}
