use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::info;

use crate::entities::{prelude::*, servers};

/// A persisted game server. The live RCON handle is never stored here,
/// see [`crate::services::ServerConsole`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: i32,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Repository for game server records
pub struct ServerRepository {
    conn: DatabaseConnection,
}

impl ServerRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: servers::Model) -> Server {
        Server {
            id: m.id,
            host: m.host,
            port: u16::try_from(m.port).unwrap_or_default(),
            password: m.password,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }

    pub async fn list(&self) -> Result<Vec<Server>> {
        let rows = Servers::find()
            .order_by_asc(servers::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list servers")?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<Server>> {
        let row = Servers::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query server")?;

        Ok(row.map(Self::map_model))
    }

    pub async fn add(&self, host: &str, port: u16, password: &str) -> Result<Server> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = servers::ActiveModel {
            host: Set(host.to_string()),
            port: Set(i32::from(port)),
            password: Set(password.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert server")?;

        info!("Added server {}:{}", model.host, model.port);
        Ok(Self::map_model(model))
    }

    pub async fn remove(&self, id: i32) -> Result<bool> {
        let result = Servers::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete server")?;

        Ok(result.rows_affected > 0)
    }
}
