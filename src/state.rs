use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, DirectoryAuthService, TwoFactor, UserDirectory};

/// Everything that lives for the whole process, shared by the web layer and
/// the CLI.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub directory: Arc<UserDirectory>,

    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::connect(&config.database, config.general.debug).await?;

        if store.ensure_default_admin(&config.security).await? {
            warn!("No users found, created default administrator admin/admin. Change the password from /settings");
        }

        let directory =
            Arc::new(UserDirectory::load(store.clone(), config.security.clone()).await?);

        let auth_service: Arc<dyn AuthService> = Arc::new(DirectoryAuthService::new(
            directory.clone(),
            TwoFactor::new(&config.security),
        ));

        Ok(Self {
            config: Arc::new(config),
            directory,
            auth_service,
        })
    }
}
