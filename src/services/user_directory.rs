//! In-memory mirror of the users table.
//!
//! Reads never touch the database. Writes go to the database first and are
//! applied to memory only once storage accepted them, with the write lock
//! held across both steps. Passwords are hashed before the lock is taken.

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::SecurityConfig;
use crate::db::{CredentialChange, Store, User, hash_password_blocking};

pub struct UserDirectory {
    store: Store,
    security: SecurityConfig,
    users: RwLock<Vec<User>>,
}

impl UserDirectory {
    /// Reads every user from storage.
    pub async fn load(store: Store, security: SecurityConfig) -> Result<Self> {
        let users = store.list_users().await?;
        info!("Loaded {} users", users.len());

        Ok(Self {
            store,
            security,
            users: RwLock::new(users),
        })
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    pub async fn find_by_id(&self, id: i32) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    pub async fn list(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        self.store.verify_user_password(username, password).await
    }

    pub async fn create(&self, username: &str, password: &str, admin: bool) -> Result<User> {
        let password_hash = hash_password_blocking(password, &self.security).await?;

        let mut users = self.users.write().await;
        let user = self.store.create_user(username, &password_hash, admin).await?;
        users.push(user.clone());
        Ok(user)
    }

    pub async fn update_credentials(
        &self,
        id: i32,
        change: CredentialChange,
    ) -> Result<Option<User>> {
        let update = change.hashed(&self.security).await?;

        let mut users = self.users.write().await;
        let updated = self.store.update_user_credentials(id, update).await?;
        Ok(Self::replace(&mut users, updated))
    }

    pub async fn set_two_factor(&self, id: i32, secret: &str) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let updated = self.store.set_user_two_factor(id, Some(secret)).await?;
        Ok(Self::replace(&mut users, updated))
    }

    pub async fn clear_two_factor(&self, id: i32) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let updated = self.store.set_user_two_factor(id, None).await?;
        Ok(Self::replace(&mut users, updated))
    }

    pub async fn toggle_admin(&self, id: i32) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let updated = self.store.toggle_user_admin(id).await?;
        Ok(Self::replace(&mut users, updated))
    }

    /// Removes the user from storage and memory. Returns whether a user with
    /// that name existed.
    pub async fn delete_by_username(&self, username: &str) -> Result<bool> {
        let mut users = self.users.write().await;

        let Some(id) = users.iter().find(|u| u.username == username).map(|u| u.id) else {
            return Ok(false);
        };

        self.store.delete_user(id).await?;
        users.retain(|u| u.id != id);

        info!("Deleted user {username} (id {id})");
        Ok(true)
    }

    fn replace(users: &mut [User], updated: Option<User>) -> Option<User> {
        let updated = updated?;
        if let Some(slot) = users.iter_mut().find(|u| u.id == updated.id) {
            slot.clone_from(&updated);
        }
        Some(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{cheap_security, temp_store};

    async fn directory() -> (Store, UserDirectory) {
        let store = temp_store().await;
        store.ensure_default_admin(&cheap_security()).await.unwrap();
        let directory = UserDirectory::load(store.clone(), cheap_security())
            .await
            .unwrap();
        (store, directory)
    }

    #[tokio::test]
    async fn load_mirrors_storage() {
        let (_, directory) = directory().await;
        assert_eq!(directory.len().await, 1);
        assert!(directory.find_by_username("admin").await.unwrap().admin);
    }

    #[tokio::test]
    async fn create_writes_both_sides() {
        let (store, directory) = directory().await;

        let user = directory.create("carol", "pw", false).await.unwrap();

        assert_eq!(directory.find_by_id(user.id).await, Some(user.clone()));
        assert_eq!(store.get_user_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn failed_create_leaves_memory_untouched() {
        let (_, directory) = directory().await;

        assert!(directory.create("admin", "dup", false).await.is_err());
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_from_memory_and_storage() {
        let (store, directory) = directory().await;
        let user = directory.create("dave", "pw", false).await.unwrap();

        assert!(directory.delete_by_username("dave").await.unwrap());

        assert!(directory.find_by_username("dave").await.is_none());
        assert!(store.get_user_by_id(user.id).await.unwrap().is_none());
        assert!(!directory.delete_by_username("dave").await.unwrap());
    }

    #[tokio::test]
    async fn toggle_and_two_factor_are_mirrored() {
        let (store, directory) = directory().await;
        let user = directory.create("erin", "pw", false).await.unwrap();

        let toggled = directory.toggle_admin(user.id).await.unwrap().unwrap();
        assert!(toggled.admin);
        assert!(directory.find_by_id(user.id).await.unwrap().admin);

        directory.set_two_factor(user.id, "JBSWY3DPEHPK3PXP").await.unwrap();
        let stored = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.two_factor);
        assert_eq!(stored.two_factor_secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(directory.find_by_id(user.id).await, Some(stored));

        directory.clear_two_factor(user.id).await.unwrap();
        let cleared = directory.find_by_id(user.id).await.unwrap();
        assert!(!cleared.two_factor);
        assert!(cleared.two_factor_secret.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reads_are_served_while_a_password_hashes() {
        let store = temp_store().await;
        store.ensure_default_admin(&cheap_security()).await.unwrap();
        let slow = SecurityConfig {
            argon2_memory_cost_kib: 64 * 1024,
            argon2_time_cost: 8,
            ..SecurityConfig::default()
        };
        let directory = std::sync::Arc::new(UserDirectory::load(store, slow).await.unwrap());

        let writer = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.create("hank", "pw", false).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let listed = tokio::time::timeout(std::time::Duration::from_millis(100), directory.list())
            .await
            .expect("list blocked behind password hashing");
        assert_eq!(listed.len(), 1);

        writer.await.unwrap().unwrap();
        assert!(directory.find_by_username("hank").await.is_some());
    }

    #[tokio::test]
    async fn unknown_ids_are_ignored() {
        let (_, directory) = directory().await;
        assert!(directory.toggle_admin(9999).await.unwrap().is_none());
        assert!(directory.clear_two_factor(9999).await.unwrap().is_none());
    }
}
