// src/core/auth.rs

//! Optional opaque-token subscribe-time authentication. A small
//! `AuthStore` trait with the same three-backend split as the Storage
//! Backend.
//!
//! Passwords are hashed with `sha2` rather than MD5: MD5 is reserved in
//! this crate exclusively for the content-hash algorithm in `resolver.rs`
//! and must not be reused for anything security-adjacent.

use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexMap;
use mongodb::bson::doc;
use mongodb::Collection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::LivecfgError;

const AUTH_DATA_SCOPE: &str = "rt_auth_data";
const AUTH_FILE_NAME: &str = "user.data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub created: String,
    pub lut: String,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn get_all(&self) -> Result<IndexMap<String, UserRecord>, LivecfgError>;
    async fn save_all(&self, users: &IndexMap<String, UserRecord>) -> Result<(), LivecfgError>;
}

pub struct FileAuthStore {
    path: PathBuf,
}

impl FileAuthStore {
    pub fn new(store_directory: impl Into<PathBuf>) -> Self {
        Self {
            path: store_directory.into().join(AUTH_FILE_NAME),
        }
    }
}

#[async_trait]
impl AuthStore for FileAuthStore {
    async fn get_all(&self) -> Result<IndexMap<String, UserRecord>, LivecfgError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_all(&self, users: &IndexMap<String, UserRecord>) -> Result<(), LivecfgError> {
        tokio::fs::write(&self.path, serde_json::to_string(users)?).await?;
        Ok(())
    }
}

pub struct RedisAuthStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisAuthStore {
    pub async fn new(url: &str) -> Result<Self, LivecfgError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            manager: client.get_connection_manager().await?,
        })
    }
}

#[async_trait]
impl AuthStore for RedisAuthStore {
    async fn get_all(&self) -> Result<IndexMap<String, UserRecord>, LivecfgError> {
        let mut conn = self.manager.clone();
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(AUTH_DATA_SCOPE).await?;
        let mut out = IndexMap::new();
        for (username, value) in raw {
            out.insert(username, serde_json::from_str(&value)?);
        }
        Ok(out)
    }

    async fn save_all(&self, users: &IndexMap<String, UserRecord>) -> Result<(), LivecfgError> {
        let mut conn = self.manager.clone();
        for (username, record) in users {
            let _: () = conn
                .hset(AUTH_DATA_SCOPE, username, serde_json::to_string(record)?)
                .await?;
        }
        Ok(())
    }
}

pub struct MongoAuthStore {
    collection: Collection<UserRecord>,
}

impl MongoAuthStore {
    pub async fn new(url: &str) -> Result<Self, LivecfgError> {
        let client = mongodb::Client::with_uri_str(url).await?;
        let db = client.default_database().ok_or_else(|| {
            LivecfgError::Backend("mongodb URL must name a default database".to_string())
        })?;
        Ok(Self {
            collection: db.collection(AUTH_DATA_SCOPE),
        })
    }
}

#[async_trait]
impl AuthStore for MongoAuthStore {
    async fn get_all(&self) -> Result<IndexMap<String, UserRecord>, LivecfgError> {
        use futures::TryStreamExt;
        let mut cursor = self.collection.find(doc! {}).await?;
        let mut out = IndexMap::new();
        while let Some(record) = cursor.try_next().await? {
            out.insert(record.username.clone(), record);
        }
        Ok(out)
    }

    async fn save_all(&self, users: &IndexMap<String, UserRecord>) -> Result<(), LivecfgError> {
        for (username, record) in users {
            let existing = self
                .collection
                .find_one(doc! { "username": username })
                .await?;
            if existing.is_some() {
                self.collection
                    .replace_one(doc! { "username": username }, record)
                    .await?;
            } else {
                self.collection.insert_one(record).await?;
            }
        }
        Ok(())
    }
}

/// Facade over one `AuthStore`, mirroring `auth.py`'s `AuthManager` base
/// class: password hashing, `update_user`, `check_password`, `init_admin`.
pub struct AuthManager {
    store: Box<dyn AuthStore>,
}

impl AuthManager {
    pub fn new(store: Box<dyn AuthStore>) -> Self {
        Self { store }
    }

    pub fn hash_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    pub async fn update_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), LivecfgError> {
        let mut users = self.store.get_all().await?;
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let hashed = Self::hash_password(password);
        match users.get_mut(username) {
            Some(existing) => {
                existing.password = hashed;
                existing.lut = now;
            }
            None => {
                let next_id = users.values().map(|u| u.id).max().unwrap_or(0) + 1;
                users.insert(
                    username.to_string(),
                    UserRecord {
                        id: next_id,
                        username: username.to_string(),
                        password: hashed,
                        created: now.clone(),
                        lut: now,
                    },
                );
            }
        }
        self.store.save_all(&users).await
    }

    pub async fn check_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, LivecfgError> {
        let users = self.store.get_all().await?;
        let user = users
            .get(username)
            .ok_or_else(|| LivecfgError::GlobalApi("username does not exist".to_string()))?;
        if user.password != Self::hash_password(password) {
            return Err(LivecfgError::GlobalApi("incorrect password".to_string()));
        }
        Ok(user.clone())
    }

    /// Looks up a user by an opaque subscribe-time token. A user's hashed
    /// password doubles as their token: there is no separate token table,
    /// so a client authenticates by presenting the same opaque value the
    /// admin configured for it via `update_user`.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<UserRecord>, LivecfgError> {
        let users = self.store.get_all().await?;
        Ok(users.values().find(|u| u.password == token).cloned())
    }

    /// Seeds a default `admin`/`admin` account if none exists, as in
    /// `auth.py`'s `AuthManager.init_admin`.
    pub async fn init_admin(&self) -> Result<(), LivecfgError> {
        let users = self.store.get_all().await?;
        if !users.contains_key("admin") {
            self.update_user("admin", "admin").await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_admin_seeds_default_account_once() {
        let dir = tempdir().unwrap();
        let manager = AuthManager::new(Box::new(FileAuthStore::new(dir.path())));
        manager.init_admin().await.unwrap();
        manager.check_password("admin", "admin").await.unwrap();
    }

    #[tokio::test]
    async fn update_user_changes_password() {
        let dir = tempdir().unwrap();
        let manager = AuthManager::new(Box::new(FileAuthStore::new(dir.path())));
        manager.update_user("alice", "first").await.unwrap();
        manager.update_user("alice", "second").await.unwrap();
        assert!(manager.check_password("alice", "first").await.is_err());
        manager.check_password("alice", "second").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_username_fails() {
        let dir = tempdir().unwrap();
        let manager = AuthManager::new(Box::new(FileAuthStore::new(dir.path())));
        let err = manager.check_password("nobody", "x").await.unwrap_err();
        assert!(matches!(err, LivecfgError::GlobalApi(_)));
    }
}
