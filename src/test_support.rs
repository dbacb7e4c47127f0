//! 测试用的内存实现，不需要 Redis 和 Postgres

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use http_body_util::BodyExt;

use crate::AppState;
use crate::cache::{SharedStore, StoreError};
use crate::config::Config;
use crate::database::{RepositoryError, UserEntity, UserRepository};
use crate::utils::TokenCodec;

pub const SECRET: &[u8] = b"test-secret-key-base-that-is-long-enough";
pub const PASSWORD: &str = "hunter2";

pub fn codec() -> TokenCodec {
    TokenCodec::new(SECRET, chrono::Duration::days(2))
}

/// 内存共享存储，可以模拟不可用
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, String>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn raw(&self, collection: &str, field: &str) -> Option<String> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|entries| entries.get(field).cloned())
    }

    pub fn insert_raw(&self, collection: &str, field: &str, value: &str) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn hget(&self, collection: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.raw(collection, field))
    }

    async fn hset(&self, collection: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.insert_raw(collection, field, value);
        Ok(())
    }

    async fn hdel(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(entries) = self.collections.lock().unwrap().get_mut(collection) {
            entries.remove(field);
        }
        Ok(())
    }

    async fn hexists(&self, collection: &str, field: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.raw(collection, field).is_some())
    }

    async fn hgetall(&self, collection: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check()?;
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

/// 内存用户库
#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<String, UserEntity>>,
    unavailable: AtomicBool,
}

impl MemoryUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, user: UserEntity) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn remove(&self, id: &str) {
        self.users.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<UserEntity> {
        self.users.lock().unwrap().get(id).cloned()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserEntity>, RepositoryError> {
        self.check()?;
        Ok(self.get(id))
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserEntity>, RepositoryError> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self.users.lock().unwrap().remove(id).is_some())
    }

    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<bool, RepositoryError> {
        self.check()?;
        match self.users.lock().unwrap().get_mut(id) {
            Some(user) => {
                user.disabled = disabled;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// 密码为 [`PASSWORD`] 的普通用户
pub fn user(id: &str, username: &str) -> UserEntity {
    let now = Utc::now();
    UserEntity {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: bcrypt::hash(PASSWORD, 4).unwrap(),
        name: None,
        description: None,
        avatar_url: None,
        disabled: false,
        flags: 0,
        created_at: now,
        updated_at: now,
    }
}

pub fn test_state(store: Arc<MemoryStore>, users: Arc<MemoryUsers>) -> AppState {
    AppState::new(Config::default_for_test(), store, users)
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
