use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{error, info, warn};

use crate::cache::keys::SESSIONS_KEY;
use crate::cache::mirror::Mirror;
use crate::cache::models::session::SessionRecord;
use crate::cache::store::{SharedStore, StoreError};
use crate::database::{PublicUser, UserRepository};
use crate::utils::TokenCodec;

/// 会话缓存操作。每个用户最多一个会话，新的登录覆盖旧会话
pub struct SessionManager {
    mirror: Arc<Mirror<SessionRecord>>,
    users: Arc<dyn UserRepository>,
    tokens: TokenCodec,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SharedStore>,
        users: Arc<dyn UserRepository>,
        tokens: TokenCodec,
        ttl: Duration,
    ) -> Self {
        Self {
            mirror: Arc::new(Mirror::new(SESSIONS_KEY, store)),
            users,
            tokens,
            ttl,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        self.mirror.hydrate().await
    }

    /// 登录成功后创建会话。签名失败、用户不存在或无法写入共享存储时返回 `None`
    pub async fn create(&self, user_id: &str) -> Option<SessionRecord> {
        let token = match self.tokens.new_token(user_id) {
            Ok(token) => token,
            Err(e) => {
                error!("Unable to sign a session token for {}: {}", user_id, e);
                return None;
            }
        };

        let user = match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Unable to create a session for {}: user not found", user_id);
                return None;
            }
            Err(e) => {
                error!("Unable to load user {} for a new session: {}", user_id, e);
                return None;
            }
        };

        let record = SessionRecord::new(PublicUser::from(&user), token, self.ttl);

        let slot = self.mirror.slot(user_id);
        let mut local = slot.lock().await;
        if let Err(e) = self.mirror.save(user_id, &record).await {
            error!("Unable to store session for {}: {}", user_id, e);
            let emptied = local.is_none();
            drop(local);
            if emptied {
                self.mirror.evict(user_id, &slot);
            }
            return None;
        }

        *local = Some(record.clone());
        Some(record)
    }

    /// 读取会话并确认用户仍然存在。
    ///
    /// 共享存储不可用或用户库出错时返回 `None`，按未登录处理。
    pub async fn get(&self, user_id: &str) -> Option<SessionRecord> {
        let slot = self.mirror.slot(user_id);
        let mut local = slot.lock().await;

        let record = match self.mirror.load(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                *local = None;
                drop(local);
                self.mirror.evict(user_id, &slot);
                return None;
            }
            Err(e) => {
                warn!("Unable to read session for {} from the shared store: {}", user_id, e);
                return None;
            }
        };

        if record.is_expired() {
            self.purge(user_id, "expired").await;
            *local = None;
            drop(local);
            self.mirror.evict(user_id, &slot);
            return None;
        }

        match self.users.find_by_id(user_id).await {
            Ok(Some(_)) => {
                *local = Some(record.clone());
                Some(record)
            }
            Ok(None) => {
                self.purge(user_id, "user no longer exists").await;
                *local = None;
                drop(local);
                self.mirror.evict(user_id, &slot);
                None
            }
            Err(e) => {
                warn!("Unable to verify user {} for its session: {}", user_id, e);
                None
            }
        }
    }

    async fn purge(&self, user_id: &str, reason: &str) {
        match self.mirror.remove(user_id).await {
            Ok(()) => info!("Purged session for {} ({})", user_id, reason),
            Err(e) => error!(
                "Unable to purge session for {} ({}): {}. Remove it with HDEL {} {}",
                user_id, reason, e, SESSIONS_KEY, user_id
            ),
        }
    }

    /// 删除会话。会话不存在时也返回成功
    pub async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let slot = self.mirror.slot(user_id);
        let mut local = slot.lock().await;
        *local = None;
        let result = self.mirror.remove(user_id).await;
        drop(local);
        self.mirror.evict(user_id, &slot);
        result
    }

    /// 本地副本，不访问共享存储
    pub async fn cached(&self, user_id: &str) -> Option<SessionRecord> {
        self.mirror.cached(user_id).await
    }

    pub fn spawn_sweeper(&self, period: StdDuration) {
        self.mirror.spawn_sweeper(period);
    }

    pub async fn sweep(&self) -> usize {
        self.mirror.sweep().await
    }

    pub async fn close(&self) -> usize {
        self.mirror.close().await
    }
}
