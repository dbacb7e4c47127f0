use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::cache::keys::RATE_LIMITS_KEY;
use crate::cache::mirror::{CacheRecord, Mirror};
use crate::cache::models::rate_limit::{RateLimitDecision, RateLimitRecord};
use crate::cache::store::{SharedStore, StoreError};

/// 速率限制缓存操作（按客户端 IP 的固定窗口计数）
pub struct RateLimiter {
    mirror: Arc<Mirror<RateLimitRecord>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, limit: u32, window: Duration) -> Self {
        Self {
            mirror: Arc::new(Mirror::new(RATE_LIMITS_KEY, store)),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 启动时从共享存储加载
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        self.mirror.hydrate().await
    }

    /// 每个请求调用一次：取出客户端的记录，未超限则扣减一次并写回。
    ///
    /// 读共享存储失败时放行（优先用本地记录，没有则视为新客户端），
    /// 不能因为 Redis 故障拒绝所有流量。
    pub async fn get(&self, client: &str) -> RateLimitDecision {
        let slot = self.mirror.slot(client);
        let mut local = slot.lock().await;
        let now = Utc::now();

        let stored = match self.mirror.load(client).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Unable to read ratelimit for {} from the shared store: {}", client, e);
                local.clone()
            }
        };

        let current = match stored {
            Some(record) if !record.is_expired_at(now) => record.clamped(),
            _ => RateLimitRecord::starting_at(self.limit, self.window, now),
        };

        let allowed = !current.is_exceeded_at(now);
        let record = if allowed {
            let consumed = current.consume();
            if let Err(e) = self.mirror.save(client, &consumed).await {
                warn!("Unable to store ratelimit for {}: {}", client, e);
            }
            consumed
        } else {
            debug!("Client {} has exhausted its ratelimit until {}", client, current.reset_time);
            current
        };

        *local = Some(record.clone());
        RateLimitDecision { record, allowed }
    }

    /// 本地副本，不修改任何状态
    pub async fn cached(&self, client: &str) -> Option<RateLimitRecord> {
        self.mirror.cached(client).await
    }

    pub fn spawn_sweeper(&self, period: StdDuration) {
        self.mirror.spawn_sweeper(period);
    }

    pub async fn sweep(&self) -> usize {
        self.mirror.sweep().await
    }

    /// 关闭时把共享存储中缺失的记录写回
    pub async fn close(&self) -> usize {
        self.mirror.close().await
    }
}
