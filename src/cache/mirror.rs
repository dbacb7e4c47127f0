use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::{SharedStore, StoreError};

/// 可以镜像到共享存储的缓存记录
pub trait CacheRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn expires_at(&self) -> DateTime<Utc>;

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// 单个键的槽位。持有锁即独占该键的读-改-写
pub type Slot<T> = Arc<Mutex<Option<T>>>;

/// 进程内的权威副本 + 共享存储中的镜像副本。
///
/// 本地表是分片的 `DashMap`，每个键一个异步互斥槽位；对同一个键的
/// 修改在持锁期间完成整个共享存储往返，因此同一进程内是线性一致的，
/// 不同键之间互不阻塞。
pub struct Mirror<T> {
    collection: &'static str,
    store: Arc<dyn SharedStore>,
    slots: DashMap<String, Slot<T>>,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: CacheRecord> Mirror<T> {
    pub fn new(collection: &'static str, store: Arc<dyn SharedStore>) -> Self {
        Self {
            collection,
            store,
            slots: DashMap::new(),
            sweeper: StdMutex::new(None),
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 取得（必要时创建）键对应的槽位
    pub fn slot(&self, key: &str) -> Slot<T> {
        if let Some(slot) = self.slots.get(key) {
            return slot.value().clone();
        }

        self.slots
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone()
    }

    /// 读取本地副本，不创建槽位
    pub async fn cached(&self, key: &str) -> Option<T> {
        let slot = self.slots.get(key).map(|slot| slot.value().clone())?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// 槽位没有其他持有者时把它从本地表移除
    pub fn evict(&self, key: &str, slot: &Slot<T>) -> bool {
        self.slots
            .remove_if(key, |_, current| {
                Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2
            })
            .is_some()
    }

    /// 启动时从共享存储加载全部记录，过期或损坏的记录会被删除
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        let started = Instant::now();
        let entries = self.store.hgetall(self.collection).await?;
        let total = entries.len();
        let now = Utc::now();
        let mut loaded = 0;

        for (key, raw) in entries {
            match serde_json::from_str::<T>(&raw) {
                Ok(record) if record.is_expired_at(now) => {
                    debug!("Dropping expired {} entry for {}", self.collection, key);
                    self.purge_remote(&key).await;
                }
                Ok(record) => {
                    self.slots.insert(key, Arc::new(Mutex::new(Some(record))));
                    loaded += 1;
                }
                Err(e) => {
                    warn!("Unable to decode {} entry for {}, discarding: {}", self.collection, key, e);
                    self.purge_remote(&key).await;
                }
            }
        }

        info!(
            "Took {:?} to hydrate {} ({}/{} entries)",
            started.elapsed(),
            self.collection,
            loaded,
            total
        );

        Ok(loaded)
    }

    /// 从共享存储读取一条记录。损坏的记录被丢弃并视为不存在
    pub async fn load(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.hget(self.collection, key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Unable to decode {} entry for {}, discarding: {}", self.collection, key, e);
                self.purge_remote(key).await;
                Ok(None)
            }
        }
    }

    pub async fn save(&self, key: &str, record: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.store.hset(self.collection, key, &json).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store.hdel(self.collection, key).await
    }

    async fn purge_remote(&self, key: &str) {
        if let Err(e) = self.store.hdel(self.collection, key).await {
            warn!("Unable to delete {} entry for {}: {}", self.collection, key, e);
        }
    }

    fn is_stale(raw: &str, now: DateTime<Utc>) -> bool {
        serde_json::from_str::<T>(raw).map_or(true, |record| record.is_expired_at(now))
    }

    /// 清理过期记录：先清本地表，再清共享存储（包括其他副本写入的记录）。
    /// 返回移除的记录数。
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        let snapshot: Vec<(String, Slot<T>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, slot) in snapshot {
            // 正在被请求使用的槽位留给下一轮
            let Ok(mut local) = slot.try_lock() else {
                continue;
            };

            match local.as_ref() {
                Some(record) if !record.is_expired_at(now) => continue,
                Some(_) => {
                    *local = None;
                    removed += 1;
                }
                None => {}
            }

            drop(local);
            self.evict(&key, &slot);
        }

        let entries = match self.store.hgetall(self.collection).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Unable to list {} while sweeping: {}", self.collection, e);
                return removed;
            }
        };

        for (key, raw) in entries {
            if !Self::is_stale(&raw, now) {
                continue;
            }

            let slot = self.slot(&key);
            let local = slot.lock().await;

            // 持锁后重新读取，避免删掉刚写入的新记录
            match self.store.hget(self.collection, &key).await {
                Ok(Some(current)) if Self::is_stale(&current, now) => {
                    match self.store.hdel(self.collection, &key).await {
                        Ok(()) => {
                            info!("Expired {} entry for {}", self.collection, key);
                            removed += 1;
                        }
                        Err(e) => {
                            warn!("Unable to delete {} entry for {}: {}", self.collection, key, e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Unable to re-read {} entry for {}: {}", self.collection, key, e),
            }

            let emptied = local.is_none();
            drop(local);
            if emptied {
                self.evict(&key, &slot);
            }
        }

        removed
    }

    /// 把共享存储中缺失的本地记录写回，返回写回的数量
    pub async fn flush(&self) -> usize {
        let now = Utc::now();
        let mut flushed = 0;

        let snapshot: Vec<(String, Slot<T>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, slot) in snapshot {
            let local = slot.lock().await;
            let Some(record) = local.as_ref() else {
                continue;
            };

            if record.is_expired_at(now) {
                continue;
            }

            match self.store.hexists(self.collection, &key).await {
                Ok(true) => {}
                Ok(false) => match self.save(&key, record).await {
                    Ok(()) => flushed += 1,
                    Err(e) => warn!("Unable to flush {} entry for {}: {}", self.collection, key, e),
                },
                Err(e) => {
                    warn!("Unable to check {} entry for {}: {}", self.collection, key, e);
                }
            }
        }

        flushed
    }

    /// 启动周期清理任务。任务只持有弱引用，缓存被释放后自动退出
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) {
        let mirror = Arc::downgrade(self);
        let collection = self.collection;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(mirror) = mirror.upgrade() else {
                    break;
                };

                let removed = mirror.sweep().await;
                if removed > 0 {
                    debug!("Swept {} expired {} entries", removed, collection);
                }
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);

        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// 停止清理任务并写回本地记录
    pub async fn close(&self) -> usize {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        info!("Storing cached {} in the shared store", self.collection);
        let flushed = self.flush().await;
        info!("Stored {} cached {} entries", flushed, self.collection);
        flushed
    }
}
