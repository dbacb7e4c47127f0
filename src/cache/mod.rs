// 缓存模块
// 本地权威副本 + 共享存储镜像，包含数据结构和操作逻辑

pub mod keys;
pub mod mirror;
pub mod models;
pub mod operations;
pub mod store;

// 重新导出常用类型，方便其他模块使用
pub use mirror::{CacheRecord, Mirror};
pub use models::{RateLimitDecision, RateLimitRecord, SessionRecord, SessionType};
pub use operations::{RateLimiter, SessionManager};
pub use store::{RedisStore, SharedStore, StoreError};
