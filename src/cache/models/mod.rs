/// 缓存数据模型
pub mod rate_limit;
pub mod session;

pub use rate_limit::{RateLimitDecision, RateLimitRecord};
pub use session::{SessionRecord, SessionType};
