/// 缓存操作

// 速率限制
pub mod rate_limit;

// 会话
pub mod session;

pub use rate_limit::RateLimiter;
pub use session::SessionManager;
