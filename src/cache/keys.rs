/// 缓存键
/// 每个缓存在共享存储中对应一个 hash，字段是客户端 IP 或用户 ID

/// 速率限制 hash
pub const RATE_LIMITS_KEY: &str = "lingo:ratelimits";

/// 会话 hash
pub const SESSIONS_KEY: &str = "lingo:sessions";
