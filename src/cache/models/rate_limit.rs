use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::mirror::CacheRecord;

/// 速率限制缓存数据模型（固定窗口计数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub limit: u32,
}

impl RateLimitRecord {
    /// 新窗口，额度为满
    pub fn starting_at(limit: u32, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            remaining: limit,
            reset_time: now + window,
            limit,
        }
    }

    /// 消耗一次额度，最低到 0
    pub fn consume(&self) -> Self {
        Self {
            remaining: self.remaining.saturating_sub(1),
            ..self.clone()
        }
    }

    /// 修正存储中 remaining 超过 limit 的记录
    pub fn clamped(self) -> Self {
        Self {
            remaining: self.remaining.min(self.limit),
            ..self
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_exceeded(&self) -> bool {
        self.is_exceeded_at(Utc::now())
    }

    pub fn is_exceeded_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining == 0 && !self.is_expired_at(now)
    }

    /// 距离窗口结束的秒数，向上取整
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_time - now).num_milliseconds().max(0);
        (millis + 999) / 1000
    }

    /// 窗口结束时间（毫秒时间戳）
    pub fn reset_millis(&self) -> i64 {
        self.reset_time.timestamp_millis()
    }
}

impl CacheRecord for RateLimitRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.reset_time
    }
}

/// 一次请求的限流结果
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub record: RateLimitRecord,
    pub allowed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeded_only_inside_window() {
        let now = Utc::now();
        let mut record = RateLimitRecord::starting_at(1, Duration::seconds(30), now);
        assert!(!record.is_exceeded_at(now));

        record = record.consume();
        assert_eq!(record.remaining, 0);
        assert!(record.is_exceeded_at(now));
        assert!(!record.is_exceeded_at(now + Duration::seconds(30)));
        assert!(record.is_expired_at(now + Duration::seconds(30)));
    }

    #[test]
    fn test_consume_never_underflows() {
        let record = RateLimitRecord::starting_at(1, Duration::hours(1), Utc::now());
        assert_eq!(record.consume().consume().remaining, 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let record = RateLimitRecord::starting_at(3, Duration::milliseconds(1500), now);
        assert_eq!(record.retry_after_secs(now), 2);
        assert_eq!(record.retry_after_secs(now + Duration::seconds(5)), 0);
        assert_eq!(record.reset_millis(), (now + Duration::milliseconds(1500)).timestamp_millis());
    }

    #[test]
    fn test_clamped_restores_invariant() {
        let record = RateLimitRecord {
            remaining: 50,
            reset_time: Utc::now(),
            limit: 10,
        };
        assert_eq!(record.clamped().remaining, 10);
    }

    #[test]
    fn test_stored_field_names() {
        let record = RateLimitRecord::starting_at(5, Duration::hours(1), Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["remaining"], 5);
        assert_eq!(value["limit"], 5);
        assert!(value["reset_time"].is_string());
    }
}
