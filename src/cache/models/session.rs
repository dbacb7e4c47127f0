use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::mirror::CacheRecord;
use crate::database::PublicUser;

/// 会话来源。目前只有网页登录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Web,
}

/// 会话缓存数据模型。
///
/// `user` 是创建会话时的快照，之后修改资料不会反映到这里，
/// 直到重新登录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub user: PublicUser,
    pub session_type: SessionType,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(user: PublicUser, token: String, ttl: Duration) -> Self {
        Self {
            token,
            user,
            session_type: SessionType::Web,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl CacheRecord for SessionRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
