use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 管理员标记位
pub const ADMIN_FLAG: i32 = 1 << 0;

/// 用户数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub disabled: bool,
    pub flags: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserEntity {
    pub fn is_admin(&self) -> bool {
        self.flags & ADMIN_FLAG != 0
    }
}

/// 对外公开的用户快照，不包含密码和邮箱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub disabled: bool,
    pub flags: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserEntity> for PublicUser {
    fn from(user: &UserEntity) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            description: user.description.clone(),
            avatar_url: user.avatar_url.clone(),
            disabled: user.disabled,
            flags: user.flags,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
