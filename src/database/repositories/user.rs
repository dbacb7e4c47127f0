use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::user::UserEntity;

/// 数据库错误。找不到用户不是错误，用 `Ok(None)` / `Ok(false)` 表示
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// 用户存储库
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserEntity>, RepositoryError>;

    async fn find_by_username(&self, username: &str)
    -> Result<Option<UserEntity>, RepositoryError>;

    /// 返回是否删除了用户
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    /// 返回是否更新了用户
    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<bool, RepositoryError>;
}

const USER_COLUMNS: &str = "id, username, email, password, name, description, avatar_url, \
                            disabled, flags, created_at, updated_at";

/// Postgres 实现
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserEntity>, RepositoryError> {
        let user = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserEntity>, RepositoryError> {
        let user = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Deleted {} user row(s) for {}", result.rows_affected(), id);
        Ok(result.rows_affected() > 0)
    }

    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET disabled = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(disabled)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
