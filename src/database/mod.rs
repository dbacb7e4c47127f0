// 数据库模块
// 用户实体和存储库

pub mod models;
pub mod repositories;

pub use models::user::{ADMIN_FLAG, PublicUser, UserEntity};
pub use repositories::user::{PgUserRepository, RepositoryError, UserRepository};
