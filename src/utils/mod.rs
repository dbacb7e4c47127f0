use bcrypt::verify;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod token;

pub use token::{Claims, TokenCodec, TokenError};

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// 生成随机密钥（64 位十六进制）
pub fn generate_secret() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    format!("{:x}", hasher.finalize())
}
