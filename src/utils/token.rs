use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub iat: i64, // 签发时间
    pub exp: i64, // 过期时间
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// 无法解析：不是 JWT、base64 或 JSON 损坏
    #[error("malformed token: {0}")]
    Malformed(JwtError),
    /// 能解析但未通过校验：签名、算法或过期时间不对
    #[error("token rejected: {0}")]
    Rejected(JwtError),
    #[error("unable to sign token: {0}")]
    Signing(JwtError),
}

impl TokenError {
    fn classify(error: JwtError) -> Self {
        match error.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed(error),
            _ => TokenError::Rejected(error),
        }
    }
}

/// 身份令牌编解码。所有实例必须使用同一个密钥，密钥变化后旧令牌全部失效
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        // 只接受 HMAC 家族
        let mut validation = Validation::new(Algorithm::HS512);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn new_token(&self, user_id: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn validate_token(&self, token: &str) -> bool {
        self.decode_token(token).is_ok()
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::classify)
    }
}
