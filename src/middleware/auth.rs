use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::cache::{SessionManager, SessionRecord};
use crate::error::AppError;

/// Authorization 头的认证方式
#[derive(Debug, PartialEq, Eq)]
pub enum AuthScheme<'a> {
    /// 独立的认证路径，这里不处理
    Basic(&'a str),
    /// 预留给访问令牌
    Bearer(&'a str),
    Session(&'a str),
}

impl<'a> AuthScheme<'a> {
    /// 只有认证方式、没有凭据时（如单独的 `Bearer`）凭据为空串
    pub fn parse(value: &'a str) -> Result<Self, AppError> {
        let value = value.trim();
        let (scheme, credentials) = value.split_once(' ').unwrap_or((value, ""));
        let credentials = credentials.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            Ok(AuthScheme::Basic(credentials))
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Ok(AuthScheme::Bearer(credentials))
        } else if scheme.eq_ignore_ascii_case("session") {
            Ok(AuthScheme::Session(credentials))
        } else {
            Err(AppError::UnknownScheme)
        }
    }
}

/// 当前登录用户，由会话中间件放入请求扩展
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub session: SessionRecord,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.session.user.flags & crate::database::ADMIN_FLAG != 0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 会话认证中间件。
///
/// 令牌必须通过校验，并且用户当前的会话记录仍然存在、令牌一致；
/// 登出或重新登录后旧令牌立即失效。
pub async fn session_middleware(
    State(sessions): State<Arc<SessionManager>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => {
            let value = value.to_str().map_err(|_| AppError::UnknownScheme)?;
            match AuthScheme::parse(value)? {
                AuthScheme::Basic(_) | AuthScheme::Bearer(_) => None,
                AuthScheme::Session(token) => Some(token.to_string()),
            }
        }
    };

    let Some(token) = token else {
        return Ok(next.run(req).await);
    };

    let claims = sessions.tokens().decode_token(&token)?;
    let session = sessions
        .get(&claims.user_id)
        .await
        .ok_or(AppError::SessionRevoked)?;

    if session.token != token {
        tracing::debug!("Rejecting superseded session token for {}", claims.user_id);
        return Err(AppError::SessionRevoked);
    }

    req.extensions_mut().insert(CurrentUser {
        id: claims.user_id,
        session,
    });

    Ok(next.run(req).await)
}
