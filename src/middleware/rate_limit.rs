use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::cache::RateLimiter;
use crate::error::AppError;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// 解析客户端 IP：True-Client-IP、X-Real-IP、X-Forwarded-For 第一跳，最后是连接地址
pub fn client_ip(req: &Request<Body>) -> String {
    let headers = req.headers();

    header(headers, "true-client-ip")
        .or_else(|| header(headers, "x-real-ip"))
        .or_else(|| {
            header(headers, "x-forwarded-for")
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        })
        .map(str::to_string)
        .or_else(|| {
            // 降级使用连接IP
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let decision = limiter.get(&ip).await;
    let record = decision.record;

    if !decision.allowed {
        tracing::debug!("Rejecting request from {}, ratelimit exhausted", ip);
        return AppError::RateLimited {
            retry_after: record.retry_after_secs(Utc::now()),
            ip,
        }
        .into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(record.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(record.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(record.reset_millis()));
    response
}
