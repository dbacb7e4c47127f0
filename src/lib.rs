use std::sync::Arc;

use axum::{Router, middleware::from_fn, middleware::from_fn_with_state};
use tower::ServiceBuilder;

use cache::{RateLimiter, SessionManager, SharedStore};
use config::Config;
use database::UserRepository;
use utils::TokenCodec;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod utils;

#[cfg(test)]
mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// 组装缓存，不访问共享存储；加载和清理任务由调用方启动
    pub fn new(
        config: Config,
        store: Arc<dyn SharedStore>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        let tokens = TokenCodec::new(config.secret_key_base.as_bytes(), config.session_expiration());

        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            users.clone(),
            tokens,
            config.session_expiration(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(
            store,
            config.rate_limit_requests,
            config.rate_limit_window(),
        ));

        Self {
            config: Arc::new(config),
            users,
            sessions,
            rate_limiter,
        }
    }
}

/// 请求依次经过限流、会话认证和错误日志，再到具体路由
pub fn build_router(state: AppState) -> Router {
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        routes::api_routes()
    } else {
        Router::new().nest(base, routes::api_routes())
    };

    let router = router.layer(
        ServiceBuilder::new()
            .layer(from_fn_with_state(
                state.rate_limiter.clone(),
                middleware::rate_limit,
            ))
            .layer(from_fn_with_state(
                state.sessions.clone(),
                middleware::session_middleware,
            ))
            .layer(from_fn(middleware::log_responses)),
    );

    // 开发环境允许所有来源
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
