use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub mod user;

pub async fn ping() -> &'static str {
    "pong"
}

/// 挂在 API_BASE_URI 下的全部路由
pub fn api_routes() -> Router<AppState> {
    let public_routes = Router::new()
        .route("/ping", get(ping))
        .route("/users/login", post(user::login));

    // 需要会话的路由，身份由 CurrentUser 提取
    let protected_routes = Router::new()
        .route("/users/logout", post(user::logout))
        .route("/users/@me", get(user::me).delete(user::delete_me))
        .route("/users/{id}/disable", post(user::disable))
        .route("/users/{id}/enable", post(user::enable));

    Router::new().merge(public_routes).merge(protected_routes)
}
