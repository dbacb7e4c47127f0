use std::time::Instant;

use axum::{
    body::{Body, Bytes, HttpBody, to_bytes},
    http::{
        Request,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

/// 超过该长度的错误响应不读取，原样返回
const MAX_LOGGED_BODY: usize = 16 * 1024;

/// 记录失败的请求。5xx 带上错误响应里的 message，4xx 只在 debug 级别记状态码
pub async fn log_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let elapsed = started.elapsed();

    if status.is_client_error() {
        debug!("{} {} -> {} in {:?}", method, path, status, elapsed);
        return response;
    }
    if !status.is_server_error() {
        return response;
    }

    if !is_small_json(&response) {
        error!("{} {} -> {} in {:?}, body not logged", method, path, status, elapsed);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("{} {} -> {}, unable to read error body: {}", method, path, status, e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        "{} {} -> {} in {:?}: {}",
        method,
        path,
        status,
        elapsed,
        error_message(&bytes)
    );

    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

fn is_small_json(response: &Response) -> bool {
    let json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    let small = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_LOGGED_BODY as u64);
    json && small
}

/// `{"message": ...}` 取 message，其他内容原样输出
fn error_message(bytes: &Bytes) -> String {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|body| body.get("message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, middleware::from_fn, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::error::AppError;
    use crate::test_support::body_json;

    fn app() -> Router {
        Router::new()
            .route("/boom", get(|| async { AppError::internal("Test failure", "disk on fire") }))
            .route("/denied", get(|| async { AppError::Unauthorized }))
            .route(
                "/huge-text",
                get(|| async { (StatusCode::BAD_GATEWAY, "x".repeat(MAX_LOGGED_BODY * 4)) }),
            )
            .route(
                "/huge-json",
                get(|| async {
                    let message = "y".repeat(MAX_LOGGED_BODY * 2);
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "message": message })))
                }),
            )
            .route("/ok", get(|| async { "fine" }))
            .layer(from_fn(log_responses))
    }

    async fn get_uri(uri: &str) -> Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_len(response: Response) -> usize {
        response.into_body().collect().await.unwrap().to_bytes().len()
    }

    #[tokio::test]
    async fn test_error_body_is_preserved() {
        let response = get_uri("/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Internal server error");

        let response = get_uri("/ok").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_client_errors_pass_through() {
        let response = get_uri("/denied").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(response).await["message"].is_string());
    }

    #[tokio::test]
    async fn test_large_error_bodies_are_not_truncated() {
        let response = get_uri("/huge-text").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_len(response).await, MAX_LOGGED_BODY * 4);

        let response = get_uri("/huge-json").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"].as_str().unwrap().len(), MAX_LOGGED_BODY * 2);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(&Bytes::from_static(br#"{"message":"Internal server error"}"#)),
            "Internal server error"
        );
        assert_eq!(error_message(&Bytes::from_static(b"upstream down")), "upstream down");
        assert_eq!(error_message(&Bytes::from_static(br#"{"code":1}"#)), r#"{"code":1}"#);
    }
}
