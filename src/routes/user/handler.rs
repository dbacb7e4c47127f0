use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};

use crate::{
    AppState, database::PublicUser, error::AppError, middleware::CurrentUser,
    utils::verify_password,
};

use super::model::{LoginRequest, LoginResponse};

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .users
        .find_by_username(&req.username)
        .await
        .map_err(|e| AppError::internal("Unable to load user for login", e))?
        .ok_or(AppError::InvalidCredentials)?;

    // bcrypt 比较耗时，放到阻塞线程池
    let hash = user.password.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::internal("Password check panicked", e))?
        .map_err(|e| AppError::internal("Unable to verify password", e))?;

    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    if user.disabled {
        return Err(AppError::AccountDisabled);
    }

    let session = state
        .sessions
        .create(&user.id)
        .await
        .ok_or_else(|| AppError::internal("Unable to create session", &user.id))?;

    tracing::info!("User {} logged in", user.id);
    Ok(Json(LoginResponse {
        token: session.token,
        user: session.user,
    }))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .delete(&current.id)
        .await
        .map_err(|e| AppError::internal("Unable to delete session", e))?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(&current.id)
        .await
        .map_err(|e| AppError::internal("Unable to load user", e))?
        .ok_or_else(|| AppError::UserNotFound(current.id.clone()))?;

    Ok(Json(PublicUser::from(&user)))
}

#[axum::debug_handler]
pub async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .users
        .delete(&current.id)
        .await
        .map_err(|e| AppError::internal("Unable to delete user", e))?;

    if !deleted {
        return Err(AppError::UserNotFound(current.id));
    }

    // 用户已删除，残留的会话会在下一次读取时被清理
    if let Err(e) = state.sessions.delete(&current.id).await {
        tracing::warn!("Unable to delete session of removed user {}: {}", current.id, e);
    }

    tracing::info!("User {} deleted their account", current.id);
    Ok(StatusCode::NO_CONTENT)
}

async fn set_disabled(
    state: &AppState,
    current: &CurrentUser,
    id: &str,
    disabled: bool,
) -> Result<StatusCode, AppError> {
    if !current.is_admin() {
        return Err(AppError::Forbidden);
    }

    let updated = state
        .users
        .set_disabled(id, disabled)
        .await
        .map_err(|e| AppError::internal("Unable to update user", e))?;

    if !updated {
        return Err(AppError::UserNotFound(id.to_string()));
    }

    // 状态变化后强制重新登录
    state
        .sessions
        .delete(id)
        .await
        .map_err(|e| AppError::internal("Unable to delete session", e))?;

    tracing::info!(
        "User {} was {} by {}",
        id,
        if disabled { "disabled" } else { "enabled" },
        current.id
    );
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn disable(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    set_disabled(&state, &current, &id, true).await
}

#[axum::debug_handler]
pub async fn enable(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    set_disabled(&state, &current, &id, false).await
}
