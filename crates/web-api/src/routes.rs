//! REST 路由与处理器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;

use domain::{MAX_ROOM_NAME_CHARS, MAX_USERNAME_CHARS, MIN_USERNAME_CHARS};

use crate::{
    auth::{self, CurrentUser},
    cors,
    error::ApiError,
    metrics, rate_limit,
    rate_limit::RateLimiter,
    state::AppState,
    websocket,
};

const MIN_PASSWORD_CHARS: usize = 4;
const MAX_PASSWORD_CHARS: usize = 128;

/// 组装全部路由与中间件。
pub fn router(state: AppState) -> Router {
    // 单个 IP+路由每秒 20 个请求、突发 40，闲置两分钟的桶被回收
    let limiter = Arc::new(RateLimiter::new(20.0, 40.0, Duration::from_secs(120)));
    rate_limit::start_gc(Arc::clone(&limiter));

    let authed = Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{id}/messages", get(list_messages))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let api = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .merge(authed);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/v1", api)
        .route("/ws", get(websocket::serve))
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit,
        ))
        .layer(middleware::from_fn(metrics::track_http))
        .layer(cors::cors_layer(&state.env))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_endpoint() -> String {
    metrics::render()
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

fn credentials(
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(String, String), ApiError> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid payload"))?;
    let username = payload.username.unwrap_or_default().trim().to_string();
    let password = payload.password.unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("invalid payload"));
    }
    Ok((username, password))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (username, password) = credentials(payload)?;

    let username_len = username.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&username_len) {
        return Err(ApiError::bad_request("invalid username"));
    }
    let password_len = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password_len) {
        return Err(ApiError::bad_request("invalid password"));
    }

    let user = state.users.register(&username, &password).await?;
    Ok(Json(json!({ "id": user.id, "username": user.username })))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (username, password) = credentials(payload)?;

    let tokens = state.users.login(&username, &password).await?;
    Ok(Json(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "user": { "id": tokens.user.id, "username": tokens.user.username },
    })))
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh_token: Option<String>,
}

async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid payload"))?;
    let refresh_token = payload.refresh_token.unwrap_or_default();
    if refresh_token.is_empty() {
        return Err(ApiError::bad_request("invalid payload"));
    }

    let pair = state.users.refresh(&refresh_token).await?;
    Ok(Json(json!({
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    })))
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: Option<String>,
}

async fn create_room(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<CreateRoomPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid payload"))?;
    let name = payload.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("invalid payload"));
    }
    if name.chars().count() > MAX_ROOM_NAME_CHARS {
        return Err(ApiError::bad_request("invalid room name"));
    }

    let room = state.rooms.create(&name, user.id).await.map_err(|err| {
        tracing::error!(error = %err, owner_id = user.id, name = %name, "create room");
        ApiError::bad_request("failed to create room")
    })?;
    Ok(Json(json!({ "id": room.id, "name": room.name })))
}

async fn list_rooms(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    let rooms = state.rooms.list(100).await?;
    Ok(Json(json!({ "rooms": rooms })))
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let Path(room_id) = path.map_err(|_| ApiError::bad_request("invalid room id"))?;
    if room_id <= 0 {
        return Err(ApiError::bad_request("invalid room id"));
    }

    // 与历史客户端兼容：非法的 limit/before_id 按缺省处理而不是报错
    let limit = params
        .get("limit")
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(50);
    let before_id = params
        .get("before_id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .unwrap_or(0);

    let messages = state.messages.history(room_id, limit, before_id).await?;
    Ok(Json(json!({ "messages": messages })))
}
