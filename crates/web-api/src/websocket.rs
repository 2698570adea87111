//! WebSocket 升级握手
//!
//! 协议切换前依次完成：房间参数校验、房间存在性检查、令牌提取与校验、
//! 用户存在性检查以及 Origin 校验；任何一步失败都以普通 HTTP 错误返回。

use application::ApplicationError;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    auth,
    error::ApiError,
    state::AppState,
    ws_connection::{self, SessionContext},
};

/// 单帧读取上限：1 MiB
const READ_LIMIT_BYTES: usize = 1 << 20;

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    room_id: Option<String>,
    token: Option<String>,
}

pub(crate) async fn serve(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let room_id = match query
        .room_id
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|id| *id > 0)
    {
        Some(id) => id,
        None => return ApiError::bad_request("invalid room_id").into_response(),
    };
    if let Err(err) = state.rooms.find(room_id).await {
        return match err {
            ApplicationError::RoomNotFound => {
                ApiError::not_found("room not found").into_response()
            }
            other => ApiError::from(other).into_response(),
        };
    }

    // 浏览器无法在握手时自定义请求头，token 允许从查询参数兜底传入
    let token = auth::bearer_token(&headers)
        .map(str::to_owned)
        .or_else(|| query.token.clone());
    let Some(token) = token else {
        return ApiError::unauthorized("missing token").into_response();
    };
    let claims = match state.tokens.verify_access(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::info!(error = %err, room_id, "ws upgrade rejected: invalid token");
            return ApiError::unauthorized("invalid token").into_response();
        }
    };
    let user = match state.users.get(claims.uid).await {
        Ok(user) => user,
        Err(_) => return ApiError::unauthorized("user not found").into_response(),
    };

    if state.env != "dev" && !origin_allowed(&headers) {
        return ApiError::new(StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let room = state.hub.room(room_id);
    ws.max_message_size(READ_LIMIT_BYTES)
        .on_upgrade(move |socket| {
            ws_connection::run(
                socket,
                SessionContext {
                    state,
                    room,
                    room_id,
                    user_id: user.id,
                    username: user.username,
                },
            )
        })
}

/// Origin 的 authority 必须与请求 Host 完全一致（大小写不敏感）。
fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Some(host) = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    origin
        .parse::<Uri>()
        .ok()
        .and_then(|uri| {
            uri.authority()
                .map(|authority| authority.as_str().eq_ignore_ascii_case(host))
        })
        .unwrap_or(false)
}
