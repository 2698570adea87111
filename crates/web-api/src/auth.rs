//! Bearer 鉴权中间件
//!
//! 校验访问令牌并确认用户仍然存在，通过后把当前用户注入请求扩展。

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, state::AppState};

/// 鉴权通过后挂在请求扩展上的当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

/// 提取 `Authorization: Bearer <token>`，scheme 大小写不敏感。
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ") {
        Some(value[7..].trim())
    } else {
        None
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return ApiError::unauthorized("missing bearer token").into_response();
    };
    let claims = match state.tokens.verify_access(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::info!(error = %err, "request rejected: invalid access token");
            return ApiError::unauthorized("invalid token").into_response();
        }
    };
    let user = match state.users.get(claims.uid).await {
        Ok(user) => user,
        Err(_) => return ApiError::unauthorized("user not found").into_response(),
    };

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
    });
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("BEARER abc")), Some("abc"));
    }

    #[test]
    fn non_bearer_schemes_are_rejected() {
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
