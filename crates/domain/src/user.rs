use chrono::{DateTime, Utc};
use serde::Serialize;

/// 用户名最短长度（字符数）
pub const MIN_USERNAME_CHARS: usize = 2;
/// 用户名最长长度（字符数）
pub const MAX_USERNAME_CHARS: usize = 64;

/// 注册用户
///
/// `username` 注册后不可修改，大小写敏感且全局唯一。
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
