use chrono::{DateTime, Utc};
use serde::Serialize;

/// 房间名最长长度（字符数）
pub const MAX_ROOM_NAME_CHARS: usize = 128;

/// 聊天房间
#[derive(Debug, Clone, Serialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}
