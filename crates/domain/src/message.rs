use chrono::{DateTime, Utc};
use serde::Serialize;

/// 单条消息内容的最大长度（字符数）
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// 聊天消息，仅追加写入
///
/// 同一房间内 `id` 的顺序与 `created_at` 的顺序一致。
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
