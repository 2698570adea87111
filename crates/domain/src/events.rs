//! 房间内实时事件的线格式
//!
//! 所有 WebSocket 出站帧都是本枚举的一个变体，按 `type` 字段区分；
//! 历史消息接口复用 `Message` 变体，保证 REST 与实时通道的格式一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// 客户端应用层心跳的回应
    Pong,

    /// 成员加入房间，`online` 为加入后的在线人数
    Join {
        room_id: i64,
        user_id: i64,
        username: String,
        online: i32,
    },

    /// 成员离开房间，`online` 为离开后的在线人数
    Leave {
        room_id: i64,
        user_id: i64,
        username: String,
        online: i32,
    },

    /// 输入状态提示，不落库
    Typing {
        room_id: i64,
        user_id: i64,
        username: String,
        is_typing: bool,
    },

    /// 聊天消息，广播前已持久化
    Message {
        id: i64,
        room_id: i64,
        user_id: i64,
        username: String,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// 仅发给出错请求发起者的错误提示
    Error { content: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn join_event_wire_format() {
        let event = ChatEvent::Join {
            room_id: 1,
            user_id: 7,
            username: "alice".to_string(),
            online: 2,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["room_id"], 1);
        assert_eq!(json["user_id"], 7);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["online"], 2);
    }

    #[test]
    fn message_event_serializes_rfc3339_timestamp() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let event = ChatEvent::Message {
            id: 42,
            room_id: 1,
            user_id: 7,
            username: "alice".to_string(),
            content: "hi".to_string(),
            created_at,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["id"], 42);
        assert_eq!(json["content"], "hi");
        assert!(json["created_at"]
            .as_str()
            .unwrap()
            .starts_with("2024-05-01T12:30:00"));
    }

    #[test]
    fn pong_event_has_no_extra_fields() {
        let json = serde_json::to_string(&ChatEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn typing_event_round_trip() {
        let event = ChatEvent::Typing {
            room_id: 3,
            user_id: 9,
            username: "bob".to_string(),
            is_typing: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
