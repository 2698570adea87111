//! 消息服务
//!
//! 历史查询内部按 id 降序翻页，返回前反转为升序，
//! 并单次往返批量补齐发送者用户名。

use std::collections::HashSet;
use std::sync::Arc;

use domain::{ChatEvent, Message};

use crate::error::ApplicationResult;
use crate::store::{MessageStore, UserStore};

const DEFAULT_MESSAGE_LIMIT: i64 = 50;
const MAX_MESSAGE_LIMIT: i64 = 200;

pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserStore>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageStore>, users: Arc<dyn UserStore>) -> Self {
        Self { messages, users }
    }

    /// 持久化一条消息；广播只能发生在本调用成功之后。
    pub async fn store(
        &self,
        room_id: i64,
        user_id: i64,
        content: &str,
    ) -> ApplicationResult<Message> {
        Ok(self.messages.create(room_id, user_id, content).await?)
    }

    /// 分页查询房间历史消息，按 id 升序返回。
    pub async fn history(
        &self,
        room_id: i64,
        limit: i64,
        before_id: i64,
    ) -> ApplicationResult<Vec<ChatEvent>> {
        let limit = if limit <= 0 || limit > MAX_MESSAGE_LIMIT {
            DEFAULT_MESSAGE_LIMIT
        } else {
            limit
        };

        let mut messages = self
            .messages
            .list_by_room(room_id, limit, before_id)
            .await?;
        messages.reverse();

        let user_ids: Vec<i64> = messages
            .iter()
            .map(|m| m.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let usernames = if user_ids.is_empty() {
            Default::default()
        } else {
            self.users.find_usernames(&user_ids).await?
        };

        Ok(messages
            .into_iter()
            .map(|m| ChatEvent::Message {
                username: usernames.get(&m.user_id).cloned().unwrap_or_default(),
                id: m.id,
                room_id: m.room_id,
                user_id: m.user_id,
                content: m.content,
                created_at: m.created_at,
            })
            .collect())
    }
}
