//! 仓储接口
//!
//! 应用层只依赖这些窄接口；Postgres 实现见 infrastructure crate，
//! 单元测试用内存实现替代。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Message, RefreshToken, RepositoryResult, Room, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// 创建用户；用户名唯一约束冲突返回 `RepositoryError::Conflict`。
    async fn create(&self, username: &str, password_hash: &str) -> RepositoryResult<User>;

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;

    /// 批量查询用户名，一次往返；不存在的 id 不出现在结果中。
    async fn find_usernames(&self, ids: &[i64]) -> RepositoryResult<HashMap<i64, String>>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create(&self, name: &str, owner_id: i64) -> RepositoryResult<Room>;

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Room>>;

    /// 按 id 降序返回房间列表。
    async fn list(&self, limit: i64) -> RepositoryResult<Vec<Room>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, room_id: i64, user_id: i64, content: &str) -> RepositoryResult<Message>;

    /// 按 id 降序查询 `before_id` 之前的消息；`before_id = 0` 表示从最新开始。
    async fn list_by_room(
        &self,
        room_id: i64,
        limit: i64,
        before_id: i64,
    ) -> RepositoryResult<Vec<Message>>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// 查询仍然有效（未撤销且未过期）的令牌记录。
    async fn find_valid(&self, token: &str) -> RepositoryResult<Option<RefreshToken>>;

    async fn revoke(&self, token: &str) -> RepositoryResult<()>;

    /// 旋转刷新令牌：校验旧令牌、撤销它并持久化新令牌，三步在同一事务中完成。
    /// 旧令牌无效时返回 `RepositoryError::NotFound`；成功时返回令牌所属用户 id。
    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<i64>;
}
