//! 房间服务

use std::sync::Arc;

use serde::Serialize;

use domain::Room;

use crate::error::{ApplicationError, ApplicationResult};
use crate::hub::Hub;
use crate::store::RoomStore;

const DEFAULT_ROOM_LIMIT: i64 = 100;
const MAX_ROOM_LIMIT: i64 = 200;

/// 对外输出的房间数据，附带实时在线人数
#[derive(Debug, Serialize)]
pub struct RoomSummary {
    pub id: i64,
    pub name: String,
    pub online: i32,
}

pub struct RoomService {
    rooms: Arc<dyn RoomStore>,
    hub: Arc<Hub>,
}

impl RoomService {
    pub fn new(rooms: Arc<dyn RoomStore>, hub: Arc<Hub>) -> Self {
        Self { rooms, hub }
    }

    pub async fn create(&self, name: &str, owner_id: i64) -> ApplicationResult<Room> {
        Ok(self.rooms.create(name, owner_id).await?)
    }

    /// 按 id 降序返回房间列表，并为每个房间读取在线计数。
    pub async fn list(&self, limit: i64) -> ApplicationResult<Vec<RoomSummary>> {
        let limit = if limit <= 0 || limit > MAX_ROOM_LIMIT {
            DEFAULT_ROOM_LIMIT
        } else {
            limit
        };
        let rooms = self.rooms.list(limit).await?;
        Ok(rooms
            .into_iter()
            .map(|room| RoomSummary {
                online: self.hub.online(room.id),
                id: room.id,
                name: room.name,
            })
            .collect())
    }

    pub async fn find(&self, room_id: i64) -> ApplicationResult<Room> {
        self.rooms
            .find_by_id(room_id)
            .await?
            .ok_or(ApplicationError::RoomNotFound)
    }
}
