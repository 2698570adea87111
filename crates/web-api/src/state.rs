use std::sync::Arc;

use application::{Hub, MessageService, RoomService, TokenService, UserService};

/// 路由与中间件共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub rooms: Arc<RoomService>,
    pub messages: Arc<MessageService>,
    pub tokens: Arc<TokenService>,
    pub hub: Arc<Hub>,
    /// 运行环境；`dev` 下放宽 Origin 与跨域校验
    pub env: String,
}
