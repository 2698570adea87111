//! 应用层
//!
//! 定义仓储接口、令牌服务、房间广播中枢以及围绕它们的业务服务。
//! 具体的 Postgres 实现位于 infrastructure crate。

pub mod error;
pub mod hub;
pub mod password;
pub mod services;
pub mod store;
pub mod token;

pub use error::ApplicationError;
pub use hub::{Hub, Member, RoomHub, SessionId, SEND_QUEUE_CAPACITY};
pub use password::{PasswordHashError, PasswordHasher};
pub use services::{MessageService, RoomService, UserService};
pub use store::{MessageStore, RefreshTokenStore, RoomStore, UserStore};
pub use token::{AccessClaims, TokenError, TokenService};
