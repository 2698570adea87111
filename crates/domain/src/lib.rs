//! 领域模型
//!
//! 聊天服务的核心实体、房间内实时事件的线格式，以及仓储层错误类型。

pub mod errors;
pub mod events;
pub mod message;
pub mod refresh_token;
pub mod room;
pub mod user;

pub use errors::{RepositoryError, RepositoryResult};
pub use events::ChatEvent;
pub use message::{Message, MAX_MESSAGE_CHARS};
pub use refresh_token::RefreshToken;
pub use room::{Room, MAX_ROOM_NAME_CHARS};
pub use user::{User, MAX_USERNAME_CHARS, MIN_USERNAME_CHARS};
