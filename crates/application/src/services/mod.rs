pub mod message_service;
pub mod room_service;
pub mod user_service;

pub use message_service::MessageService;
pub use room_service::{RoomService, RoomSummary};
pub use user_service::{LoginTokens, TokenPair, UserService};

#[cfg(test)]
mod tests;
