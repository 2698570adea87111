//! HTTP 与 WebSocket 接入层
//!
//! 基于 axum 的 REST 路由、鉴权中间件、WebSocket 升级与读写循环，
//! 以及跨域、限速、指标等横切中间件。

pub mod auth;
pub mod cors;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod state;
mod websocket;
mod ws_connection;

pub use auth::CurrentUser;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
