//! 基础设施层
//!
//! Postgres 仓储实现、连接池构建与 bcrypt 密码哈希。

pub mod db;
pub mod password;
pub mod repository;

pub use db::{connect_with_retry, create_pg_pool, MIGRATOR};
pub use password::BcryptPasswordHasher;
pub use repository::{
    PgMessageRepository, PgRefreshTokenRepository, PgRoomRepository, PgStorage, PgUserRepository,
};
