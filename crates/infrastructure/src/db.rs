//! 数据库连接
//!
//! 连接池上限 20、保底 5、连接最长存活 1 小时；
//! 启动时的重试用于等待容器环境下的数据库就绪。

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const CONNECT_ATTEMPTS: u32 = 10;

pub async fn create_pg_pool(dsn: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .max_lifetime(Duration::from_secs(3600))
        .connect(dsn)
        .await
}

/// 带退避重试地建立连接池。
pub async fn connect_with_retry(dsn: &str) -> Result<PgPool, sqlx::Error> {
    let mut last_err = None;
    for attempt in 0..CONNECT_ATTEMPTS {
        match create_pg_pool(dsn).await {
            Ok(pool) => return Ok(pool),
            Err(err) => {
                tracing::warn!(error = %err, attempt, "database connect failed, retrying");
                last_err = Some(err);
            }
        }
        tokio::time::sleep(Duration::from_millis(500 + u64::from(attempt) * 200)).await;
    }
    Err(last_err.unwrap_or(sqlx::Error::PoolClosed))
}
