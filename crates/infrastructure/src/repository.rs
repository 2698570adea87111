//! Postgres 仓储实现

use std::collections::HashMap;
use std::sync::Arc;

use application::{MessageStore, RefreshTokenStore, RoomStore, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Message, RefreshToken, RepositoryError, RepositoryResult, Room, User};
use sqlx::{FromRow, PgPool};

pub fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(ref db_err) if db_err.code().is_some_and(|code| code == "23505") => {
            RepositoryError::Conflict
        }
        other => RepositoryError::storage(other.to_string()),
    }
}

/// 全部仓储的聚合，共享同一个连接池。
#[derive(Clone)]
pub struct PgStorage {
    pub users: Arc<PgUserRepository>,
    pub rooms: Arc<PgRoomRepository>,
    pub messages: Arc<PgMessageRepository>,
    pub refresh_tokens: Arc<PgRefreshTokenRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            rooms: Arc::new(PgRoomRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepository::new(pool)),
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        Self {
            id: value.id,
            username: value.username,
            password_hash: value.password_hash,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create(&self, username: &str, password_hash: &str) -> RepositoryResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, password_hash, created_at, updated_at FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Into::into))
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, password_hash, created_at, updated_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Into::into))
    }

    async fn find_usernames(&self, ids: &[i64]) -> RepositoryResult<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"SELECT id, username FROM users WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().collect())
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    name: String,
    owner_id: i64,
    created_at: DateTime<Utc>,
}

impl From<RoomRecord> for Room {
    fn from(value: RoomRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            owner_id: value.owner_id,
            created_at: value.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomStore for PgRoomRepository {
    async fn create(&self, name: &str, owner_id: i64) -> RepositoryResult<Room> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (name, owner_id)
            VALUES ($1, $2)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Room>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, owner_id, created_at FROM rooms WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Into::into))
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<Room>> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, owner_id, created_at FROM rooms ORDER BY id DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: i64,
    user_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(value: MessageRecord) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            content: value.content,
            created_at: value.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageRepository {
    async fn create(&self, room_id: i64, user_id: i64, content: &str) -> RepositoryResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (room_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, room_id, user_id, content, created_at
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn list_by_room(
        &self,
        room_id: i64,
        limit: i64,
        before_id: i64,
    ) -> RepositoryResult<Vec<Message>> {
        let records = if before_id > 0 {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                SELECT id, room_id, user_id, content, created_at
                FROM messages
                WHERE room_id = $1 AND id < $2
                ORDER BY id DESC
                LIMIT $3
                "#,
            )
            .bind(room_id)
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                SELECT id, room_id, user_id, content, created_at
                FROM messages
                WHERE room_id = $1
                ORDER BY id DESC
                LIMIT $2
                "#,
            )
            .bind(room_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, FromRow)]
struct RefreshTokenRecord {
    id: i64,
    user_id: i64,
    token: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRecord> for RefreshToken {
    fn from(value: RefreshTokenRecord) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            token: value.token,
            expires_at: value.expires_at,
            revoked_at: value.revoked_at,
            created_at: value.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenRepository {
    pool: PgPool,
}

impl PgRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenRepository {
    async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        sqlx::query(r#"INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)"#)
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn find_valid(&self, token: &str) -> RepositoryResult<Option<RefreshToken>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, token, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token = $1 AND revoked_at IS NULL AND expires_at > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Into::into))
    }

    async fn revoke(&self, token: &str) -> RepositoryResult<()> {
        sqlx::query(r#"UPDATE refresh_tokens SET revoked_at = now() WHERE token = $1"#)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 行锁串行化同一令牌的并发旋转：后到者看到 revoked_at 已置位，拿不到行
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, token, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token = $1 AND revoked_at IS NULL AND expires_at > now()
            FOR UPDATE
            "#,
        )
        .bind(old_token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(r#"UPDATE refresh_tokens SET revoked_at = now() WHERE token = $1"#)
            .bind(old_token)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)"#,
        )
        .bind(record.user_id)
        .bind(new_token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(record.user_id)
    }
}
