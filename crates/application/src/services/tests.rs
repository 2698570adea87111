//! 业务服务单元测试
//!
//! 用内存仓储替代 Postgres，验证注册、登录、刷新旋转与历史分页的业务规则。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use domain::{Message, RefreshToken, RepositoryError, RepositoryResult, Room, User};

use crate::error::ApplicationError;
use crate::hub::{Hub, Member};
use crate::password::{PasswordHashError, PasswordHasher};
use crate::services::{MessageService, RoomService, UserService};
use crate::store::{MessageStore, RefreshTokenStore, RoomStore, UserStore};
use crate::token::TokenService;

#[derive(Default)]
struct MemoryStore {
    users: Mutex<Vec<User>>,
    rooms: Mutex<Vec<Room>>,
    messages: Mutex<Vec<Message>>,
    refresh_tokens: Mutex<Vec<RefreshToken>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, username: &str, password_hash: &str) -> RepositoryResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(RepositoryError::Conflict);
        }
        let now = Utc::now();
        let user = User {
            id: self.next_id(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_usernames(&self, ids: &[i64]) -> RepositoryResult<HashMap<i64, String>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| (u.id, u.username.clone()))
            .collect())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create(&self, name: &str, owner_id: i64) -> RepositoryResult<Room> {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.iter().any(|r| r.name == name) {
            return Err(RepositoryError::Conflict);
        }
        let room = Room {
            id: self.next_id(),
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        rooms.push(room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Room>> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<Room>> {
        let mut rooms = self.rooms.lock().unwrap().clone();
        rooms.sort_by(|a, b| b.id.cmp(&a.id));
        rooms.truncate(limit as usize);
        Ok(rooms)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, room_id: i64, user_id: i64, content: &str) -> RepositoryResult<Message> {
        let message = Message {
            id: self.next_id(),
            room_id,
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn list_by_room(
        &self,
        room_id: i64,
        limit: i64,
        before_id: i64,
    ) -> RepositoryResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.room_id == room_id && (before_id <= 0 || m.id < before_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(limit as usize);
        Ok(messages)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let record = RefreshToken {
            id: self.next_id(),
            user_id,
            token: token.to_string(),
            expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.refresh_tokens.lock().unwrap().push(record);
        Ok(())
    }

    async fn find_valid(&self, token: &str) -> RepositoryResult<Option<RefreshToken>> {
        let now = Utc::now();
        Ok(self
            .refresh_tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.token == token && t.is_valid(now))
            .cloned())
    }

    async fn revoke(&self, token: &str) -> RepositoryResult<()> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        for record in tokens.iter_mut().filter(|t| t.token == token) {
            record.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        let now = Utc::now();
        let user_id = {
            let Some(record) = tokens
                .iter_mut()
                .find(|t| t.token == old_token && t.is_valid(now))
            else {
                return Err(RepositoryError::NotFound);
            };
            record.revoked_at = Some(now);
            record.user_id
        };
        let id = self.next_id();
        tokens.push(RefreshToken {
            id,
            user_id,
            token: new_token.to_string(),
            expires_at,
            revoked_at: None,
            created_at: now,
        });
        Ok(user_id)
    }
}

struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHashError> {
        Ok(format!("hashed:{plaintext}"))
    }

    async fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordHashError> {
        Ok(hashed == format!("hashed:{plaintext}"))
    }
}

fn token_service() -> Arc<TokenService> {
    Arc::new(TokenService::new("test-secret", 15, 7))
}

fn user_service(store: &Arc<MemoryStore>) -> UserService {
    UserService::new(
        Arc::clone(store) as Arc<dyn UserStore>,
        Arc::clone(store) as Arc<dyn RefreshTokenStore>,
        Arc::new(PlainHasher),
        token_service(),
    )
}

#[tokio::test]
async fn register_rejects_duplicate_username() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);

    users.register("alice", "pass1234").await.unwrap();
    let err = users.register("alice", "pass1234").await.unwrap_err();
    assert!(matches!(err, ApplicationError::UsernameTaken));
}

#[tokio::test]
async fn login_issues_tokens_and_persists_refresh() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);
    let tokens = token_service();

    let registered = users.register("alice", "pass1234").await.unwrap();
    let login = users.login("alice", "pass1234").await.unwrap();

    assert_eq!(login.user.id, registered.id);
    assert_eq!(login.refresh_token.len(), 64);
    let claims = tokens.verify_access(&login.access_token).unwrap();
    assert_eq!(claims.uid, registered.id);

    let saved = store.find_valid(&login.refresh_token).await.unwrap();
    assert_eq!(saved.unwrap().user_id, registered.id);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);

    users.register("alice", "pass1234").await.unwrap();

    let err = users.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidCredentials));

    let err = users.login("nobody", "pass1234").await.unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidCredentials));
}

#[tokio::test]
async fn refresh_rotation_is_single_use() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);

    users.register("alice", "pass1234").await.unwrap();
    let login = users.login("alice", "pass1234").await.unwrap();
    let rt0 = login.refresh_token;

    let pair1 = users.refresh(&rt0).await.unwrap();
    assert_ne!(pair1.refresh_token, rt0);

    // 旧令牌已被撤销
    let err = users.refresh(&rt0).await.unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidRefreshToken));

    // 新令牌可以继续旋转
    let pair2 = users.refresh(&pair1.refresh_token).await.unwrap();
    assert_ne!(pair2.refresh_token, pair1.refresh_token);
}

#[tokio::test]
async fn get_unknown_user_fails() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);

    let err = users.get(42).await.unwrap_err();
    assert!(matches!(err, ApplicationError::UserNotFound));
}

#[tokio::test]
async fn history_is_ascending_with_usernames() {
    let store = Arc::new(MemoryStore::default());
    let users = user_service(&store);
    let messages = MessageService::new(
        Arc::clone(&store) as Arc<dyn MessageStore>,
        Arc::clone(&store) as Arc<dyn UserStore>,
    );

    let alice = users.register("alice", "pass1234").await.unwrap();
    let room = RoomStore::create(store.as_ref(), "general", alice.id)
        .await
        .unwrap();

    let mut ids = Vec::new();
    for i in 1..=3 {
        let message = messages
            .store(room.id, alice.id, &format!("msg {i}"))
            .await
            .unwrap();
        ids.push(message.id);
    }

    let history = messages.history(room.id, 10, 0).await.unwrap();
    assert_eq!(history.len(), 3);
    for (event, expected_id) in history.iter().zip(&ids) {
        match event {
            domain::ChatEvent::Message {
                id,
                username,
                room_id,
                ..
            } => {
                assert_eq!(id, expected_id);
                assert_eq!(username, "alice");
                assert_eq!(*room_id, room.id);
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    // before_id 只返回更早的消息
    let earlier = messages.history(room.id, 10, ids[1]).await.unwrap();
    assert_eq!(earlier.len(), 1);

    // limit 截断最新的一段
    let latest = messages.history(room.id, 2, 0).await.unwrap();
    assert_eq!(latest.len(), 2);
    match &latest[0] {
        domain::ChatEvent::Message { id, .. } => assert_eq!(*id, ids[1]),
        other => panic!("expected message event, got {other:?}"),
    }
}

#[tokio::test]
async fn room_list_reports_online_counts() {
    let store = Arc::new(MemoryStore::default());
    let hub = Arc::new(Hub::new());
    let rooms = RoomService::new(Arc::clone(&store) as Arc<dyn RoomStore>, Arc::clone(&hub));

    let room = rooms.create("general", 1).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    hub.room(room.id)
        .register(Member {
            session_id: 1,
            user_id: 1,
            username: "alice".to_string(),
            sender: tx,
        })
        .await;
    // 等 join 事件送达，确认中枢已经处理注册
    rx.recv().await.unwrap();

    let listed = rooms.list(100).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].online, 1);
    assert_eq!(listed[0].name, "general");
}
