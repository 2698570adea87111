//! 房间广播中枢
//!
//! 每个活跃房间由一个专属 tokio 任务管理：成员表是该任务的私有状态，
//! 注册、注销与广播事件在同一个 `select!` 循环里逐一处理，
//! 因此同一房间内的消息与在线事件对所有成员呈现同一顺序，无需任何锁。
//!
//! 广播循环绝不等待慢消费者：向成员发送队列的投递是非阻塞的，
//! 队列满即判定成员失活，当场摘除并关闭其队列。房间的活性优先于
//! 单个客户端消息流的完整性。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, oneshot};

use domain::ChatEvent;

/// 每个会话发送队列的容量；打满即触发摘除
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// 广播通道容量；中枢积压超过该值时，生产端的 socket 任务会被反压阻塞
const BROADCAST_CAPACITY: usize = 256;

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 分配进程内唯一的会话 id。
pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// 房间成员：中枢持有其发送队列唯一的强引用，
/// 摘除成员即丢弃 sender，写循环随之观察到队列关闭。
pub struct Member {
    pub session_id: SessionId,
    pub user_id: i64,
    pub username: String,
    pub sender: mpsc::Sender<Arc<str>>,
}

/// 单个房间的广播中枢句柄
pub struct RoomHub {
    room_id: i64,
    register_tx: mpsc::Sender<Member>,
    unregister_tx: mpsc::Sender<SessionId>,
    broadcast_tx: mpsc::Sender<Arc<str>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    online: AtomicI32,
}

impl RoomHub {
    fn spawn(room_id: i64) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(1);
        let (unregister_tx, unregister_rx) = mpsc::channel(1);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();

        let hub = Arc::new(Self {
            room_id,
            register_tx,
            unregister_tx,
            broadcast_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
            online: AtomicI32::new(0),
        });

        tokio::spawn(run(
            Arc::clone(&hub),
            register_rx,
            unregister_rx,
            broadcast_rx,
            stop_rx,
        ));

        hub
    }

    pub fn room_id(&self) -> i64 {
        self.room_id
    }

    /// 将成员加入房间。阻塞直到中枢接收，由此保证中枢先于任何
    /// 后续广播观察到该成员。
    pub async fn register(&self, member: Member) {
        let _ = self.register_tx.send(member).await;
    }

    pub async fn unregister(&self, session_id: SessionId) {
        let _ = self.unregister_tx.send(session_id).await;
    }

    /// 投递一条已序列化的出站帧。通道积压超过容量时阻塞调用方。
    pub async fn broadcast(&self, payload: Arc<str>) {
        let _ = self.broadcast_tx.send(payload).await;
    }

    /// 停止中枢任务，幂等。
    pub fn stop(&self) {
        let mut slot = self.stop_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = slot.take() {
            let _ = tx.send(());
        }
    }

    /// 当前在线人数，仅中枢任务写入，任何任务可读。
    pub fn online(&self) -> i32 {
        self.online.load(Ordering::Relaxed)
    }
}

async fn run(
    hub: Arc<RoomHub>,
    mut register_rx: mpsc::Receiver<Member>,
    mut unregister_rx: mpsc::Receiver<SessionId>,
    mut broadcast_rx: mpsc::Receiver<Arc<str>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut members: HashMap<SessionId, Member> = HashMap::new();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                for _ in members.drain() {
                    metrics::gauge!("chat_ws_connections").decrement(1.0);
                }
                hub.online.store(0, Ordering::Relaxed);
                tracing::debug!(room_id = hub.room_id, "room hub stopped");
                return;
            }
            Some(member) = register_rx.recv() => {
                let (user_id, username) = (member.user_id, member.username.clone());
                members.insert(member.session_id, member);
                let online = members.len() as i32;
                hub.online.store(online, Ordering::Relaxed);
                metrics::gauge!("chat_ws_connections").increment(1.0);

                let event = ChatEvent::Join {
                    room_id: hub.room_id,
                    user_id,
                    username,
                    online,
                };
                if let Ok(payload) = serde_json::to_string(&event) {
                    fan_out(&hub, &mut members, Arc::from(payload));
                }
            }
            Some(session_id) = unregister_rx.recv() => {
                if let Some(member) = members.remove(&session_id) {
                    let online = members.len() as i32;
                    hub.online.store(online, Ordering::Relaxed);
                    metrics::gauge!("chat_ws_connections").decrement(1.0);

                    let event = ChatEvent::Leave {
                        room_id: hub.room_id,
                        user_id: member.user_id,
                        username: member.username,
                        online,
                    };
                    if let Ok(payload) = serde_json::to_string(&event) {
                        fan_out(&hub, &mut members, Arc::from(payload));
                    }
                }
            }
            Some(payload) = broadcast_rx.recv() => {
                fan_out(&hub, &mut members, payload);
            }
        }
    }
}

/// 向每个成员的发送队列做一次非阻塞投递，失败的成员被当场摘除。
fn fan_out(hub: &RoomHub, members: &mut HashMap<SessionId, Member>, payload: Arc<str>) {
    let mut evicted = Vec::new();
    for (session_id, member) in members.iter() {
        if member.sender.try_send(Arc::clone(&payload)).is_err() {
            evicted.push(*session_id);
        }
    }

    if evicted.is_empty() {
        return;
    }
    for session_id in evicted {
        members.remove(&session_id);
        metrics::gauge!("chat_ws_connections").decrement(1.0);
        tracing::debug!(
            room_id = hub.room_id,
            session_id,
            "slow consumer evicted from room"
        );
    }
    hub.online.store(members.len() as i32, Ordering::Relaxed);
}

/// 房间注册表：按需懒创建 RoomHub，进程退出时统一停止。
pub struct Hub {
    rooms: RwLock<HashMap<i64, Arc<RoomHub>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// 返回房间的广播中枢，不存在则创建并启动其任务。
    pub fn room(&self, room_id: i64) -> Arc<RoomHub> {
        {
            let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
            if let Some(room) = rooms.get(&room_id) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        if let Some(room) = rooms.get(&room_id) {
            return Arc::clone(room);
        }
        let room = RoomHub::spawn(room_id);
        rooms.insert(room_id, Arc::clone(&room));
        room
    }

    /// 房间在线人数；房间不存在返回 0，且不会阻塞在中枢任务之后。
    pub fn online(&self, room_id: i64) -> i32 {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.get(&room_id).map(|room| room.online()).unwrap_or(0)
    }

    /// 停止并移除所有房间中枢，用于优雅停服。
    pub fn shutdown(&self) {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        for (_, room) in rooms.drain() {
            room.stop();
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv_event(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
        let payload = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for event")
            .expect("send queue closed");
        serde_json::from_str(payload.as_ref()).expect("event payload is json")
    }

    fn member(
        session_id: SessionId,
        user_id: i64,
        username: &str,
        capacity: usize,
    ) -> (Member, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Member {
                session_id,
                user_id,
                username: username.to_string(),
                sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn join_and_leave_update_online_counts() {
        let registry = Hub::new();
        let room = registry.room(1);

        let (m1, mut rx1) = member(1, 1, "u1", 16);
        room.register(m1).await;
        let e1 = recv_event(&mut rx1).await;
        assert_eq!(e1["type"], "join");
        assert_eq!(e1["online"], 1);

        let (m2, mut rx2) = member(2, 2, "u2", 16);
        room.register(m2).await;
        let e2a = recv_event(&mut rx1).await;
        let e2b = recv_event(&mut rx2).await;
        assert_eq!(e2a["type"], "join");
        assert_eq!(e2b["type"], "join");
        assert_eq!(e2a["online"], 2);
        assert_eq!(e2b["online"], 2);
        assert_eq!(e2a["user_id"], 2);
        assert_eq!(e2a["username"], "u2");

        room.unregister(1).await;
        let e3 = recv_event(&mut rx2).await;
        assert_eq!(e3["type"], "leave");
        assert_eq!(e3["online"], 1);
        assert_eq!(e3["user_id"], 1);
        assert_eq!(e3["username"], "u1");

        // 被注销成员的队列被中枢关闭
        assert!(timeout(Duration::from_secs(2), rx1.recv())
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.online(1), 1);
    }

    #[tokio::test]
    async fn broadcasts_preserve_order_for_all_members() {
        let registry = Hub::new();
        let room = registry.room(7);

        let (m1, mut rx1) = member(11, 1, "a", 16);
        let (m2, mut rx2) = member(12, 2, "b", 16);
        room.register(m1).await;
        room.register(m2).await;
        recv_event(&mut rx1).await;
        recv_event(&mut rx1).await;
        recv_event(&mut rx2).await;

        for i in 0..5 {
            room.broadcast(Arc::from(format!(r#"{{"seq":{i}}}"#))).await;
        }

        for i in 0..5 {
            assert_eq!(recv_event(&mut rx1).await["seq"], i);
            assert_eq!(recv_event(&mut rx2).await["seq"], i);
        }
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let registry = Hub::new();
        let room = registry.room(3);

        // 容量 1 的队列：自己的 join 事件即打满
        let (slow, mut slow_rx) = member(21, 1, "slow", 1);
        room.register(slow).await;

        let (fast, mut fast_rx) = member(22, 2, "fast", 16);
        room.register(fast).await;

        // fast 的 join 无法投递给 slow，slow 被摘除
        recv_event(&mut fast_rx).await;
        room.broadcast(Arc::from(r#"{"seq":1}"#)).await;
        assert_eq!(recv_event(&mut fast_rx).await["seq"], 1);
        assert_eq!(registry.online(3), 1);

        // slow 只看到自己的 join，然后队列被关闭
        let first = recv_event(&mut slow_rx).await;
        assert_eq!(first["type"], "join");
        assert!(timeout(Duration::from_secs(2), slow_rx.recv())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stop_closes_every_member_queue() {
        let registry = Hub::new();
        let room = registry.room(5);

        let (m1, mut rx1) = member(31, 1, "a", 16);
        room.register(m1).await;
        recv_event(&mut rx1).await;

        room.stop();
        room.stop(); // 幂等

        assert!(timeout(Duration::from_secs(2), rx1.recv())
            .await
            .unwrap()
            .is_none());

        // 等中枢任务清零在线计数
        timeout(Duration::from_secs(2), async {
            while room.online() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("online count reset after stop");
    }

    #[tokio::test]
    async fn registry_reports_zero_for_unknown_room() {
        let registry = Hub::new();
        assert_eq!(registry.online(999), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_all_rooms() {
        let registry = Hub::new();
        let room = registry.room(8);
        let (m1, mut rx1) = member(41, 1, "a", 16);
        room.register(m1).await;
        recv_event(&mut rx1).await;

        registry.shutdown();

        assert!(timeout(Duration::from_secs(2), rx1.recv())
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.online(8), 0);
    }
}
