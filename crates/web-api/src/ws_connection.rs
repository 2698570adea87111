//! 单条 WebSocket 连接的读写循环
//!
//! 读循环在当前帧上套 60 秒空闲超时并按 `type` 分发入站帧；
//! 写循环独占 socket 写端，消费发送队列并维持 30 秒心跳。
//! 任一循环退出即向房间中枢注销，发送队列由中枢负责关闭。

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};

use application::hub::{next_session_id, Member, RoomHub};
use application::SEND_QUEUE_CAPACITY;
use domain::{ChatEvent, MAX_MESSAGE_CHARS};

use crate::state::AppState;

const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const OVERSIZE_ERROR: &str = "消息长度不能超过2000字符";
const PERSIST_ERROR: &str = "消息发送失败";

/// 客户端入站帧；缺失字段取零值，未知 `type` 走遗留消息路径
#[derive(Debug, Default, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    is_typing: bool,
}

pub(crate) struct SessionContext {
    pub state: AppState,
    pub room: Arc<RoomHub>,
    pub room_id: i64,
    pub user_id: i64,
    pub username: String,
}

pub(crate) async fn run(socket: WebSocket, ctx: SessionContext) {
    let (sink, stream) = socket.split();

    // 中枢持有队列唯一的强 sender；会话自身只保留弱引用，
    // 摘除或注销后弱引用升级失败，自发送自然失效
    let (queue_tx, queue_rx) = mpsc::channel::<Arc<str>>(SEND_QUEUE_CAPACITY);
    let own_queue = queue_tx.downgrade();
    let session_id = next_session_id();

    tracing::debug!(
        room_id = ctx.room_id,
        user_id = ctx.user_id,
        session_id,
        "websocket session starting"
    );

    let room = Arc::clone(&ctx.room);
    room.register(Member {
        session_id,
        user_id: ctx.user_id,
        username: ctx.username.clone(),
        sender: queue_tx,
    })
    .await;

    let mut write_task = tokio::spawn(write_pump(sink, queue_rx));
    let mut read_task = tokio::spawn(read_pump(stream, ctx, own_queue));

    let write_done = tokio::select! {
        _ = &mut write_task => true,
        _ = &mut read_task => false,
    };

    room.unregister(session_id).await;
    read_task.abort();
    if !write_done {
        // 注销让中枢丢弃队列 sender，给写循环一个发送关闭帧的机会
        let _ = timeout(Duration::from_secs(1), &mut write_task).await;
        write_task.abort();
    }

    tracing::debug!(session_id, "websocket session closed");
}

async fn write_pump(mut sink: SplitSink<WebSocket, WsMessage>, mut queue: mpsc::Receiver<Arc<str>>) {
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            payload = queue.recv() => match payload {
                Some(payload) => {
                    if write_frame(&mut sink, WsMessage::Text(payload.to_string().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                None => {
                    // 队列被中枢关闭：通知客户端后退出
                    let _ = write_frame(&mut sink, WsMessage::Close(None)).await;
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if write_frame(&mut sink, WsMessage::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: WsMessage,
) -> Result<(), ()> {
    match timeout(WRITE_TIMEOUT, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    ctx: SessionContext,
    own_queue: mpsc::WeakSender<Arc<str>>,
) {
    loop {
        let frame = match timeout(READ_IDLE_TIMEOUT, stream.next()).await {
            Err(_) => {
                tracing::debug!(
                    room_id = ctx.room_id,
                    user_id = ctx.user_id,
                    "websocket idle timeout"
                );
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                tracing::debug!(error = %err, room_id = ctx.room_id, "websocket read");
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => dispatch(&ctx, &own_queue, text.as_str()).await,
            WsMessage::Close(_) => return,
            // Ping 由协议层自动回应；Pong 到达本身即刷新空闲窗口
            _ => {}
        }
    }
}

async fn dispatch(ctx: &SessionContext, own_queue: &mpsc::WeakSender<Arc<str>>, raw: &str) {
    // 无法解析的帧静默跳过
    let Ok(frame) = serde_json::from_str::<InboundFrame>(raw) else {
        return;
    };

    match frame.kind.as_str() {
        "ping" => send_to_self(own_queue, &ChatEvent::Pong),
        "typing" => {
            let event = ChatEvent::Typing {
                room_id: ctx.room_id,
                user_id: ctx.user_id,
                username: ctx.username.clone(),
                is_typing: frame.is_typing,
            };
            if let Ok(payload) = serde_json::to_string(&event) {
                ctx.room.broadcast(Arc::from(payload)).await;
            }
        }
        "message" => handle_message(ctx, own_queue, &frame.content).await,
        // 向后兼容：无 type 时当作 message 处理
        _ => {
            if !frame.content.is_empty() {
                handle_message(ctx, own_queue, &frame.content).await;
            }
        }
    }
}

async fn handle_message(
    ctx: &SessionContext,
    own_queue: &mpsc::WeakSender<Arc<str>>,
    content: &str,
) {
    if content.is_empty() {
        return;
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        send_to_self(
            own_queue,
            &ChatEvent::Error {
                content: OVERSIZE_ERROR.to_string(),
            },
        );
        return;
    }

    let message = match ctx.state.messages.store(ctx.room_id, ctx.user_id, content).await {
        Ok(message) => message,
        Err(err) => {
            tracing::error!(
                error = %err,
                room_id = ctx.room_id,
                user_id = ctx.user_id,
                "ws persist message"
            );
            send_to_self(
                own_queue,
                &ChatEvent::Error {
                    content: PERSIST_ERROR.to_string(),
                },
            );
            return;
        }
    };

    let event = ChatEvent::Message {
        id: message.id,
        room_id: message.room_id,
        user_id: message.user_id,
        username: ctx.username.clone(),
        content: message.content,
        created_at: message.created_at,
    };
    if let Ok(payload) = serde_json::to_string(&event) {
        metrics::counter!("chat_ws_messages_total").increment(1);
        ctx.room.broadcast(Arc::from(payload)).await;
    }
}

/// 仅发给本会话的帧（pong、错误提示）：非阻塞投递，队列满即丢弃。
fn send_to_self(own_queue: &mpsc::WeakSender<Arc<str>>, event: &ChatEvent) {
    let Some(sender) = own_queue.upgrade() else {
        return;
    };
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = sender.try_send(Arc::from(payload));
    }
}
