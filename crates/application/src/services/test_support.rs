//! 服务测试共用的替身实现

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use domain::{timestamp_from_millis, ConnectionId, MessageContent, Timestamp, Username};
use parking_lot::Mutex;

use crate::{
    broadcaster::{BroadcastError, EventDispatcher},
    clock::Clock,
    dto::{OutgoingContent, ServerEvent},
    presence::PresenceRegistry,
    repository::{memory::MemoryMessageStore, MessageStore},
    services::{ChatService, ChatServiceDependencies},
};

/// 记录每条投递的调度器，模拟传输层的连接表
#[derive(Default)]
pub struct RecordingDispatcher {
    live: Mutex<HashSet<ConnectionId>>,
    sent: Mutex<Vec<(ConnectionId, ServerEvent)>>,
}

impl RecordingDispatcher {
    /// 打开一条新的传输连接（尚未认证）
    pub fn connect(&self) -> ConnectionId {
        let connection = ConnectionId::new();
        self.live.lock().insert(connection);
        connection
    }

    pub fn close(&self, connection: ConnectionId) {
        self.live.lock().remove(&connection);
    }

    pub fn events_for(&self, connection: ConnectionId) -> Vec<ServerEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|(target, _)| *target == connection)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// 某连接收到的指定名称的事件
    pub fn named(&self, connection: ConnectionId, name: &str) -> Vec<ServerEvent> {
        self.events_for(connection)
            .into_iter()
            .filter(|event| event.name() == name)
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl EventDispatcher for RecordingDispatcher {
    fn send(&self, connection: ConnectionId, event: ServerEvent) -> Result<(), BroadcastError> {
        if !self.live.lock().contains(&connection) {
            return Err(BroadcastError::ConnectionClosed(connection));
        }
        self.sent.lock().push((connection, event));
        Ok(())
    }

    fn broadcast(&self, event: ServerEvent) -> usize {
        let targets: Vec<ConnectionId> = self.live.lock().iter().copied().collect();
        let mut sent = self.sent.lock();
        for connection in &targets {
            sent.push((*connection, event.clone()));
        }
        targets.len()
    }
}

/// 每次调用前进 1 毫秒的时钟
pub struct SteppingClock {
    now: Mutex<Timestamp>,
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(timestamp_from_millis(1_700_000_000_000).unwrap()),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let mut now = self.now.lock();
        *now += time::Duration::milliseconds(1);
        *now
    }
}

pub struct Harness {
    pub service: Arc<ChatService>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub store: Arc<MemoryMessageStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ring_timeout(None)
    }

    pub fn with_ring_timeout(ring_timeout: Option<Duration>) -> Self {
        let store = Arc::new(MemoryMessageStore::new());
        Self::with_store(store.clone() as Arc<dyn MessageStore>, store, ring_timeout)
    }

    pub fn with_store(
        message_store: Arc<dyn MessageStore>,
        store: Arc<MemoryMessageStore>,
        ring_timeout: Option<Duration>,
    ) -> Self {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = ChatService::new(ChatServiceDependencies {
            presence: Arc::new(PresenceRegistry::new()),
            message_store,
            dispatcher: dispatcher.clone(),
            clock: Arc::new(SteppingClock::default()),
            ring_timeout,
        });
        Self {
            service: Arc::new(service),
            dispatcher,
            store,
        }
    }

    /// 打开连接并以 `name` 认证
    pub async fn login(&self, name: &str) -> ConnectionId {
        let connection = self.dispatcher.connect();
        self.service
            .authenticate(connection, user(name))
            .await
            .unwrap();
        connection
    }
}

pub fn user(name: &str) -> Username {
    Username::parse(name).unwrap()
}

pub fn text(body: &str) -> OutgoingContent {
    OutgoingContent::text(MessageContent::new(body).unwrap())
}
