//! 进程内的连接事件投递
//!
//! 每个实时连接注册一个无界 mpsc 队列，由传输层的发送任务消费。
//! 投递只是入队，不会阻塞调用方；同一连接上的事件严格按入队顺序送达。

use std::collections::HashMap;

use application::{BroadcastError, EventDispatcher, ServerEvent};
use domain::ConnectionId;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
pub struct LocalConnectionHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl LocalConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接，返回该连接的出站事件接收端
    pub fn register(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.write().insert(connection, sender);
        debug!(%connection, "连接已加入投递表");
        receiver
    }

    pub fn remove(&self, connection: ConnectionId) {
        if self.connections.write().remove(&connection).is_some() {
            debug!(%connection, "连接已移出投递表");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

impl EventDispatcher for LocalConnectionHub {
    fn send(&self, connection: ConnectionId, event: ServerEvent) -> Result<(), BroadcastError> {
        let connections = self.connections.read();
        let sender = connections
            .get(&connection)
            .ok_or(BroadcastError::ConnectionClosed(connection))?;
        sender
            .send(event)
            .map_err(|_| BroadcastError::ConnectionClosed(connection))
    }

    fn broadcast(&self, event: ServerEvent) -> usize {
        let connections = self.connections.read();
        connections
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }
}
