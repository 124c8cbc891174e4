//! 事件投递抽象
//!
//! 应用层只知道"把事件交给某个连接"，具体的传输（WebSocket 等）由基础设施层实现。
//! 投递是同步且非阻塞的：实现方应当只把事件放入连接自己的有序队列。

use domain::ConnectionId;
use thiserror::Error;
use tracing::warn;

use crate::dto::ServerEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

pub trait EventDispatcher: Send + Sync {
    /// 向单个连接投递事件。同一连接上的事件按调用顺序到达。
    fn send(&self, connection: ConnectionId, event: ServerEvent) -> Result<(), BroadcastError>;

    /// 向当前所有存活连接（包括尚未认证的）投递事件，返回成功投递的数量。
    fn broadcast(&self, event: ServerEvent) -> usize;
}

/// 向一组连接扇出同一事件。单个连接失败只记录日志，不影响其余连接。
pub fn fan_out<I>(dispatcher: &dyn EventDispatcher, targets: I, event: &ServerEvent) -> usize
where
    I: IntoIterator<Item = ConnectionId>,
{
    let mut delivered = 0;
    for connection in targets {
        match dispatcher.send(connection, event.clone()) {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(%connection, error = %err, "投递事件失败，跳过该连接");
            }
        }
    }
    delivered
}
