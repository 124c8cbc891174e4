use std::sync::Arc;
use std::time::Duration;

use domain::{ConnectionId, Message, Username};
use serde_json::Value;
use tracing::info;

use crate::{
    broadcaster::EventDispatcher,
    clock::Clock,
    dto::OutgoingContent,
    error::ApplicationError,
    presence::PresenceRegistry,
    repository::MessageStore,
    services::{CallRelay, MessageRouter, ReceiptTracker},
};

pub struct ChatServiceDependencies {
    pub presence: Arc<PresenceRegistry>,
    pub message_store: Arc<dyn MessageStore>,
    pub dispatcher: Arc<dyn EventDispatcher>,
    pub clock: Arc<dyn Clock>,
    /// 振铃超时，`None` 表示永不超时
    pub ring_timeout: Option<Duration>,
}

/// 实时聊天核心的统一入口，传输层的每个入站事件对应这里的一个方法。
pub struct ChatService {
    presence: Arc<PresenceRegistry>,
    router: MessageRouter,
    receipts: ReceiptTracker,
    calls: CallRelay,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        let router = MessageRouter::new(
            Arc::clone(&deps.presence),
            Arc::clone(&deps.message_store),
            Arc::clone(&deps.dispatcher),
            Arc::clone(&deps.clock),
        );
        let receipts = ReceiptTracker::new(
            Arc::clone(&deps.presence),
            Arc::clone(&deps.message_store),
            Arc::clone(&deps.dispatcher),
        );
        let calls = CallRelay::new(
            Arc::clone(&deps.presence),
            Arc::clone(&deps.dispatcher),
            deps.ring_timeout,
        );
        Self {
            presence: deps.presence,
            router,
            receipts,
            calls,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn calls(&self) -> &CallRelay {
        &self.calls
    }

    pub async fn authenticate(
        &self,
        connection: ConnectionId,
        username: Username,
    ) -> Result<(), ApplicationError> {
        self.router.authenticate(connection, username).await
    }

    pub async fn send_common(
        &self,
        connection: ConnectionId,
        payload: OutgoingContent,
    ) -> Result<Option<Message>, ApplicationError> {
        self.router.send_common(connection, payload).await
    }

    pub async fn send_private(
        &self,
        connection: ConnectionId,
        to: Username,
        payload: OutgoingContent,
    ) -> Result<Option<Message>, ApplicationError> {
        self.router.send_private(connection, to, payload).await
    }

    pub async fn load_history(
        &self,
        connection: ConnectionId,
        peer: Username,
    ) -> Result<Option<Vec<Message>>, ApplicationError> {
        self.router.load_history(connection, peer).await
    }

    pub async fn mark_seen(
        &self,
        connection: ConnectionId,
        peer: Username,
    ) -> Result<u64, ApplicationError> {
        self.receipts.mark_seen(connection, peer).await
    }

    pub async fn call_user(&self, connection: ConnectionId, to: Username, offer: Value) {
        self.calls.call_user(connection, to, offer).await
    }

    pub async fn answer_call(&self, connection: ConnectionId, to: Username, answer: Value) {
        self.calls.answer_call(connection, to, answer).await
    }

    pub async fn ice_candidate(&self, connection: ConnectionId, to: Username, candidate: Value) {
        self.calls.ice_candidate(connection, to, candidate).await
    }

    pub async fn end_call(&self, connection: ConnectionId, to: Username) {
        self.calls.end_call(connection, to).await
    }

    /// 连接关闭：注销在线状态，结束相关通话，并在在线列表变化时广播。
    pub async fn disconnect(&self, connection: ConnectionId) {
        let _gate = self.router.lock_delivery().await;
        let removed = self.presence.unregister(connection).await;
        self.calls
            .connection_closed(connection, removed.as_ref())
            .await;

        if let Some(username) = removed {
            info!(%connection, %username, "连接已断开");
            self.router.broadcast_presence().await;
        }
    }
}
