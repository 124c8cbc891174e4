//! 消息路由
//!
//! 负责认证后的广播历史推送、公共消息与私聊消息的持久化和扇出、私聊历史查询。
//!
//! 认证与发送共用一道闸门：认证在闸门内"读取历史快照 + 注册 + 入队"，发送在闸门内
//! "持久化 + 扇出"。由于每个连接的出站队列是 FIFO，某条消息要么落在历史快照里，
//! 要么通过实时扇出送达，不会重复也不会遗漏。断开连接同样在闸门内注销并广播在线列表，
//! 客户端最后看到的在线列表总是与注册表一致。

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{ConnectionId, Message, MessageFilter, NewMessage, Username};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::{
    broadcaster::{fan_out, EventDispatcher},
    clock::Clock,
    dto::{MessageDto, OutgoingContent, ServerEvent},
    error::ApplicationError,
    presence::PresenceRegistry,
    repository::MessageStore,
};

pub struct MessageRouter {
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    clock: Arc<dyn Clock>,
    delivery_gate: Mutex<()>,
}

impl MessageRouter {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        store: Arc<dyn MessageStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presence,
            store,
            dispatcher,
            clock,
            delivery_gate: Mutex::new(()),
        }
    }

    /// 绑定身份，广播在线列表，并把完整的公共历史推送给该连接。
    pub async fn authenticate(
        &self,
        connection: ConnectionId,
        username: Username,
    ) -> Result<(), ApplicationError> {
        let _gate = self.lock_delivery().await;

        // 先取快照再注册：读取失败时连接保持未认证状态
        let backlog = self
            .store
            .find(MessageFilter::Broadcast)
            .await
            .inspect_err(|err| error!(%connection, error = %err, "读取公共历史失败"))?;

        if let Some(previous) = self.presence.register(connection, username.clone()).await {
            debug!(%connection, %previous, "连接重新认证，覆盖旧身份");
        }
        info!(%connection, %username, "连接已认证");

        self.broadcast_presence().await;
        self.dispatcher.send(
            connection,
            ServerEvent::CommonHistory {
                messages: backlog.iter().map(MessageDto::from).collect(),
            },
        )?;
        Ok(())
    }

    /// 获取投递闸门。在线表的每次变更及随后的在线列表广播都必须在闸门内完成，
    /// 否则较旧的列表可能晚于较新的列表到达客户端。
    pub(crate) async fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery_gate.lock().await
    }

    /// 把当前在线列表推送给所有连接，调用方须持有投递闸门
    pub(crate) async fn broadcast_presence(&self) {
        let users = self.presence.online_usernames().await;
        let delivered = self
            .dispatcher
            .broadcast(ServerEvent::PresenceChanged { users });
        debug!(delivered, "在线列表已广播");
    }

    pub async fn send_common(
        &self,
        connection: ConnectionId,
        payload: OutgoingContent,
    ) -> Result<Option<Message>, ApplicationError> {
        let Some(sender) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接发送公共消息，丢弃");
            return Ok(None);
        };

        let _gate = self.delivery_gate.lock().await;
        let draft = NewMessage::broadcast(sender, payload.kind, payload.content, self.clock.now());
        let message = self
            .store
            .insert(draft)
            .await
            .inspect_err(|err| error!(%connection, error = %err, "公共消息持久化失败"))?;

        let targets = self.presence.connections().await;
        let event = ServerEvent::CommonMessage {
            message: MessageDto::from(&message),
        };
        let delivered = fan_out(self.dispatcher.as_ref(), targets, &event);
        debug!(message_id = %message.id, delivered, "公共消息已扇出");
        Ok(Some(message))
    }

    /// 持久化私聊消息并投递给双方的所有在线连接。接收方离线时消息仍会保存。
    pub async fn send_private(
        &self,
        connection: ConnectionId,
        to: Username,
        payload: OutgoingContent,
    ) -> Result<Option<Message>, ApplicationError> {
        let Some(sender) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接发送私聊消息，丢弃");
            return Ok(None);
        };

        let _gate = self.delivery_gate.lock().await;
        let draft = NewMessage::direct(
            sender.clone(),
            to.clone(),
            payload.kind,
            payload.content,
            self.clock.now(),
        );
        let message = self
            .store
            .insert(draft)
            .await
            .inspect_err(|err| error!(%connection, error = %err, "私聊消息持久化失败"))?;

        let recipients = self.presence.resolve(&to).await;
        if recipients.is_empty() {
            debug!(recipient = %to, message_id = %message.id, "接收方离线，消息仅持久化");
        }
        let mut targets: BTreeSet<ConnectionId> = recipients;
        targets.extend(self.presence.resolve(&sender).await);

        let event = ServerEvent::PrivateMessage {
            message: MessageDto::from(&message),
        };
        fan_out(self.dispatcher.as_ref(), targets, &event);
        Ok(Some(message))
    }

    /// 把与 `peer` 的完整私聊记录推送给请求的连接
    pub async fn load_history(
        &self,
        connection: ConnectionId,
        peer: Username,
    ) -> Result<Option<Vec<Message>>, ApplicationError> {
        let Some(reader) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接请求私聊历史，丢弃");
            return Ok(None);
        };

        let messages = self
            .store
            .find(MessageFilter::conversation(reader, peer.clone()))
            .await
            .inspect_err(|err| error!(%connection, error = %err, "读取私聊历史失败"))?;

        self.dispatcher.send(
            connection,
            ServerEvent::PrivateHistory {
                peer,
                messages: messages.iter().map(MessageDto::from).collect(),
            },
        )?;
        Ok(Some(messages))
    }
}
