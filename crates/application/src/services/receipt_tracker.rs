use std::sync::Arc;

use domain::{ConnectionId, MessageFilter, Username};
use tracing::{debug, error};

use crate::{
    broadcaster::{fan_out, EventDispatcher},
    dto::ServerEvent,
    error::ApplicationError,
    presence::PresenceRegistry,
    repository::MessageStore,
};

/// 私聊已读回执
pub struct ReceiptTracker {
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl ReceiptTracker {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        store: Arc<dyn MessageStore>,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Self {
        Self {
            presence,
            store,
            dispatcher,
        }
    }

    /// 将 `peer` 发给当前用户的未读消息全部标为已读，返回本次标记的条数。
    /// 只有确实标记了消息时才通知 `peer`。
    pub async fn mark_seen(
        &self,
        connection: ConnectionId,
        peer: Username,
    ) -> Result<u64, ApplicationError> {
        let Some(reader) = self.presence.username_of(connection).await else {
            debug!(%connection, "未认证连接标记已读，丢弃");
            return Ok(0);
        };

        let updated = self
            .store
            .mark_seen(MessageFilter::unseen_from(peer.clone(), reader.clone()))
            .await
            .inspect_err(|err| error!(%connection, error = %err, "标记已读失败"))?;

        if updated == 0 {
            debug!(%reader, %peer, "没有需要标记的消息");
            return Ok(0);
        }

        let targets = self.presence.resolve(&peer).await;
        fan_out(
            self.dispatcher.as_ref(),
            targets,
            &ServerEvent::SeenConfirmed { by: reader },
        );
        Ok(updated)
    }
}
