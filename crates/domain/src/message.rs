//! 消息实体定义
//!
//! 消息一经持久化即不可变，唯一例外是私聊消息的 `seen` 标记，
//! 且该标记只会从 false 变为 true。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, Timestamp, Username};

/// 消息负载类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// 纯文本
    #[default]
    Text,
    /// 图片（内容为不透明引用）
    Image,
    /// 音频（内容为不透明引用）
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "audio" => Ok(MessageKind::Audio),
            other => Err(DomainError::invalid_argument(
                "kind",
                format!("unknown message kind `{other}`"),
            )),
        }
    }
}

/// 消息目的地：公共广播房间，或发给某个用户的私聊
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Broadcast,
    Direct(Username),
}

/// 尚未持久化的消息草稿，由存储分配 id 并校正时间戳
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: Username,
    pub destination: Destination,
    pub kind: MessageKind,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn broadcast(
        sender: Username,
        kind: MessageKind,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            sender,
            destination: Destination::Broadcast,
            kind,
            content,
            created_at,
        }
    }

    pub fn direct(
        sender: Username,
        recipient: Username,
        kind: MessageKind,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            sender,
            destination: Destination::Direct(recipient),
            kind,
            content,
            created_at,
        }
    }
}

/// 已持久化的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Username,
    pub destination: Destination,
    pub kind: MessageKind,
    pub content: MessageContent,
    pub created_at: Timestamp,
    seen: bool,
}

impl Message {
    /// 由存储在插入时调用。私聊消息的 `seen` 初始为 false。
    pub fn persisted(id: MessageId, draft: NewMessage, created_at: Timestamp) -> Self {
        Self {
            id,
            sender: draft.sender,
            destination: draft.destination,
            kind: draft.kind,
            content: draft.content,
            created_at,
            seen: false,
        }
    }

    /// 从存储记录还原。广播消息会忽略 `seen`。
    pub fn restore(
        id: MessageId,
        sender: Username,
        destination: Destination,
        kind: MessageKind,
        content: MessageContent,
        created_at: Timestamp,
        seen: bool,
    ) -> Self {
        let seen = seen && matches!(destination, Destination::Direct(_));
        Self {
            id,
            sender,
            destination,
            kind,
            content,
            created_at,
            seen,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.destination, Destination::Direct(_))
    }

    pub fn recipient(&self) -> Option<&Username> {
        match &self.destination {
            Destination::Direct(to) => Some(to),
            Destination::Broadcast => None,
        }
    }

    /// 私聊消息返回已读状态，广播消息没有已读状态。
    pub fn seen(&self) -> Option<bool> {
        self.is_direct().then_some(self.seen)
    }

    /// 标记为已读，返回本次调用是否改变了状态。
    pub fn mark_seen(&mut self) -> bool {
        if !self.is_direct() || self.seen {
            return false;
        }
        self.seen = true;
        true
    }
}

/// 消息存储支持的查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// 所有广播消息
    Broadcast,
    /// 两个用户之间的私聊（双向）
    Conversation { a: Username, b: Username },
    /// `sender` 发给 `recipient` 且尚未读的私聊
    UnseenFrom {
        sender: Username,
        recipient: Username,
    },
}

impl MessageFilter {
    pub fn conversation(a: Username, b: Username) -> Self {
        Self::Conversation { a, b }
    }

    pub fn unseen_from(sender: Username, recipient: Username) -> Self {
        Self::UnseenFrom { sender, recipient }
    }

    pub fn matches(&self, message: &Message) -> bool {
        match (self, &message.destination) {
            (MessageFilter::Broadcast, Destination::Broadcast) => true,
            (MessageFilter::Conversation { a, b }, Destination::Direct(to)) => {
                (&message.sender == a && to == b) || (&message.sender == b && to == a)
            }
            (MessageFilter::UnseenFrom { sender, recipient }, Destination::Direct(to)) => {
                &message.sender == sender && to == recipient && !message.seen
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn direct(id: i64, from: &str, to: &str) -> Message {
        let draft = NewMessage::direct(
            user(from),
            user(to),
            MessageKind::Text,
            MessageContent::new("hello").unwrap(),
            datetime!(2024-01-01 0:00 UTC),
        );
        let created_at = draft.created_at;
        Message::persisted(MessageId(id), draft, created_at)
    }

    #[test]
    fn seen_is_monotonic_and_private_only() {
        let mut message = direct(1, "alice", "bob");
        assert_eq!(message.seen(), Some(false));
        assert!(message.mark_seen());
        assert!(!message.mark_seen());
        assert_eq!(message.seen(), Some(true));

        let mut common = Message::restore(
            MessageId(2),
            user("alice"),
            Destination::Broadcast,
            MessageKind::Text,
            MessageContent::new("hi").unwrap(),
            datetime!(2024-01-01 0:00 UTC),
            true,
        );
        assert_eq!(common.seen(), None);
        assert!(!common.mark_seen());
    }

    #[test]
    fn conversation_filter_is_symmetric() {
        let message = direct(1, "alice", "bob");
        assert!(MessageFilter::conversation(user("alice"), user("bob")).matches(&message));
        assert!(MessageFilter::conversation(user("bob"), user("alice")).matches(&message));
        assert!(!MessageFilter::conversation(user("alice"), user("carol")).matches(&message));
        assert!(!MessageFilter::Broadcast.matches(&message));
    }

    #[test]
    fn unseen_filter_respects_direction_and_state() {
        let mut message = direct(1, "alice", "bob");
        let filter = MessageFilter::unseen_from(user("alice"), user("bob"));
        assert!(filter.matches(&message));
        assert!(!MessageFilter::unseen_from(user("bob"), user("alice")).matches(&message));
        message.mark_seen();
        assert!(!filter.matches(&message));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert_eq!(MessageKind::parse("audio").unwrap(), MessageKind::Audio);
        assert!(MessageKind::parse("video").is_err());
    }
}
