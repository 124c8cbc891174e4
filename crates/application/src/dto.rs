//! 对外的数据结构：线上消息格式与服务端推送事件

use domain::{
    timestamp_to_millis, Destination, Message, MessageContent, MessageId, MessageKind, Username,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Room {
    Common,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: MessageId,
    pub from: Username,
    pub room: Room,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Username>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    /// Unix 毫秒
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen: Option<bool>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        let (room, to) = match &message.destination {
            Destination::Broadcast => (Room::Common, None),
            Destination::Direct(to) => (Room::Private, Some(to.clone())),
        };
        Self {
            id: message.id,
            from: message.sender.clone(),
            room,
            to,
            kind: message.kind,
            content: message.content.as_str().to_owned(),
            timestamp: timestamp_to_millis(message.created_at),
            seen: message.seen(),
        }
    }
}

/// 待发送的消息负载，已通过校验
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingContent {
    pub kind: MessageKind,
    pub content: MessageContent,
}

impl OutgoingContent {
    pub fn text(content: MessageContent) -> Self {
        Self {
            kind: MessageKind::Text,
            content,
        }
    }
}

/// 服务端推送给连接的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    PresenceChanged {
        users: Vec<Username>,
    },
    CommonMessage {
        message: MessageDto,
    },
    CommonHistory {
        messages: Vec<MessageDto>,
    },
    PrivateMessage {
        message: MessageDto,
    },
    PrivateHistory {
        peer: Username,
        messages: Vec<MessageDto>,
    },
    SeenConfirmed {
        by: Username,
    },
    IncomingCall {
        from: Username,
        signal: Value,
    },
    CallAccepted {
        from: Username,
        signal: Value,
    },
    IceCandidate {
        from: Username,
        candidate: Value,
    },
    CallEnded {
        from: Username,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 事件名，与 JSON 中的 `type` 字段一致
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::PresenceChanged { .. } => "presenceChanged",
            ServerEvent::CommonMessage { .. } => "commonMessage",
            ServerEvent::CommonHistory { .. } => "commonHistory",
            ServerEvent::PrivateMessage { .. } => "privateMessage",
            ServerEvent::PrivateHistory { .. } => "privateHistory",
            ServerEvent::SeenConfirmed { .. } => "seenConfirmed",
            ServerEvent::IncomingCall { .. } => "incomingCall",
            ServerEvent::CallAccepted { .. } => "callAccepted",
            ServerEvent::IceCandidate { .. } => "iceCandidate",
            ServerEvent::CallEnded { .. } => "callEnded",
            ServerEvent::Error { .. } => "error",
        }
    }
}
