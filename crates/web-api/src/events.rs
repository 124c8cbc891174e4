//! 客户端发来的 WebSocket 事件
//!
//! 每个文本帧是一个以 `type` 字段区分的 JSON 对象。为兼容旧客户端：
//! - 消息正文可以放在 `content` 或 `text` 字段，`kind` 缺省为 `text`；
//! - 整帧是一个 JSON 字符串时，视为发送该文本到公共房间。

use application::OutgoingContent;
use domain::{DomainError, MessageContent, MessageKind, Username};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Authenticate {
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    SendCommon {
        #[serde(default)]
        kind: Option<MessageKind>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    SendPrivate {
        to: Username,
        #[serde(default)]
        kind: Option<MessageKind>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    MarkSeen {
        peer: Username,
    },
    LoadHistory {
        peer: Username,
    },
    CallUser {
        to: Username,
        #[serde(default)]
        offer: Value,
    },
    AnswerCall {
        to: Username,
        #[serde(default)]
        answer: Value,
    },
    IceCandidate {
        to: Username,
        #[serde(default)]
        candidate: Value,
    },
    EndCall {
        to: Username,
    },
}

impl ClientEvent {
    /// 解析一个文本帧
    pub fn decode(frame: &str) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_str(frame).map_err(malformed)?;
        match value {
            Value::String(text) => Ok(ClientEvent::SendCommon {
                kind: None,
                content: Some(text),
                text: None,
            }),
            other => serde_json::from_value(other).map_err(malformed),
        }
    }

    /// 帧是否为 `authenticate` 事件，不校验其余字段
    pub fn is_authenticate(frame: &str) -> bool {
        serde_json::from_str::<Value>(frame)
            .ok()
            .and_then(|value| {
                value
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|kind| kind == "authenticate")
            })
            .unwrap_or(false)
    }
}

fn malformed(err: serde_json::Error) -> ApiError {
    ApiError::new(
        axum::http::StatusCode::BAD_REQUEST,
        "MALFORMED_PAYLOAD",
        err.to_string(),
    )
}

/// 组装待发送的消息负载。缺少正文字段属于格式错误，正文为空属于参数错误。
pub fn outgoing_content(
    kind: Option<MessageKind>,
    content: Option<String>,
    text: Option<String>,
) -> Result<OutgoingContent, ApiError> {
    let body = content.or(text).ok_or_else(|| {
        ApiError::new(
            axum::http::StatusCode::BAD_REQUEST,
            "MALFORMED_PAYLOAD",
            "missing field `content`",
        )
    })?;
    let content = MessageContent::new(body).map_err(|err: DomainError| {
        ApiError::from(application::ApplicationError::Domain(err))
    })?;

    Ok(OutgoingContent {
        kind: kind.unwrap_or_default(),
        content,
    })
}
