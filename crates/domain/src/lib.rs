//! 聊天系统核心领域模型
//!
//! 包含用户名、连接、消息、通话会话等核心类型，以及相关的校验规则。
//! 领域层不依赖任何运行时或存储实现。

pub mod call;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use call::{CallKey, CallPhase, CallSession};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Destination, Message, MessageFilter, MessageKind, NewMessage};
pub use user::User;
pub use value_objects::{
    timestamp_from_millis, timestamp_to_millis, ConnectionId, MessageContent, MessageId,
    PasswordHash, Timestamp, Username, USERNAME_MAX_LEN,
};
