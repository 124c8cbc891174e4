//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：在线状态、消息路由、已读回执、
//! 通话信令中继，以及对外部适配器（消息存储、密码哈希、事件投递）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod password;
pub mod presence;
pub mod repository;
pub mod services;

pub use broadcaster::{BroadcastError, EventDispatcher};
pub use clock::{Clock, SystemClock};
pub use dto::{MessageDto, OutgoingContent, Room, ServerEvent};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::PresenceRegistry;
pub use repository::{MessageStore, UserRepository};
pub use services::{
    AuthenticateUserRequest, CallRelay, ChatService, ChatServiceDependencies, MessageRouter,
    ReceiptTracker, RegisterUserRequest, UserService, UserServiceDependencies,
};
