//! 基础设施层实现。
//!
//! 提供 SQLite 存储、密码哈希、连接事件投递等适配器，实现应用层定义的接口。

pub mod broadcast;
pub mod builder;
pub mod migrations;
pub mod password;
pub mod repository;

pub use broadcast::LocalConnectionHub;
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_sqlite_pool, SqliteMessageStore, SqliteUserRepository};
