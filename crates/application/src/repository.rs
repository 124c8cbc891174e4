use async_trait::async_trait;
use domain::{Message, MessageFilter, NewMessage, RepositoryError, User, Username};

/// 消息存储。
///
/// 实现方需要保证：
/// - `insert` 分配严格递增的 id，且持久化时间戳不早于已有消息（单调）；
/// - `find` 按时间戳升序返回，时间戳相同时按 id 升序；
/// - `mark_seen` 是一次原子的批量更新，返回实际改变的条数。
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    async fn find(&self, filter: MessageFilter) -> Result<Vec<Message>, RepositoryError>;

    async fn mark_seen(&self, filter: MessageFilter) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 创建用户；用户名已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;
}

/// 进程内实现，用于测试与 `memory` 存储后端
pub mod memory {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use domain::{Message, MessageFilter, MessageId, NewMessage, RepositoryError, User, Username};
    use tokio::sync::RwLock;

    use super::{MessageStore, UserRepository};

    #[derive(Default)]
    struct MessageLog {
        messages: Vec<Message>,
        last_id: i64,
    }

    #[derive(Default)]
    pub struct MemoryMessageStore {
        log: RwLock<MessageLog>,
    }

    impl MemoryMessageStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MessageStore for MemoryMessageStore {
        async fn insert(&self, message: NewMessage) -> Result<Message, RepositoryError> {
            let mut log = self.log.write().await;
            let created_at = match log.messages.last() {
                Some(last) if last.created_at > message.created_at => last.created_at,
                _ => message.created_at,
            };
            log.last_id += 1;
            let persisted = Message::persisted(MessageId(log.last_id), message, created_at);
            log.messages.push(persisted.clone());
            Ok(persisted)
        }

        async fn find(&self, filter: MessageFilter) -> Result<Vec<Message>, RepositoryError> {
            let log = self.log.read().await;
            // 日志按插入顺序追加，时间戳单调，因此天然有序
            Ok(log
                .messages
                .iter()
                .filter(|message| filter.matches(message))
                .cloned()
                .collect())
        }

        async fn mark_seen(&self, filter: MessageFilter) -> Result<u64, RepositoryError> {
            let mut log = self.log.write().await;
            let mut updated = 0;
            for message in log.messages.iter_mut() {
                if filter.matches(message) && message.mark_seen() {
                    updated += 1;
                }
            }
            Ok(updated)
        }
    }

    #[derive(Default)]
    pub struct MemoryUserRepository {
        users: RwLock<HashMap<Username, User>>,
    }

    impl MemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for MemoryUserRepository {
        async fn create(&self, user: User) -> Result<User, RepositoryError> {
            let mut users = self.users.write().await;
            if users.contains_key(&user.username) {
                return Err(RepositoryError::Conflict);
            }
            users.insert(user.username.clone(), user.clone());
            Ok(user)
        }

        async fn find_by_username(
            &self,
            username: &Username,
        ) -> Result<Option<User>, RepositoryError> {
            Ok(self.users.read().await.get(username).cloned())
        }
    }

}
