use std::sync::Arc;

use application::{
    repository::memory::{MemoryMessageStore, MemoryUserRepository},
    EventDispatcher, MessageStore, PasswordHasher, UserRepository,
};
use config::{AppConfig, StorageBackend};
use thiserror::Error;
use tracing::info;

use crate::{
    broadcast::LocalConnectionHub,
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_sqlite_pool, SqliteMessageStore, SqliteUserRepository},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            bcrypt_cost: None,
        }
    }
}

impl From<&AppConfig> for InfrastructureConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            backend: config.storage.backend,
            database_url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            bcrypt_cost: config.server.bcrypt_cost,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 组装好的适配器集合
#[derive(Clone)]
pub struct Infrastructure {
    pub message_store: Arc<dyn MessageStore>,
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
    pub hub: Arc<LocalConnectionHub>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let (message_store, user_repository): (Arc<dyn MessageStore>, Arc<dyn UserRepository>) =
            match config.backend {
                StorageBackend::Sqlite => {
                    let pool =
                        create_sqlite_pool(&config.database_url, config.max_connections).await?;
                    MIGRATOR.run(&pool).await?;
                    info!(url = %config.database_url, "SQLite 存储已就绪");
                    (
                        Arc::new(SqliteMessageStore::new(pool.clone())),
                        Arc::new(SqliteUserRepository::new(pool)),
                    )
                }
                StorageBackend::Memory => {
                    info!("使用内存存储，重启后数据丢失");
                    (
                        Arc::new(MemoryMessageStore::new()),
                        Arc::new(MemoryUserRepository::new()),
                    )
                }
            };

        Ok(Self {
            message_store,
            user_repository,
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost)),
            hub: Arc::new(LocalConnectionHub::new()),
        })
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }

    pub fn dispatcher(&self) -> Arc<dyn EventDispatcher> {
        self.hub.clone()
    }
}
