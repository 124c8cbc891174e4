use std::str::FromStr;

use application::{MessageStore, UserRepository};
use async_trait::async_trait;
use domain::{
    timestamp_from_millis, timestamp_to_millis, Destination, Message, MessageContent,
    MessageFilter, MessageId, MessageKind, NewMessage, PasswordHash, RepositoryError, User,
    Username,
};
use sqlx::{
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions},
    FromRow, Sqlite, SqlitePool,
};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

/// 创建 SQLite 连接池。内存数据库每个连接都是独立的库，因此固定为单连接且永不回收。
pub async fn create_sqlite_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };
    pool_options.connect_with(options).await
}

#[derive(Debug, FromRow)]
struct UserRecord {
    username: String,
    password_hash: String,
    created_at: i64,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;
        let created_at = timestamp_from_millis(value.created_at)
            .ok_or_else(|| invalid_data("created_at out of range"))?;

        Ok(User::register(username, password, created_at))
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    sender: String,
    recipient: Option<String>,
    kind: String,
    content: String,
    created_at: i64,
    seen: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender = Username::parse(value.sender).map_err(|err| invalid_data(err.to_string()))?;
        let destination = match value.recipient {
            Some(recipient) => Destination::Direct(
                Username::parse(recipient).map_err(|err| invalid_data(err.to_string()))?,
            ),
            None => Destination::Broadcast,
        };
        let kind = MessageKind::parse(&value.kind).map_err(|err| invalid_data(err.to_string()))?;
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let created_at = timestamp_from_millis(value.created_at)
            .ok_or_else(|| invalid_data("created_at out of range"))?;

        Ok(Message::restore(
            MessageId(value.id),
            sender,
            destination,
            kind,
            content,
            created_at,
            value.seen,
        ))
    }
}

const MESSAGE_COLUMNS: &str = "id, sender, recipient, kind, content, created_at, seen";

/// 把查询条件翻译为 WHERE 子句及其参数
fn filter_clause(filter: &MessageFilter) -> (&'static str, Vec<String>) {
    match filter {
        MessageFilter::Broadcast => ("recipient IS NULL", Vec::new()),
        MessageFilter::Conversation { a, b } => (
            "(sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)",
            vec![a.to_string(), b.to_string()],
        ),
        MessageFilter::UnseenFrom { sender, recipient } => (
            "sender = ?1 AND recipient = ?2 AND seen = 0",
            vec![sender.to_string(), recipient.to_string()],
        ),
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::QueryAs<'q, Sqlite, MessageRecord, SqliteArguments<'q>>,
    params: Vec<String>,
) -> sqlx::query::QueryAs<'q, Sqlite, MessageRecord, SqliteArguments<'q>> {
    for param in params {
        query = query.bind(param);
    }
    query
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let recipient = match &message.destination {
            Destination::Broadcast => None,
            Destination::Direct(to) => Some(to.as_str().to_owned()),
        };

        // 单条语句完成时间戳单调校正与插入，无需显式事务
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (sender, recipient, kind, content, created_at, seen)
            VALUES (?1, ?2, ?3, ?4,
                    MAX(?5, COALESCE((SELECT MAX(created_at) FROM messages), 0)),
                    0)
            RETURNING id, sender, recipient, kind, content, created_at, seen
            "#,
        )
        .bind(message.sender.as_str())
        .bind(recipient)
        .bind(message.kind.as_str())
        .bind(message.content.as_str())
        .bind(timestamp_to_millis(message.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find(&self, filter: MessageFilter) -> Result<Vec<Message>, RepositoryError> {
        let (clause, params) = filter_clause(&filter);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {clause} ORDER BY created_at ASC, id ASC"
        );

        let records = bind_all(sqlx::query_as::<_, MessageRecord>(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_seen(&self, filter: MessageFilter) -> Result<u64, RepositoryError> {
        let (clause, params) = filter_clause(&filter);
        let sql = format!(
            "UPDATE messages SET seen = 1 WHERE ({clause}) AND recipient IS NOT NULL AND seen = 0"
        );

        let mut query = sqlx::query(&sql);
        for param in params {
            query = query.bind(param);
        }
        let result = query.execute(&self.pool).await.map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING username, password_hash, created_at
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.password.as_str())
        .bind(timestamp_to_millis(user.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT username, password_hash, created_at FROM users WHERE username = ?1",
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}
