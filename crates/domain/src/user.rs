use crate::value_objects::{PasswordHash, Timestamp, Username};

/// 已注册用户。用户名唯一且创建后不可修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: Username,
    pub password: PasswordHash,
    pub created_at: Timestamp,
}

impl User {
    pub fn register(username: Username, password: PasswordHash, created_at: Timestamp) -> Self {
        Self {
            username,
            password,
            created_at,
        }
    }
}
