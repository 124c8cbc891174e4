use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;
use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("delivery error: {0}")]
    Delivery(#[from] BroadcastError),
    #[error("authentication failed")]
    Authentication,
    #[error("user already exists")]
    UserAlreadyExists,
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            // 唯一约束冲突只会发生在用户注册时
            RepositoryError::Conflict => ApplicationError::UserAlreadyExists,
            other => ApplicationError::Repository(other),
        }
    }
}
