use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("password hash error: {message}")]
pub struct PasswordHashError {
    pub message: String,
}

impl PasswordHashError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 密码哈希接口，生产实现基于 bcrypt（见 infrastructure crate）。
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHashError>;

    async fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordHashError>;
}
