use domain::RepositoryError;
use thiserror::Error;

use crate::password::PasswordHashError;
use crate::token::TokenError;

/// 业务层通用错误，handler 据此映射到合适的 HTTP 状态码。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("username taken")]
    UsernameTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("room not found")]
    RoomNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordHashError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
