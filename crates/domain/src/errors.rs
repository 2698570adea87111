use thiserror::Error;

/// 仓储层错误类型
///
/// 由基础设施层在数据库操作失败时产生，应用层据此映射业务错误。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    /// 记录不存在
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("conflict with existing record")]
    Conflict,

    /// 其他存储错误
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
