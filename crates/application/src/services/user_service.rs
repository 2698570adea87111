//! 用户服务
//!
//! 封装注册、登录与刷新令牌旋转。

use std::sync::Arc;

use domain::{RepositoryError, User};

use crate::error::{ApplicationError, ApplicationResult};
use crate::password::PasswordHasher;
use crate::store::{RefreshTokenStore, UserStore};
use crate::token::{self, TokenService};

/// 登录成功后返回的数据
#[derive(Debug)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// 刷新成功后返回的新令牌对
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            hasher,
            tokens,
        }
    }

    /// 注册新用户。用户名已存在时返回 `UsernameTaken`。
    pub async fn register(&self, username: &str, password: &str) -> ApplicationResult<User> {
        if self.users.find_by_username(username).await?.is_some() {
            return Err(ApplicationError::UsernameTaken);
        }
        let hash = self.hasher.hash(password).await?;
        match self.users.create(username, &hash).await {
            Ok(user) => Ok(user),
            // 与并发注册竞争失败时由唯一索引兜底
            Err(RepositoryError::Conflict) => Err(ApplicationError::UsernameTaken),
            Err(err) => Err(err.into()),
        }
    }

    /// 校验用户名密码并签发令牌对。
    pub async fn login(&self, username: &str, password: &str) -> ApplicationResult<LoginTokens> {
        let Some(user) = self.users.find_by_username(username).await? else {
            tracing::info!(username, "login rejected: unknown user");
            return Err(ApplicationError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash).await? {
            tracing::info!(username, "login rejected: bad password");
            return Err(ApplicationError::InvalidCredentials);
        }

        let access_token = self.tokens.generate_access(user.id)?;
        let refresh_token = token::generate_refresh_token();
        self.refresh_tokens
            .save(user.id, &refresh_token, self.tokens.refresh_expires_at())
            .await?;

        Ok(LoginTokens {
            access_token,
            refresh_token,
            user,
        })
    }

    /// 旋转刷新令牌：旧令牌被撤销、新令牌对签发，底层在单个事务内完成。
    pub async fn refresh(&self, old_token: &str) -> ApplicationResult<TokenPair> {
        let refresh_token = token::generate_refresh_token();
        let user_id = match self
            .refresh_tokens
            .rotate(old_token, &refresh_token, self.tokens.refresh_expires_at())
            .await
        {
            Ok(user_id) => user_id,
            Err(RepositoryError::NotFound) => {
                tracing::info!("refresh rejected: token invalid");
                return Err(ApplicationError::InvalidRefreshToken);
            }
            Err(err) => return Err(err.into()),
        };

        let access_token = self.tokens.generate_access(user_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub async fn get(&self, id: i64) -> ApplicationResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::UserNotFound)
    }
}
