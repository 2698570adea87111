//! 令牌服务
//!
//! 访问令牌是 HS256 签名的 JWT，`exp` 校验不留余量；
//! 刷新令牌是 32 字节随机数的 64 位小写十六进制表示，本身不携带任何声明，
//! 校验完全依赖存储层查询。

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 访问令牌携带的声明
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    pub sub: String,
    pub uid: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("bad token signature")]
    InvalidSignature,

    #[error("malformed token")]
    Malformed,

    #[error("token creation failed: {0}")]
    Creation(String),
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_minutes: i64, refresh_ttl_days: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    /// 为用户签发访问令牌。
    pub fn generate_access(&self, user_id: i64) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            uid: user_id,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Creation(err.to_string()))
    }

    /// 校验访问令牌并返回声明；`exp` 不晚于当前时间即拒绝。
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }

    /// 新刷新令牌的过期时间。
    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        Utc::now() + self.refresh_ttl
    }
}

/// 生成不透明刷新令牌：32 字节操作系统随机数，64 位小写十六进制。
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl_minutes: i64) -> TokenService {
        TokenService::new("secret", ttl_minutes, 7)
    }

    #[test]
    fn access_token_round_trip() {
        let tokens = service(5);
        let token = tokens.generate_access(123).unwrap();
        let claims = tokens.verify_access(&token).unwrap();
        assert_eq!(claims.uid, 123);
        assert_eq!(claims.sub, "123");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = service(5).generate_access(1).unwrap();
        let other = TokenService::new("other", 5, 7);
        assert_eq!(
            other.verify_access(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service(-1);
        let token = tokens.generate_access(1).unwrap();
        assert_eq!(tokens.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_token_is_malformed() {
        assert_eq!(
            service(5).verify_access("not-a-jwt"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn refresh_token_is_64_lowercase_hex() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), 64);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(token, generate_refresh_token());
    }
}
