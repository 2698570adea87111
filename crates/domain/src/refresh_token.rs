use chrono::{DateTime, Utc};

/// 刷新令牌记录
///
/// 令牌有效当且仅当 `revoked_at` 为空且 `expires_at` 晚于当前时间；
/// 旋转操作在同一事务中撤销旧令牌并签发新令牌。
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}
