use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 数据源访问令牌。
///
/// # Invariants
/// - `expires_at` 为本地判定的失效时间，早于数据源声明的真实失效时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    // Bearer 令牌原文
    pub token: String,
    // 令牌签发时间
    pub issued_at: DateTime<Utc>,
    // 本地判定的失效时间
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// 在给定时刻是否仍然有效
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && now < self.expires_at
    }
}
