use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 访问令牌供给接口，隔离令牌签发与缓存细节。
///
/// # Invariants
/// - `access_token` 不得无限期阻塞：锁竞争超时时应退回已缓存的令牌。
/// - `refresh` 必须绕过缓存强制重新签发。
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// # Summary
    /// 获取当前可用的 Bearer 令牌。
    ///
    /// # Logic
    /// 1. 缓存有效则直接返回。
    /// 2. 否则向签发接口申请新令牌并缓存。
    ///
    /// # Returns
    /// 成功返回令牌字符串，失败返回 MarketError。
    async fn access_token(&self) -> Result<String, MarketError>;

    /// # Summary
    /// 强制刷新令牌 (鉴权失败后调用)。
    ///
    /// # Returns
    /// 成功返回新令牌字符串。
    async fn refresh(&self) -> Result<String, MarketError>;
}
