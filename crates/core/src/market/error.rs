use thiserror::Error;

/// # Summary
/// 行情域错误枚举，覆盖网络、鉴权、数据源业务错误与数据解析问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `is_transient` 决定重试策略是否介入，鉴权错误由专门的刷新逻辑处理。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    // 网络层错误 (连接失败、5xx 等)
    #[error("Network error: {0}")]
    Network(String),
    // 请求超时
    #[error("Request timed out: {0}")]
    Timeout(String),
    // 数据源限流
    #[error("Rate limited: {0}")]
    Throttled(String),
    // 凭证无效或已过期
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    // 数据源返回的业务错误 (rt_cd != 0)
    #[error("Provider error [{code}]: {message}")]
    Provider { code: String, message: String },
    // 响应结构不符或字段无法解析
    #[error("Parse error: {0}")]
    Parse(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl MarketError {
    /// # Summary
    /// 判断该错误是否属于可重试的瞬时 I/O 故障。
    ///
    /// # Returns
    /// 网络、超时、限流返回 true；鉴权、业务、解析错误返回 false。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MarketError::Network(_) | MarketError::Timeout(_) | MarketError::Throttled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MarketError::Network("reset".into()).is_transient());
        assert!(MarketError::Timeout("10s".into()).is_transient());
        assert!(MarketError::Throttled("EGW00201".into()).is_transient());
        assert!(!MarketError::Unauthorized("EGW00123".into()).is_transient());
        assert!(!MarketError::Parse("missing output2".into()).is_transient());
        assert!(
            !MarketError::Provider {
                code: "1".into(),
                message: "bad request".into()
            }
            .is_transient()
        );
    }
}
