use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理连接、读写失败与限流等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 存储暂时不可用 (连接池耗尽、文件锁、网络抖动)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// 吞吐受限
    #[error("Throttled: {0}")]
    Throttled(String),
    /// 批量超过存储上限
    #[error("Batch of {size} items exceeds limit {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    /// 存储项编解码失败
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}

impl StoreError {
    /// 是否为可按批重试的瞬时故障
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Throttled(_))
    }
}
