//! 固定间隔的显式重试策略。
//!
//! 每个外部调用点自行持有 `RetryPolicy` 并显式调用 `run`，
//! 由调用方传入"是否可重试"判定函数。

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// # Summary
/// 固定重试预算 + 固定间隔的重试策略。
///
/// # Invariants
/// - 总尝试次数 = `max_retries + 1`。
/// - 不可重试的错误立即返回，不消耗预算。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    // 最大重试次数 (不含首次调用)
    pub max_retries: u32,
    // 两次尝试之间的等待时间
    #[serde(with = "millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// 构造固定间隔重试策略
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// 不重试
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// 总尝试次数
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// # Summary
    /// 在策略约束下执行异步操作。
    ///
    /// # Logic
    /// 1. 调用 `op`，成功立即返回。
    /// 2. 失败且 `is_retryable` 为真、预算未耗尽时，等待 `delay` 后重试。
    /// 3. 预算耗尽或错误不可重试时，返回最后一次的错误。
    ///
    /// # Arguments
    /// * `label`: 日志中标识调用点的名称。
    /// * `is_retryable`: 错误分类函数。
    /// * `op`: 每次尝试都会重新构造 Future 的闭包。
    ///
    /// # Returns
    /// 首个成功结果或最后一个错误。
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < attempts => {
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "call failed, retrying"
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if is_retryable(&e) {
                        error!(call = label, attempt, error = %e, "retry budget exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
