use kline_core::retry::RetryPolicy;
use kline_core::store::error::StoreError;
use kline_core::store::port::{CandleStore, MAX_BATCH_SIZE, StoreItem};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 一次写入的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    pub items: usize,
    pub batches: usize,
}

/// # Summary
/// 分批写入器：按固定批量切分、批间限速、按批重试。
///
/// # Invariants
/// - 批量大小被限制在 `1..=MAX_BATCH_SIZE`。
/// - 按输入顺序切分，除最后一批外每批恰好 `batch_size` 条。
/// - 单批重试耗尽后立即中止，已写入的批次不回滚 (存储的 upsert 语义保证重放安全)。
pub struct StoreWriter {
    store: Arc<dyn CandleStore>,
    batch_size: usize,
    pause: Duration,
    retry: RetryPolicy,
}

impl StoreWriter {
    pub fn new(
        store: Arc<dyn CandleStore>,
        batch_size: usize,
        pause: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            pause,
            retry,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 写入前的存储探活
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// # Summary
    /// 将记录分批写入存储。
    ///
    /// # Logic
    /// 1. 按 `batch_size` 顺序切分。
    /// 2. 每批在重试策略下调用 `batch_upsert`，仅瞬时错误会重试。
    /// 3. 相邻两批之间等待 `pause`。
    ///
    /// # Arguments
    /// * `items`: 待写入记录。
    ///
    /// # Returns
    /// 写入统计；任一批最终失败时返回该批的错误。
    pub async fn write(&self, items: &[StoreItem]) -> Result<WriteReport, StoreError> {
        let total = items.len().div_ceil(self.batch_size);
        let mut report = WriteReport::default();

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            let result = self
                .retry
                .run("store.batch_upsert", StoreError::is_transient, || {
                    self.store.batch_upsert(batch)
                })
                .await;
            if let Err(e) = result {
                error!(
                    batch = index + 1,
                    total,
                    written = report.items,
                    error = %e,
                    "batch write failed"
                );
                return Err(e);
            }
            report.items += batch.len();
            report.batches += 1;
            debug!(batch = index + 1, total, size = batch.len(), "batch written");

            if index + 1 < total && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        if report.items > 0 {
            info!(items = report.items, batches = report.batches, "items written");
        }
        Ok(report)
    }
}
