use async_trait::async_trait;
use dashmap::DashMap;
use kline_core::store::error::StoreError;
use kline_core::store::port::{CandleStore, MAX_BATCH_SIZE, StoreItem};
use std::collections::BTreeMap;

/// # Summary
/// 基于内存的 `CandleStore` 实现，用于试运行与测试。
///
/// # Invariants
/// - 每个分区内按排序键有序保存，同键写入覆盖旧值。
/// - 与持久化实现遵循相同的批量上限。
#[derive(Debug, Default)]
pub struct MemCandleStore {
    partitions: DashMap<String, BTreeMap<String, StoreItem>>,
}

impl MemCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有分区的记录总数
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按主键读取单条记录
    pub fn get(&self, pk: &str, sk: &str) -> Option<StoreItem> {
        self.partitions.get(pk).and_then(|p| p.get(sk).cloned())
    }
}

#[async_trait]
impl CandleStore for MemCandleStore {
    async fn batch_upsert(&self, items: &[StoreItem]) -> Result<(), StoreError> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(StoreError::BatchTooLarge {
                size: items.len(),
                limit: MAX_BATCH_SIZE,
            });
        }
        for item in items {
            self.partitions
                .entry(item.pk.clone())
                .or_default()
                .insert(item.sk.clone(), item.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        pk: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoreItem>, StoreError> {
        let Some(partition) = self.partitions.get(pk) else {
            return Ok(Vec::new());
        };
        let items = if descending {
            partition.values().rev().take(limit).cloned().collect()
        } else {
            partition.values().take(limit).cloned().collect()
        };
        Ok(items)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
