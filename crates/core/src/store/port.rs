use super::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单批写入的硬上限，与 DynamoDB BatchWriteItem 的限制一致。
pub const MAX_BATCH_SIZE: usize = 25;

/// # Summary
/// 键值存储中的一条记录。
///
/// # Invariants
/// - `(pk, sk)` 唯一定位一条记录，重复写入以最后一次为准。
/// - 小数字段以精确字符串保存，未设置的字段不出现在 `attributes` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    // 分区键: `标的#粒度`
    pub pk: String,
    // 排序键: 分钟为时间戳，日线为日期
    pub sk: String,
    // 其余属性
    pub attributes: Map<String, Value>,
}

impl StoreItem {
    /// 读取字符串属性
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// # Summary
/// 持久化键值存储接口。
///
/// # Invariants
/// - 不假设多条记录之间具备事务性：一批失败时由调用方整批重试。
/// - 实现者需保证对并发写入者的安全性 (最后写入者胜出)。
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// # Summary
    /// 批量写入或覆盖记录。
    ///
    /// # Arguments
    /// * `items`: 待写入记录，数量不得超过 `MAX_BATCH_SIZE`。
    ///
    /// # Returns
    /// 成功返回 Ok，失败返回 `StoreError`。
    async fn batch_upsert(&self, items: &[StoreItem]) -> Result<(), StoreError>;

    /// # Summary
    /// 按分区键查询记录。
    ///
    /// # Arguments
    /// * `pk`: 分区键。
    /// * `limit`: 返回条数上限。
    /// * `descending`: 是否按排序键倒序 (最新在前)。
    ///
    /// # Returns
    /// 记录列表或 `StoreError`。
    async fn query(
        &self,
        pk: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoreItem>, StoreError>;

    /// # Summary
    /// 探测存储是否可达、目标表是否存在。
    async fn health_check(&self) -> bool;
}
