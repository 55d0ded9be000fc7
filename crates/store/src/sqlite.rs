use async_trait::async_trait;
use kline_core::store::error::StoreError;
use kline_core::store::port::{CandleStore, MAX_BATCH_SIZE, StoreItem};
use serde_json::{Map, Value};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

const DB_FILE: &str = "candles.db";

/// `CandleStore` 的 SQLite 实现。
///
/// # Summary
/// 以单表模拟键值存储：`(pk, sk)` 为联合主键，其余属性序列化为 JSON 文本。
///
/// # Invariants
/// * 表名在构造时校验，只允许字母、数字与下划线。
/// * 一个批次在单个事务内写入，批内要么全部成功要么全部回滚。
pub struct SqliteCandleStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteCandleStore {
    /// 打开 (或创建) 数据库并确保目标表存在。
    ///
    /// # Logic
    /// 1. 校验表名并确保数据目录存在。
    /// 2. 配置 SQLite 连接选项，开启 `create_if_missing` 并设置锁等待上限。
    /// 3. 创建连接池并执行建表 SQL。
    ///
    /// # Arguments
    /// * `data_dir` - 数据根目录。
    /// * `table` - 表名。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或错误。
    pub async fn open(data_dir: &Path, table: &str) -> Result<Self, StoreError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InitError(format!("invalid table name {:?}", table)));
        }
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).map_err(|e| StoreError::InitError(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(data_dir.join(DB_FILE))
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                attributes TEXT NOT NULL,
                PRIMARY KEY (pk, sk)
            );
            "#
        ))
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!(table, path = %data_dir.join(DB_FILE).display(), "sqlite candle store ready");
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

/// sqlx 错误分类：连接层故障视为暂时不可用，锁冲突视为限流，其余为硬错误。
fn classify(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(db)
            if db.message().contains("locked") || db.message().contains("busy") =>
        {
            StoreError::Throttled(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    /// # Summary
    /// 批量写入或覆盖记录。
    ///
    /// # Logic
    /// 1. 超过批量上限直接拒绝。
    /// 2. 开启事务，逐条执行 `INSERT OR REPLACE`，最后提交。
    async fn batch_upsert(&self, items: &[StoreItem]) -> Result<(), StoreError> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(StoreError::BatchTooLarge {
                size: items.len(),
                limit: MAX_BATCH_SIZE,
            });
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {} (pk, sk, attributes) VALUES (?, ?, ?)",
            self.table
        );

        let mut tx = self.pool.begin().await.map_err(classify)?;
        for item in items {
            let attributes = serde_json::to_string(&item.attributes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            sqlx::query(&sql)
                .bind(&item.pk)
                .bind(&item.sk)
                .bind(attributes)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn query(
        &self,
        pk: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<StoreItem>, StoreError> {
        let order = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT pk, sk, attributes FROM {} WHERE pk = ? ORDER BY sk {} LIMIT ?",
            self.table, order
        );
        let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
            .bind(pk)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows.into_iter()
            .map(|(pk, sk, raw)| {
                let attributes: Map<String, Value> = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(StoreItem { pk, sk, attributes })
            })
            .collect()
    }

    /// # Summary
    /// 探测连接可用且目标表存在。
    async fn health_check(&self) -> bool {
        let found: Result<(i64,), sqlx::Error> =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_one(&self.pool)
                .await;
        match found {
            Ok((count,)) => count > 0,
            Err(e) => {
                error!(table = %self.table, error = %e, "store health check failed");
                false
            }
        }
    }
}
