use kline_core::market::entity::{CandleBase, MinuteCandle};
use kline_core::retry::RetryPolicy;
use kline_core::store::error::StoreError;
use kline_core::store::port::{CandleStore, StoreItem};
use kline_store::item::to_items;
use kline_store::sqlite::SqliteCandleStore;
use kline_store::writer::StoreWriter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn minute(index: usize, close: Decimal) -> MinuteCandle {
    MinuteCandle {
        base: CandleBase {
            instrument: "005930".into(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
            created_at: "2026-10-19 10:00:00".into(),
        },
        timestamp: format!("2026-10-19 {:02}:{:02}:00", 9 + index / 60, index % 60),
        sma_5: (index >= 4).then_some(close),
        sma_30: None,
    }
}

#[tokio::test]
async fn test_sqlite_store_full_integration() -> anyhow::Result<()> {
    // 1. 初始化临时测试环境
    let tmp_dir = tempdir()?;
    let store = Arc::new(SqliteCandleStore::open(tmp_dir.path(), "stock_candles").await?);
    assert!(store.health_check().await);

    // 2. 60 根分钟线按 25 条一批写入
    let candles: Vec<MinuteCandle> = (0..60).map(|i| minute(i, dec!(71000.5))).collect();
    let writer = StoreWriter::new(store.clone(), 25, Duration::from_millis(1), RetryPolicy::no_retry());
    let report = writer.write(&to_items(&candles)).await?;
    assert_eq!((report.items, report.batches), (60, 3));

    // 3. 倒序查询最新记录
    let recent = store.query("STOCK#005930#MINUTE", 3, true).await?;
    let keys: Vec<&str> = recent.iter().map(|i| i.sk.as_str()).collect();
    assert_eq!(keys, vec!["2026-10-19 09:59:00", "2026-10-19 09:58:00", "2026-10-19 09:57:00"]);
    assert_eq!(recent[0].get_str("close_price"), Some("71000.5"));
    assert_eq!(recent[0].get_str("sma_5"), Some("71000.5"));

    // 4. 重复写入同一主键以最后一次为准
    let mut replay = minute(59, dec!(72000));
    replay.base.high = dec!(72000);
    writer.write(&to_items(&[replay])).await?;
    let all = store.query("STOCK#005930#MINUTE", 100, false).await?;
    assert_eq!(all.len(), 60);
    assert_eq!(all[59].get_str("close_price"), Some("72000"));
    assert_eq!(all[0].sk, "2026-10-19 09:00:00");
    assert!(!all[0].attributes.contains_key("sma_5"));

    // 5. 其他分区不受影响
    assert!(store.query("STOCK#005930#DAILY", 10, true).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_rejects_bad_input() -> anyhow::Result<()> {
    let tmp_dir = tempdir()?;
    assert!(matches!(
        SqliteCandleStore::open(tmp_dir.path(), "candles; DROP TABLE x").await,
        Err(StoreError::InitError(_))
    ));

    let store = SqliteCandleStore::open(tmp_dir.path(), "candles").await?;
    let oversized: Vec<StoreItem> = (0..26)
        .map(|i| StoreItem {
            pk: "P".into(),
            sk: i.to_string(),
            attributes: Default::default(),
        })
        .collect();
    assert_eq!(
        store.batch_upsert(&oversized).await,
        Err(StoreError::BatchTooLarge { size: 26, limit: 25 })
    );
    assert!(store.query("P", 10, true).await?.is_empty());
    Ok(())
}
