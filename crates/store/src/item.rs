//! K 线实体到键值存储项的映射。
//!
//! 小数一律以精确字符串写出，成交量写为整数，未设置的可选字段直接省略。

use kline_core::common::{Instrument, partition_key};
use kline_core::market::entity::{CandleBase, CandleRecord, DailyCandle, MinuteCandle};
use kline_core::store::port::StoreItem;
use serde_json::{Map, Value};

/// 可写入存储的记录
pub trait ToStoreItem: CandleRecord {
    fn to_store_item(&self) -> StoreItem;
}

impl ToStoreItem for MinuteCandle {
    /// # Summary
    /// 分钟 K 线映射，排序键为时间戳。
    ///
    /// # Logic
    /// `sma_5` / `sma_30` 仅在已计算时写出。
    fn to_store_item(&self) -> StoreItem {
        let mut attributes = base_attributes(&self.base, &self.timestamp);
        if let Some(sma) = self.sma_5 {
            attributes.insert("sma_5".into(), Value::String(sma.to_string()));
        }
        if let Some(sma) = self.sma_30 {
            attributes.insert("sma_30".into(), Value::String(sma.to_string()));
        }
        item_for(self, attributes)
    }
}

impl ToStoreItem for DailyCandle {
    /// 日 K 线映射，排序键为日期
    fn to_store_item(&self) -> StoreItem {
        let mut attributes = base_attributes(&self.base, &self.timestamp);
        attributes.insert("date".into(), Value::String(self.date.clone()));
        item_for(self, attributes)
    }
}

/// 批量映射
pub fn to_items<C: ToStoreItem>(records: &[C]) -> Vec<StoreItem> {
    records.iter().map(ToStoreItem::to_store_item).collect()
}

fn item_for<C: CandleRecord>(record: &C, attributes: Map<String, Value>) -> StoreItem {
    let instrument = Instrument::new(record.base().instrument.clone());
    StoreItem {
        pk: partition_key(&instrument, record.granularity()),
        sk: record.natural_key().to_string(),
        attributes,
    }
}

fn base_attributes(base: &CandleBase, timestamp: &str) -> Map<String, Value> {
    let mut attributes = Map::new();
    attributes.insert("stock_code".into(), Value::String(base.instrument.clone()));
    attributes.insert("timestamp".into(), Value::String(timestamp.to_string()));
    attributes.insert("open_price".into(), Value::String(base.open.to_string()));
    attributes.insert("high_price".into(), Value::String(base.high.to_string()));
    attributes.insert("low_price".into(), Value::String(base.low.to_string()));
    attributes.insert("close_price".into(), Value::String(base.close.to_string()));
    attributes.insert("volume".into(), Value::from(base.volume));
    attributes.insert("created_at".into(), Value::String(base.created_at.clone()));
    attributes
}
