use crate::common::Granularity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 所有粒度 K 线共享的 OHLCV 基础字段。
///
/// # Invariants
/// - 合法记录需满足 `low <= min(open, close)`、`high >= max(open, close)`、`high >= low`。
/// - 价格使用定点小数 `Decimal`，严禁使用二进制浮点。
/// - 校验由 market 层的校验器完成，本结构体本身不拒绝非法值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleBase {
    // 证券代码
    pub instrument: String,
    // 开盘价
    pub open: Decimal,
    // 最高价
    pub high: Decimal,
    // 最低价
    pub low: Decimal,
    // 收盘价
    pub close: Decimal,
    // 成交量 (有符号，以便校验器识别并拒绝负值)
    pub volume: i64,
    // 记录创建时间 (仅供参考)
    pub created_at: String,
}

/// # Summary
/// 1 分钟 K 线。
///
/// # Invariants
/// - `timestamp` 格式为 `YYYY-MM-DD HH:MM:SS`，在同一标的内唯一。
/// - `sma_5` / `sma_30` 只由均线转换器写入，历史不足时保持 `None`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteCandle {
    pub base: CandleBase,
    pub timestamp: String,
    pub sma_5: Option<Decimal>,
    pub sma_30: Option<Decimal>,
}

/// # Summary
/// 日 K 线。
///
/// # Invariants
/// - `date` 格式为 `YYYY-MM-DD`，在同一标的内唯一。
/// - `timestamp` 固定为该日本地开盘时间。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCandle {
    pub base: CandleBase,
    pub date: String,
    pub timestamp: String,
}

/// # Summary
/// K 线记录的公共契约，供校验器、去重与写入器统一处理两种粒度。
pub trait CandleRecord {
    /// 共享的 OHLCV 字段
    fn base(&self) -> &CandleBase;

    /// 粒度标签
    fn granularity(&self) -> Granularity;

    /// 标的内唯一的自然键，同时作为存储排序键
    fn natural_key(&self) -> &str;
}

impl CandleRecord for MinuteCandle {
    fn base(&self) -> &CandleBase {
        &self.base
    }

    fn granularity(&self) -> Granularity {
        Granularity::Minute
    }

    fn natural_key(&self) -> &str {
        &self.timestamp
    }
}

impl CandleRecord for DailyCandle {
    fn base(&self) -> &CandleBase {
        &self.base
    }

    fn granularity(&self) -> Granularity {
        Granularity::Daily
    }

    fn natural_key(&self) -> &str {
        &self.date
    }
}

/// # Summary
/// 数据源返回的原始分钟行，所有字段均为字符串编码。
///
/// # Invariants
/// - `date` 为 `YYYYMMDD`，`time` 为 `HHMMSS`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteRow {
    pub date: String,
    pub time: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

/// # Summary
/// 数据源返回的原始日线行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}
