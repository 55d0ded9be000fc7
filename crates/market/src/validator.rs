use kline_core::market::entity::{CandleBase, CandleRecord};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

/// 校验失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("missing instrument")]
    MissingInstrument,
    #[error("non-positive {field}: {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },
    #[error("negative volume: {0}")]
    NegativeVolume(i64),
    #[error("high {high} below low {low}")]
    HighBelowLow { high: Decimal, low: Decimal },
    #[error("high {high} below max(open, close) {bound}")]
    HighBelowBody { high: Decimal, bound: Decimal },
    #[error("low {low} above min(open, close) {bound}")]
    LowAboveBody { low: Decimal, bound: Decimal },
}

/// # Summary
/// 检查单根 K 线的 OHLCV 一致性。
///
/// # Logic
/// 1. 标的代码非空。
/// 2. OHLC 均为正数，成交量非负。
/// 3. `high >= low`、`high >= max(open, close)`、`low <= min(open, close)`。
///
/// # Returns
/// 合法返回 Ok，否则返回首个违规项。
pub fn check(base: &CandleBase) -> Result<(), Violation> {
    if base.instrument.trim().is_empty() {
        return Err(Violation::MissingInstrument);
    }
    for (field, value) in [
        ("open", base.open),
        ("high", base.high),
        ("low", base.low),
        ("close", base.close),
    ] {
        if value <= Decimal::ZERO {
            return Err(Violation::NonPositivePrice { field, value });
        }
    }
    if base.volume < 0 {
        return Err(Violation::NegativeVolume(base.volume));
    }
    if base.high < base.low {
        return Err(Violation::HighBelowLow {
            high: base.high,
            low: base.low,
        });
    }
    let body_top = base.open.max(base.close);
    if base.high < body_top {
        return Err(Violation::HighBelowBody {
            high: base.high,
            bound: body_top,
        });
    }
    let body_bottom = base.open.min(base.close);
    if base.low > body_bottom {
        return Err(Violation::LowAboveBody {
            low: base.low,
            bound: body_bottom,
        });
    }
    Ok(())
}

/// 纯谓词形式的校验
pub fn is_valid(base: &CandleBase) -> bool {
    check(base).is_ok()
}

/// # Summary
/// 过滤掉非法记录，逐条记录警告日志，不做任何修正。
///
/// # Returns
/// 合法记录列表 (保持原顺序)。
pub fn retain_valid<C: CandleRecord>(records: Vec<C>) -> Vec<C> {
    records
        .into_iter()
        .filter(|record| match check(record.base()) {
            Ok(()) => true,
            Err(violation) => {
                warn!(
                    granularity = %record.granularity(),
                    key = record.natural_key(),
                    %violation,
                    "dropping invalid candle"
                );
                false
            }
        })
        .collect()
}
