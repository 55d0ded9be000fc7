//! # kline-market
//!
//! 行情数据的纯计算层：原始行解析与去重、OHLCV 校验、增量均线转换。
//! 本 crate 不做任何 I/O。

pub mod buffer;
pub mod parser;
pub mod sma;
pub mod validator;

use kline_core::market::entity::DailyCandle;

/// # Summary
/// 日线无均线计算，只按日期倒序排列 (最新在前)。
pub fn sort_daily_desc(mut candles: Vec<DailyCandle>) -> Vec<DailyCandle> {
    candles.sort_by(|a, b| b.date.cmp(&a.date));
    candles
}
