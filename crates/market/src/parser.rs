use chrono::{NaiveDate, NaiveTime};
use kline_core::common::Instrument;
use kline_core::market::entity::{CandleBase, CandleRecord, DailyCandle, DailyRow, MinuteCandle, MinuteRow};
use kline_core::market::error::MarketError;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// # Summary
/// 将数据源原始行映射为规范 K 线记录。
///
/// # Invariants
/// - 任一字段无法解析即整体失败 (数据形态错误不做部分容忍)。
/// - 映射完成后按自然键去重，保留首次出现并维持相对顺序。
#[derive(Debug, Clone)]
pub struct QuoteParser {
    instrument: Instrument,
    // 日线记录的时间戳固定为当日开盘时间
    market_open: NaiveTime,
}

impl QuoteParser {
    pub fn new(instrument: Instrument, market_open: NaiveTime) -> Self {
        Self {
            instrument,
            market_open,
        }
    }

    /// # Summary
    /// 解析分钟行。
    ///
    /// # Logic
    /// 1. `YYYYMMDD` + `HHMMSS` 解码为 `YYYY-MM-DD HH:MM:SS`。
    /// 2. 字符串价格解码为 Decimal，成交量解码为整数。
    /// 3. 按时间戳去重。
    ///
    /// # Arguments
    /// * `rows`: 原始分钟行。
    /// * `created_at`: 本次运行的创建时间戳。
    ///
    /// # Returns
    /// 去重后的分钟 K 线；输入为空时返回空列表。
    pub fn parse_minutes(
        &self,
        rows: &[MinuteRow],
        created_at: &str,
    ) -> Result<Vec<MinuteCandle>, MarketError> {
        let candles = rows
            .iter()
            .map(|row| {
                let date = parse_date(&row.date)?;
                let time = parse_time(&row.time)?;
                Ok(MinuteCandle {
                    base: self.base(
                        [&row.open, &row.high, &row.low, &row.close],
                        &row.volume,
                        created_at,
                    )?,
                    timestamp: format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M:%S")),
                    sma_5: None,
                    sma_30: None,
                })
            })
            .collect::<Result<Vec<_>, MarketError>>()?;
        Ok(dedup_by_natural_key(candles))
    }

    /// # Summary
    /// 解析日线行。
    ///
    /// # Logic
    /// 1. `YYYYMMDD` 解码为 `YYYY-MM-DD`，时间戳取当日开盘时间。
    /// 2. 按日期去重。
    pub fn parse_daily(
        &self,
        rows: &[DailyRow],
        created_at: &str,
    ) -> Result<Vec<DailyCandle>, MarketError> {
        let candles = rows
            .iter()
            .map(|row| {
                let date = parse_date(&row.date)?.format("%Y-%m-%d").to_string();
                Ok(DailyCandle {
                    base: self.base(
                        [&row.open, &row.high, &row.low, &row.close],
                        &row.volume,
                        created_at,
                    )?,
                    timestamp: format!("{} {}", date, self.market_open.format("%H:%M:%S")),
                    date,
                })
            })
            .collect::<Result<Vec<_>, MarketError>>()?;
        Ok(dedup_by_natural_key(candles))
    }

    fn base(
        &self,
        [open, high, low, close]: [&String; 4],
        volume: &str,
        created_at: &str,
    ) -> Result<CandleBase, MarketError> {
        Ok(CandleBase {
            instrument: self.instrument.code.clone(),
            open: parse_decimal("open", open)?,
            high: parse_decimal("high", high)?,
            low: parse_decimal("low", low)?,
            close: parse_decimal("close", close)?,
            volume: parse_volume(volume)?,
            created_at: created_at.to_string(),
        })
    }
}

/// # Summary
/// 按自然键去重，保留首次出现的记录并维持相对顺序。
pub fn dedup_by_natural_key<C: CandleRecord>(records: Vec<C>) -> Vec<C> {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<C> = records
        .into_iter()
        .filter(|record| seen.insert(record.natural_key().to_string()))
        .collect();
    if unique.len() != before {
        debug!(before, after = unique.len(), "duplicate rows removed");
    }
    unique
}

fn parse_date(raw: &str) -> Result<NaiveDate, MarketError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .map_err(|e| MarketError::Parse(format!("invalid date {:?}: {}", raw, e)))
}

fn parse_time(raw: &str) -> Result<NaiveTime, MarketError> {
    NaiveTime::parse_from_str(raw.trim(), "%H%M%S")
        .map_err(|e| MarketError::Parse(format!("invalid time {:?}: {}", raw, e)))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, MarketError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| MarketError::Parse(format!("invalid {} {:?}: {}", field, raw, e)))
}

fn parse_volume(raw: &str) -> Result<i64, MarketError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| MarketError::Parse(format!("invalid volume {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parser() -> QuoteParser {
        QuoteParser::new(
            Instrument::new("005930"),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        )
    }

    fn minute_row(time: &str, close: &str) -> MinuteRow {
        MinuteRow {
            date: "20261019".into(),
            time: time.into(),
            open: "71000".into(),
            high: "71500".into(),
            low: "70800".into(),
            close: close.into(),
            volume: "1234".into(),
        }
    }

    #[test]
    fn test_parse_minute_row() {
        let out = parser()
            .parse_minutes(&[minute_row("093100", "71200")], "2026-10-19 09:31:05")
            .unwrap();

        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.timestamp, "2026-10-19 09:31:00");
        assert_eq!(c.base.instrument, "005930");
        assert_eq!(c.base.open, dec!(71000));
        assert_eq!(c.base.close, dec!(71200));
        assert_eq!(c.base.volume, 1234);
        assert_eq!(c.base.created_at, "2026-10-19 09:31:05");
        assert_eq!(c.sma_5, None);
    }

    #[test]
    fn test_parse_daily_row_uses_market_open() {
        let row = DailyRow {
            date: "20261019".into(),
            open: "71000".into(),
            high: "72000".into(),
            low: "70500".into(),
            close: "71800".into(),
            volume: "15000000".into(),
        };
        let out = parser().parse_daily(&[row], "2026-10-19 16:00:00").unwrap();
        assert_eq!(out[0].date, "2026-10-19");
        assert_eq!(out[0].timestamp, "2026-10-19 09:00:00");
        assert_eq!(out[0].base.volume, 15_000_000);
    }

    #[test]
    fn test_empty_rows_yield_empty_result() {
        assert!(parser().parse_minutes(&[], "x").unwrap().is_empty());
        assert!(parser().parse_daily(&[], "x").unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_keep_first_occurrence_in_order() {
        let rows = vec![
            minute_row("093200", "100"),
            minute_row("093100", "200"),
            minute_row("093200", "300"),
            minute_row("093000", "400"),
        ];
        let out = parser().parse_minutes(&rows, "x").unwrap();
        let keys: Vec<&str> = out.iter().map(|c| c.timestamp.as_str()).collect();
        assert_eq!(
            keys,
            vec!["2026-10-19 09:32:00", "2026-10-19 09:31:00", "2026-10-19 09:30:00"]
        );
        assert_eq!(out[0].base.close, dec!(100));
    }

    #[test]
    fn test_dedup_absorbs_replayed_last_minute() {
        let seq = parser()
            .parse_minutes(
                &[minute_row("090000", "1"), minute_row("090100", "2"), minute_row("090200", "3")],
                "x",
            )
            .unwrap();
        let mut replayed = seq.clone();
        replayed.push(seq[seq.len() - 1].clone());

        assert_eq!(dedup_by_natural_key(replayed), dedup_by_natural_key(seq));
    }

    #[test]
    fn test_malformed_fields_are_parse_errors() {
        let mut bad_price = minute_row("093100", "71,200");
        assert!(matches!(
            parser().parse_minutes(&[bad_price.clone()], "x"),
            Err(MarketError::Parse(_))
        ));

        bad_price.close = "71200".into();
        bad_price.time = "996100".into();
        assert!(matches!(
            parser().parse_minutes(&[bad_price.clone()], "x"),
            Err(MarketError::Parse(_))
        ));

        bad_price.time = "093100".into();
        bad_price.volume = "".into();
        assert!(matches!(
            parser().parse_minutes(&[bad_price], "x"),
            Err(MarketError::Parse(_))
        ));
    }
}
