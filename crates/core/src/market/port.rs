use crate::common::Instrument;
use crate::market::entity::{DailyRow, MinuteRow};
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// # Summary
/// 行情数据源接口（原始数据提供者）。
///
/// # Invariants
/// - 返回空列表代表"无数据"（盘外时段、非交易日），不是错误。
/// - 实现者负责鉴权、超时与瞬时故障重试，调用方只看到最终结果。
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// # Summary
    /// 获取标的最近的 1 分钟 K 线原始行。
    ///
    /// # Arguments
    /// * `instrument`: 目标标的。
    ///
    /// # Returns
    /// 成功返回原始行列表 (顺序由数据源决定)，失败返回 MarketError。
    async fn minute_rows(&self, instrument: &Instrument) -> Result<Vec<MinuteRow>, MarketError>;

    /// # Summary
    /// 获取标的在日期区间内的日线原始行。
    ///
    /// # Arguments
    /// * `instrument`: 目标标的。
    /// * `start`: 开始日期（包含）。
    /// * `end`: 结束日期（包含）。
    ///
    /// # Returns
    /// 成功返回原始行列表，失败返回 MarketError。
    async fn daily_rows(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRow>, MarketError>;
}
