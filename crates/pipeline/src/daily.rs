use crate::outcome::{PipelineError, RunOutcome};
use crate::scheduler::Job;
use async_trait::async_trait;
use kline_core::common::Instrument;
use kline_core::common::time::{MarketHours, TimeProvider};
use kline_core::market::port::QuoteSource;
use kline_market::parser::QuoteParser;
use kline_market::sort_daily_desc;
use kline_market::validator::retain_valid;
use kline_store::item::to_items;
use kline_store::writer::StoreWriter;
use std::sync::Arc;
use tracing::{error, info};

/// # Summary
/// 日 K 线管线：抓取当日 → 解析去重 → 校验 → 按日期倒序 → 探活 → 写入。
///
/// # Invariants
/// - 不做均线计算，也没有跨运行状态。
/// - 请求区间的起止日期都取交易所本地的当天。
pub struct DailyPipeline {
    instrument: Instrument,
    source: Arc<dyn QuoteSource>,
    writer: Arc<StoreWriter>,
    parser: QuoteParser,
    market: MarketHours,
    clock: Arc<dyn TimeProvider>,
}

impl DailyPipeline {
    pub fn new(
        instrument: Instrument,
        source: Arc<dyn QuoteSource>,
        writer: Arc<StoreWriter>,
        market: MarketHours,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            parser: QuoteParser::new(instrument.clone(), market.open),
            instrument,
            source,
            writer,
            market,
            clock,
        }
    }

    pub async fn run_once(&self) -> RunOutcome {
        match self.execute().await {
            Ok(written) => {
                info!(instrument = %self.instrument, written, "daily pipeline succeeded");
                RunOutcome::Success { written }
            }
            Err(e) => {
                error!(
                    instrument = %self.instrument,
                    stage = %e.stage(),
                    error = %e,
                    "daily pipeline failed"
                );
                RunOutcome::from(e)
            }
        }
    }

    async fn execute(&self) -> Result<usize, PipelineError> {
        let local = self.market.local(self.clock.as_ref());
        let today = local.date_naive();
        let created_at = self.market.local_timestamp(self.clock.as_ref());

        let rows = self
            .source
            .daily_rows(&self.instrument, today, today)
            .await
            .map_err(PipelineError::Fetch)?;
        let candles = self
            .parser
            .parse_daily(&rows, &created_at)
            .map_err(PipelineError::Parse)?;
        if candles.is_empty() {
            info!(instrument = %self.instrument, %today, "no daily candle");
            return Ok(0);
        }

        let total = candles.len();
        let valid = retain_valid(candles);
        if valid.is_empty() {
            return Err(PipelineError::NoValidRecords(total));
        }
        let sorted = sort_daily_desc(valid);

        if !self.writer.health_check().await {
            return Err(PipelineError::Unhealthy);
        }
        self.writer
            .write(&to_items(&sorted))
            .await
            .map(|report| report.items)
            .map_err(PipelineError::Write)
    }
}

#[async_trait]
impl Job for DailyPipeline {
    fn name(&self) -> &'static str {
        "daily_collection"
    }

    async fn run(&mut self) -> RunOutcome {
        self.run_once().await
    }
}
