use crate::outcome::{PipelineError, RunOutcome};
use crate::scheduler::Job;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use kline_core::common::Instrument;
use kline_core::common::time::{MarketHours, MarketStatus, TimeProvider};
use kline_core::market::entity::MinuteCandle;
use kline_core::market::port::QuoteSource;
use kline_market::parser::QuoteParser;
use kline_market::sma::MovingAverageTransformer;
use kline_market::validator::retain_valid;
use kline_store::item::to_items;
use kline_store::writer::StoreWriter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 待重写队列上限 (一个交易日的分钟数)
pub const MAX_CARRY_OVER: usize = 390;

// 截断到整分钟，与分钟记录的时间戳格式一致
const MINUTE_FLOOR_FORMAT: &str = "%Y-%m-%d %H:%M:00";

/// # Summary
/// 分钟 K 线管线：抓取 → 解析去重 → 均线 → 校验 → 探活 → 写入。
///
/// # Invariants
/// - 独占持有一个 `MovingAverageTransformer`，生命周期与管线实例一致。
/// - 只有已完结的分钟才会送入转换器：时间戳早于当前整分钟，
///   且盘中不是本次抓取结果里最新的一根 (最新一根可能仍在形成)。
/// - `watermark` 记录最后一根送入转换器的时间戳；只有严格更新的分钟会进入转换器，
///   因此同一时间戳在转换器生命周期内至多输入一次。
/// - 已计算均线但写入失败的记录进入 `pending`，下一次运行时排在新批次之前重写，
///   不会再次送入转换器。
pub struct MinutePipeline {
    instrument: Instrument,
    source: Arc<dyn QuoteSource>,
    writer: Arc<StoreWriter>,
    parser: QuoteParser,
    market: MarketHours,
    clock: Arc<dyn TimeProvider>,
    transformer: MovingAverageTransformer,
    watermark: Option<String>,
    pending: Vec<MinuteCandle>,
}

impl MinutePipeline {
    /// # Summary
    /// 创建分钟管线，转换器为冷启动状态。
    ///
    /// # Arguments
    /// * `instrument`: 采集标的。
    /// * `source`: 行情源。
    /// * `writer`: 分批写入器。
    /// * `market`: 交易时段 (本地时间戳与日线开盘时间)。
    /// * `clock`: 时钟。
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
            transformer: MovingAverageTransformer::new(),
            watermark: None,
            pending: Vec::new(),
        }
    }

    pub fn transformer(&self) -> &MovingAverageTransformer {
        &self.transformer
    }

    /// 最后一根送入转换器的分钟时间戳
    pub fn watermark(&self) -> Option<&str> {
        self.watermark.as_deref()
    }

    /// 等待重写的记录数
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// # Summary
    /// 执行一次运行，所有阶段错误都在此转换为 `RunOutcome`。
    pub async fn run_once(&mut self) -> RunOutcome {
        match self.execute().await {
            Ok(written) => {
                info!(instrument = %self.instrument, written, "minute pipeline succeeded");
                RunOutcome::Success { written }
            }
            Err(e) => {
                error!(
                    instrument = %self.instrument,
                    stage = %e.stage(),
                    pending = self.pending.len(),
                    error = %e,
                    "minute pipeline failed"
                );
                RunOutcome::from(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<usize, PipelineError> {
        let local = self.market.local(self.clock.as_ref());
        let created_at = self.market.local_timestamp(self.clock.as_ref());

        let rows = self
            .source
            .minute_rows(&self.instrument)
            .await
            .map_err(PipelineError::Fetch)?;
        let candles = self
            .parser
            .parse_minutes(&rows, &created_at)
            .map_err(PipelineError::Parse)?;

        let fresh = self.take_fresh(candles, local);
        let fresh_count = fresh.len();
        let mut valid = Vec::new();
        if !fresh.is_empty() {
            let transformed = self.transformer.transform(fresh);
            if let Some(last) = transformed.last() {
                self.watermark = Some(last.timestamp.clone());
            }
            valid = retain_valid(transformed);
        }

        let mut batch = std::mem::take(&mut self.pending);
        if !batch.is_empty() {
            info!(carried = batch.len(), "re-submitting candles from failed write");
        }
        if fresh_count > 0 && valid.is_empty() {
            // 已推进的转换器状态不回退，仅保留之前待重写的记录
            self.pending = batch;
            return Err(PipelineError::NoValidRecords(fresh_count));
        }
        batch.extend(valid);

        if batch.is_empty() {
            info!(instrument = %self.instrument, "no new minute candles");
            return Ok(0);
        }

        if !self.writer.health_check().await {
            self.carry_over(batch);
            return Err(PipelineError::Unhealthy);
        }

        match self.writer.write(&to_items(&batch)).await {
            Ok(report) => Ok(report.items),
            Err(e) => {
                self.carry_over(batch);
                Err(PipelineError::Write(e))
            }
        }
    }

    /// # Summary
    /// 筛出已完结且未送入过转换器的分钟。
    ///
    /// # Logic
    /// 1. 时间戳不早于当前整分钟的记录仍在形成，留待之后的运行。
    /// 2. 盘中，本次结果里最新的一根同样保留，直到出现更新的分钟；
    ///    收盘后最后一根已定型，不再保留。
    /// 3. 数据源返回与上次重叠的尾部窗口，时间戳不晚于水位线的记录已处理过，直接丢弃。
    ///
    /// # Arguments
    /// * `candles`: 本次解析去重后的分钟记录。
    /// * `local`: 本次运行的交易所本地时间。
    fn take_fresh(&self, candles: Vec<MinuteCandle>, local: DateTime<FixedOffset>) -> Vec<MinuteCandle> {
        let cutoff = local.format(MINUTE_FLOOR_FORMAT).to_string();
        let newest = if self.market.status_at(local) == MarketStatus::Open {
            candles.iter().map(|c| c.timestamp.clone()).max()
        } else {
            None
        };
        let mark = self.watermark.as_deref();

        let total = candles.len();
        let fresh: Vec<MinuteCandle> = candles
            .into_iter()
            .filter(|c| {
                let ts = c.timestamp.as_str();
                ts < cutoff.as_str()
                    && newest.as_deref().is_none_or(|n| ts < n)
                    && mark.is_none_or(|m| ts > m)
            })
            .collect();
        if fresh.len() < total {
            debug!(
                skipped = total - fresh.len(),
                watermark = ?mark,
                %cutoff,
                "minutes still forming or already ingested"
            );
        }
        fresh
    }

    fn carry_over(&mut self, mut batch: Vec<MinuteCandle>) {
        if batch.len() > MAX_CARRY_OVER {
            let dropped = batch.len() - MAX_CARRY_OVER;
            warn!(dropped, "carry-over queue full, dropping oldest candles");
            batch.drain(..dropped);
        }
        self.pending = batch;
    }
}

#[async_trait]
impl Job for MinutePipeline {
    fn name(&self) -> &'static str {
        "minute_collection"
    }

    async fn run(&mut self) -> RunOutcome {
        self.run_once().await
    }
}
