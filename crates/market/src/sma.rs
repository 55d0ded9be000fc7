//! 增量简单移动平均 (SMA) 转换器。
//!
//! 每个窗口由一个定长环形缓冲区和一个滚动和组成：新收盘价进入时先淘汰最旧值并从
//! 和中扣除，再加入新值。单次更新 O(1)，内存上限为窗口长度，与累计处理量无关。

use crate::buffer::RollingBuffer;
use kline_core::market::entity::MinuteCandle;
use rust_decimal::Decimal;
use tracing::debug;

/// 短周期窗口长度 (分钟)
pub const SHORT_PERIOD: usize = 5;
/// 长周期窗口长度 (分钟)
pub const LONG_PERIOD: usize = 30;

/// # Summary
/// 单个滑动窗口的状态：最近 N 个收盘价及其和。
///
/// # Invariants
/// - `sum` 恒等于 `prices` 中所有元素之和。
/// - 窗口未满时不产出均值。
#[derive(Debug, Clone)]
struct SmaWindow {
    prices: RollingBuffer<Decimal>,
    sum: Decimal,
}

impl SmaWindow {
    fn new(period: usize) -> Self {
        Self {
            prices: RollingBuffer::new(period),
            sum: Decimal::ZERO,
        }
    }

    /// # Summary
    /// 推入一个收盘价并返回当前窗口均值。
    ///
    /// # Logic
    /// 1. 缓冲区已满时 `push` 返回被淘汰的最旧值，从 `sum` 中扣除。
    /// 2. 新值加入 `sum`。
    /// 3. 窗口填满后返回 `sum / len`，否则返回 None。
    fn update(&mut self, close: Decimal) -> Option<Decimal> {
        if let Some(evicted) = self.prices.push(close) {
            self.sum -= evicted;
        }
        self.sum += close;

        if self.prices.is_full() {
            Some((self.sum / Decimal::from(self.prices.len())).normalize())
        } else {
            None
        }
    }
}

/// # Summary
/// 分钟 K 线的 5/30 周期均线转换器。
///
/// # Invariants
/// - 生命周期与宿主进程一致，由分钟管线独占持有，跨 tick 保留尾部窗口。
/// - 输入必须严格按时间升序，且同一时间戳在整个生命周期内只能输入一次。
///   转换器本身不做去重与重排，违反约束会静默得到错误的均值。
/// - 重启后状态不恢复：新实例的前 4 / 29 分钟对应均值为空。
#[derive(Debug, Clone)]
pub struct MovingAverageTransformer {
    short: SmaWindow,
    long: SmaWindow,
    // 累计处理的分钟数
    processed: u64,
}

impl Default for MovingAverageTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingAverageTransformer {
    /// 创建一个空窗口 (冷启动) 的转换器
    pub fn new() -> Self {
        Self {
            short: SmaWindow::new(SHORT_PERIOD),
            long: SmaWindow::new(LONG_PERIOD),
            processed: 0,
        }
    }

    /// # Summary
    /// 用一根分钟 K 线推进窗口，并写入其 `sma_5` / `sma_30`。
    ///
    /// # Logic
    /// 1. 收盘价依次推入短、长两个窗口。
    /// 2. 窗口未满的一侧保持 None，不以不足窗口的均值代替。
    pub fn update(&mut self, candle: &mut MinuteCandle) {
        let close = candle.base.close;
        candle.sma_5 = self.short.update(close);
        candle.sma_30 = self.long.update(close);
        self.processed = self.processed.saturating_add(1);
    }

    /// # Summary
    /// 处理一个 tick 的分钟批次。
    ///
    /// # Logic
    /// 1. 按时间戳升序排序 (稳定排序)。
    /// 2. 逐根调用 `update`。
    ///
    /// # Arguments
    /// * `batch`: 本 tick 抓取并已去重的分钟 K 线。
    ///
    /// # Returns
    /// 同一批记录（数量不变、按时间升序），均值字段已更新。
    pub fn transform(&mut self, mut batch: Vec<MinuteCandle>) -> Vec<MinuteCandle> {
        batch.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        for candle in batch.iter_mut() {
            self.update(candle);
        }
        debug!(
            batch = batch.len(),
            processed = self.processed,
            short_len = self.short.prices.len(),
            long_len = self.long.prices.len(),
            "moving averages updated"
        );
        batch
    }

    /// 当前缓冲的 (短窗口, 长窗口) 元素数
    pub fn buffered(&self) -> (usize, usize) {
        (self.short.prices.len(), self.long.prices.len())
    }

    /// 当前 (短窗口, 长窗口) 的滚动和
    pub fn running_sums(&self) -> (Decimal, Decimal) {
        (self.short.sum, self.long.sum)
    }

    /// 自创建以来处理过的分钟数
    pub fn processed(&self) -> u64 {
        self.processed
    }
}
