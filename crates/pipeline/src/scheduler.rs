use crate::outcome::RunOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeDelta, Timelike, Weekday};
use kline_core::common::time::{MarketHours, TimeProvider};
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// # Summary
/// 可被调度器触发的任务。
///
/// # Invariants
/// - `run` 不得返回错误：所有失败都已转换为 `RunOutcome`。
#[async_trait]
pub trait Job: Send {
    /// 任务标识，用于日志与互斥
    fn name(&self) -> &'static str;

    /// 执行一次
    async fn run(&mut self) -> RunOutcome;
}

/// # Summary
/// 类 cron 的触发规则：周一至周五、指定小时区间内、指定分钟 (None 表示每分钟)，
/// 可选再限制在一个本地时刻窗口内。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub hours: RangeInclusive<u32>,
    pub minute: Option<u32>,
    pub session: Option<RangeInclusive<NaiveTime>>,
}

impl Trigger {
    /// 区间内每分钟触发
    pub fn every_minute(hours: RangeInclusive<u32>) -> Self {
        Self {
            hours,
            minute: None,
            session: None,
        }
    }

    /// 每天指定时刻触发一次
    pub fn daily_at(hour: u32, minute: u32) -> Self {
        Self {
            hours: hour..=hour,
            minute: Some(minute),
            session: None,
        }
    }

    /// # Summary
    /// 额外限制在交易时段内触发。
    ///
    /// # Logic
    /// 窗口为 `[open, close + 1min]`：收盘那一分钟的 K 线要到下一分钟才完结，
    /// 多出的一次触发负责收取它。
    pub fn during_session(mut self, market: &MarketHours) -> Self {
        let (end, _) = market.close.overflowing_add_signed(TimeDelta::minutes(1));
        self.session = Some(market.open..=end.max(market.close));
        self
    }

    /// 给定的交易所本地时间是否命中
    pub fn is_due(&self, local: DateTime<FixedOffset>) -> bool {
        !matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
            && self.hours.contains(&local.hour())
            && self.minute.is_none_or(|m| m == local.minute())
            && self
                .session
                .as_ref()
                .is_none_or(|window| window.contains(&local.time()))
    }
}

struct ScheduledJob {
    name: &'static str,
    trigger: Trigger,
    job: Arc<Mutex<Box<dyn Job>>>,
}

/// 单个任务在某一 tick 上的派发结果
#[derive(Debug)]
pub enum Dispatch {
    Started {
        job: &'static str,
        handle: JoinHandle<RunOutcome>,
    },
    // 上一次运行尚未结束，本 tick 跳过
    Skipped { job: &'static str },
}

/// # Summary
/// 交易时段调度器。
///
/// # Invariants
/// - 每个任务置于独立的 `tokio::sync::Mutex` 之后，同一任务同时至多一个运行。
/// - 运行中的任务遇到新 tick 时直接跳过，不排队。
/// - 每次运行处于独立的 `tick` span 内，携带任务名与 `run_id`。
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    market: MarketHours,
    clock: Arc<dyn TimeProvider>,
}

impl Scheduler {
    pub fn new(market: MarketHours, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            jobs: Vec::new(),
            market,
            clock,
        }
    }

    /// 注册任务
    pub fn add_job(&mut self, trigger: Trigger, job: Box<dyn Job>) {
        info!(job = job.name(), ?trigger, "job registered");
        self.jobs.push(ScheduledJob {
            name: job.name(),
            trigger,
            job: Arc::new(Mutex::new(job)),
        });
    }

    /// # Summary
    /// 在给定本地时间上派发所有到期任务。
    ///
    /// # Logic
    /// 1. 过滤出触发规则命中的任务。
    /// 2. `try_lock_owned` 成功则在新 span 中后台运行，失败则记录跳过。
    ///
    /// # Returns
    /// 每个到期任务的派发结果。
    pub fn tick(&self, local: DateTime<FixedOffset>) -> Vec<Dispatch> {
        self.jobs
            .iter()
            .filter(|scheduled| scheduled.trigger.is_due(local))
            .map(|scheduled| match scheduled.job.clone().try_lock_owned() {
                Ok(mut job) => {
                    let run_id = Uuid::new_v4();
                    let span = info_span!("tick", job = scheduled.name, %run_id);
                    let handle = tokio::spawn(
                        async move {
                            let outcome = job.run().await;
                            info!(%outcome, "run finished");
                            outcome
                        }
                        .instrument(span),
                    );
                    Dispatch::Started {
                        job: scheduled.name,
                        handle,
                    }
                }
                Err(_) => {
                    warn!(job = scheduled.name, at = %local, "previous run still in progress, tick skipped");
                    Dispatch::Skipped {
                        job: scheduled.name,
                    }
                }
            })
            .collect()
    }

    /// # Summary
    /// 调度主循环，直到 `shutdown` 完成。
    ///
    /// # Logic
    /// 1. 启动时记录当前交易阶段。
    /// 2. 休眠到下一个整分钟 (交易所本地时钟)，唤醒后派发到期任务。
    /// 3. `shutdown` 完成时退出，已派发的运行不被中断。
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let local = self.market.local(self.clock.as_ref());
        info!(
            jobs = self.jobs.len(),
            status = %self.market.status_at(local),
            local_time = %local.format("%Y-%m-%d %H:%M:%S"),
            "scheduler started"
        );

        tokio::pin!(shutdown);
        loop {
            let wait = until_next_minute(self.market.local(self.clock.as_ref()));
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    let now = self.market.local(self.clock.as_ref());
                    for dispatch in self.tick(now) {
                        if let Dispatch::Started { job, .. } = dispatch {
                            info!(job, "job dispatched");
                        }
                    }
                }
            }
        }
    }
}

/// 距离下一个整分钟的时长
pub fn until_next_minute(local: DateTime<FixedOffset>) -> Duration {
    let elapsed_ms = u64::from(local.second()) * 1_000 + u64::from(local.timestamp_subsec_millis());
    Duration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}
