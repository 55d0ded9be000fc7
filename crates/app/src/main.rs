mod cli;
mod logging;
mod settings;

use anyhow::Context;
use clap::Parser;
use kline_core::common::partition_key;
use kline_core::common::time::{RealTimeProvider, TimeProvider};
use kline_core::config::AppConfig;
use kline_core::market::port::QuoteSource;
use kline_core::store::port::CandleStore;
use kline_feed::auth::KisTokenManager;
use kline_feed::kis::KisQuoteSource;
use kline_pipeline::daily::DailyPipeline;
use kline_pipeline::minute::MinutePipeline;
use kline_pipeline::outcome::RunOutcome;
use kline_pipeline::scheduler::{Scheduler, Trigger};
use kline_store::sqlite::SqliteCandleStore;
use kline_store::writer::StoreWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::cli::{Cli, Command, JobSelect};

/// # Summary
/// 依赖装配结果：所有具体实现都在这里实例化，并以 `Arc<dyn Trait>` 注入管线。
struct Components {
    config: AppConfig,
    source: Arc<dyn QuoteSource>,
    writer: Arc<StoreWriter>,
    clock: Arc<dyn TimeProvider>,
}

impl Components {
    /// # Summary
    /// 按配置实例化基础设施层。
    ///
    /// # Logic
    /// 1. 打开 SQLite 存储并包装为分批写入器。
    /// 2. 构造令牌管理器与行情源，二者共享同一重试策略。
    async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let store = open_store(&config).await?;
        let writer = Arc::new(StoreWriter::new(
            store,
            config.store.batch_size,
            Duration::from_millis(config.store.batch_pause_ms),
            config.retry,
        ));

        let tokens = Arc::new(
            KisTokenManager::new(&config.provider, config.retry)
                .context("failed to create token manager")?,
        );
        let source = Arc::new(
            KisQuoteSource::new(&config.provider, tokens, config.retry)
                .context("failed to create quote source")?,
        );

        Ok(Self {
            config,
            source,
            writer,
            clock: Arc::new(RealTimeProvider),
        })
    }

    fn minute_pipeline(&self) -> MinutePipeline {
        MinutePipeline::new(
            self.config.instrument.instrument(),
            self.source.clone(),
            self.writer.clone(),
            self.config.market,
            self.clock.clone(),
        )
    }

    fn daily_pipeline(&self) -> DailyPipeline {
        DailyPipeline::new(
            self.config.instrument.instrument(),
            self.source.clone(),
            self.writer.clone(),
            self.config.market,
            self.clock.clone(),
        )
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CandleStore>> {
    let store = SqliteCandleStore::open(Path::new(&config.store.data_dir), &config.store.table_name)
        .await
        .context("failed to open candle store")?;
    Ok(Arc::new(store))
}

/// # Summary
/// 应用启动入口。
///
/// # Logic
/// 1. 解析命令行并分层加载配置。
/// 2. 初始化日志 (守卫持有到进程退出)。
/// 3. 按子命令分派：常驻调度、单次运行或查询。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref(), None).context("failed to load configuration")?;
    let _log_guard = logging::init(&config.log);
    kline_feed::install_crypto_provider();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scheduler(config).await,
        Command::Once { job } => run_once(config, job).await,
        Command::Recent { granularity, limit } => {
            let store = open_store(&config).await?;
            let pk = partition_key(&config.instrument.instrument(), granularity);
            for item in store.query(&pk, limit, true).await? {
                println!("{}", serde_json::to_string(&item)?);
            }
            Ok(())
        }
    }
}

/// # Summary
/// 常驻调度，直到收到 Ctrl-C。
///
/// # Logic
/// 1. 分钟任务：交易日 `minute_hour_start..=minute_hour_end` 每分钟，且限于交易时段。
/// 2. 日线任务：交易日 `daily_hour:00`。
async fn run_scheduler(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let schedule = config.schedule.clone();
    info!(
        instrument = %config.instrument.instrument(),
        minute_hours = ?(schedule.minute_hour_start..=schedule.minute_hour_end),
        daily_hour = schedule.daily_hour,
        "kline collector starting"
    );

    let components = Components::build(config).await?;
    let mut scheduler = Scheduler::new(components.config.market, components.clock.clone());
    scheduler.add_job(
        Trigger::every_minute(schedule.minute_hour_start..=schedule.minute_hour_end)
            .during_session(&components.config.market),
        Box::new(components.minute_pipeline()),
    );
    scheduler.add_job(
        Trigger::daily_at(schedule.daily_hour, 0),
        Box::new(components.daily_pipeline()),
    );

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await;
    info!("Shutdown signal received. Exiting...");
    Ok(())
}

/// 单次运行指定管线，任一失败时以非零状态退出
async fn run_once(config: AppConfig, job: JobSelect) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let components = Components::build(config).await?;

    let mut outcomes: Vec<(&str, RunOutcome)> = Vec::new();
    if matches!(job, JobSelect::Minute | JobSelect::All) {
        outcomes.push(("minute", components.minute_pipeline().run_once().await));
    }
    if matches!(job, JobSelect::Daily | JobSelect::All) {
        outcomes.push(("daily", components.daily_pipeline().run_once().await));
    }

    let mut failed = 0;
    for (name, outcome) in &outcomes {
        info!(job = name, %outcome, "run complete");
        if !outcome.is_success() {
            failed += 1;
        }
    }
    anyhow::ensure!(failed == 0, "{} of {} runs failed", failed, outcomes.len());
    Ok(())
}
