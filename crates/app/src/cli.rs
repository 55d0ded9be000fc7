use clap::{Parser, Subcommand, ValueEnum};
use kline_core::common::Granularity;
use std::path::PathBuf;

/// 单标的分钟 / 日 K 线采集器
#[derive(Debug, Parser)]
#[command(name = "kline", version, about)]
pub struct Cli {
    /// 配置文件路径 (默认 config/kline.toml，不存在时忽略)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 按交易时段常驻调度 (默认)
    Run,
    /// 立即执行一次管线后退出
    Once {
        #[arg(value_enum, default_value_t = JobSelect::All)]
        job: JobSelect,
    },
    /// 查询最近写入的 K 线，按 JSON 行输出
    Recent {
        #[arg(long, default_value = "minute")]
        granularity: Granularity,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobSelect {
    Minute,
    Daily,
    All,
}
