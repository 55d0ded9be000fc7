use kline_core::market::error::MarketError;
use kline_core::store::error::StoreError;
use thiserror::Error;

/// 管线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Validate,
    HealthCheck,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::HealthCheck => "health_check",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// # Summary
/// 单次运行中不可恢复的阶段错误。
///
/// # Invariants
/// - 每个变体唯一对应一个阶段，由 `stage()` 给出。
/// - 只在编排器内部流转，对外统一转换为 `RunOutcome::Failure`。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(MarketError),
    #[error("parse failed: {0}")]
    Parse(MarketError),
    #[error("all {0} records failed validation")]
    NoValidRecords(usize),
    #[error("store health check failed")]
    Unhealthy,
    #[error("write failed: {0}")]
    Write(StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::NoValidRecords(_) => Stage::Validate,
            PipelineError::Unhealthy => Stage::HealthCheck,
            PipelineError::Write(_) => Stage::Write,
        }
    }
}

/// # Summary
/// 一次管线运行的终态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    // 成功，`written` 为写入存储的记录数 (无数据时为 0)
    Success { written: usize },
    // 失败，记录失败阶段与原因
    Failure { stage: Stage, reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    /// 写入条数，失败时为 None
    pub fn written(&self) -> Option<usize> {
        match self {
            RunOutcome::Success { written } => Some(*written),
            RunOutcome::Failure { .. } => None,
        }
    }
}

impl From<PipelineError> for RunOutcome {
    fn from(e: PipelineError) -> Self {
        RunOutcome::Failure {
            stage: e.stage(),
            reason: e.to_string(),
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success { written } => write!(f, "success ({} written)", written),
            RunOutcome::Failure { stage, reason } => write!(f, "failure at {}: {}", stage, reason),
        }
    }
}
