pub mod time;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 采集标的实体，代表管线跟踪的单一证券。
///
/// # Invariants
/// - `code` 必须是数据源可识别的证券代码（例如: 005930）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    // 证券代码
    pub code: String,
    // 展示名称 (仅用于日志)
    pub name: Option<String>,
}

impl Instrument {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
        }
    }

    /// # Summary
    /// 生成存储层使用的标的键前缀。
    ///
    /// # Returns
    /// 形如 `STOCK#005930` 的字符串。
    pub fn key(&self) -> String {
        format!("STOCK#{}", self.code)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.code, name),
            None => write!(f, "{}", self.code),
        }
    }
}

/// # Summary
/// K 线时间粒度，作为分区键的一部分。
///
/// # Invariants
/// - `Display` 输出即存储层使用的粒度标签，不可随意修改。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Granularity {
    // 1 分钟 K 线
    Minute,
    // 日 K 线
    Daily,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" | "1m" => Ok(Granularity::Minute),
            "daily" | "day" | "1d" => Ok(Granularity::Daily),
            _ => Err(format!("Unknown granularity: {}", s)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Minute => write!(f, "MINUTE"),
            Granularity::Daily => write!(f, "DAILY"),
        }
    }
}

/// # Summary
/// 组装存储分区键：`标的#粒度`。
pub fn partition_key(instrument: &Instrument, granularity: Granularity) -> String {
    format!("{}#{}", instrument.key(), granularity)
}
