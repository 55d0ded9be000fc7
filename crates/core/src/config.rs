use crate::common::Instrument;
use crate::common::time::MarketHours;
use crate::retry::RetryPolicy;
use crate::store::port::MAX_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub instrument: InstrumentConfig,
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    pub schedule: ScheduleConfig,
    pub market: MarketHours,
    pub log: LogConfig,
}

/// 行情数据源连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    // 单次 HTTP 请求超时 (秒)
    pub timeout_secs: u64,
    // 令牌本地有效期 (小时)，需短于数据源声明的有效期
    pub token_ttl_hours: i64,
    // 令牌缓存文件，None 表示只在内存中缓存
    pub token_cache_path: Option<String>,
    // 令牌锁最长等待时间 (毫秒)
    pub token_lock_wait_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openapi.koreainvestment.com:9443".to_string(),
            app_key: String::new(),
            app_secret: String::new(),
            timeout_secs: 10,
            token_ttl_hours: 23,
            token_cache_path: Some("data/token.json".to_string()),
            token_lock_wait_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub code: String,
    pub name: Option<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            code: "005930".to_string(),
            name: None,
        }
    }
}

impl InstrumentConfig {
    pub fn instrument(&self) -> Instrument {
        Instrument {
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

/// 持久化存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: String,
    pub table_name: String,
    pub batch_size: usize,
    // 批次之间的停顿 (毫秒)
    pub batch_pause_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            table_name: "stock_candles".to_string(),
            batch_size: MAX_BATCH_SIZE,
            batch_pause_ms: 100,
        }
    }
}

/// 调度配置，时间均为交易所本地时间
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    // 分钟任务首个小时 (含)
    pub minute_hour_start: u32,
    // 分钟任务最后一个小时 (含)
    pub minute_hour_end: u32,
    // 日线任务触发小时
    pub daily_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            minute_hour_start: 9,
            minute_hour_end: 15,
            daily_hour: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    // 滚动日志目录，None 表示只输出到标准输出
    pub dir: Option<String>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: Some("logs".to_string()),
            file_prefix: "pipeline.log".to_string(),
        }
    }
}

impl AppConfig {
    /// # Summary
    /// 校验配置的完整性与取值范围。
    ///
    /// # Logic
    /// 1. 凭证与标的代码不可为空。
    /// 2. 批大小必须落在 `1..=MAX_BATCH_SIZE`。
    /// 3. 调度小时必须合法且起止有序。
    ///
    /// # Returns
    /// 合法返回 Ok，否则返回首个违规项。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.app_key.trim().is_empty() {
            return Err(ConfigError::Missing("provider.app_key"));
        }
        if self.provider.app_secret.trim().is_empty() {
            return Err(ConfigError::Missing("provider.app_secret"));
        }
        if self.instrument.code.trim().is_empty() {
            return Err(ConfigError::Missing("instrument.code"));
        }
        if self.store.batch_size == 0 || self.store.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                key: "store.batch_size",
                reason: format!("must be within 1..={}", MAX_BATCH_SIZE),
            });
        }
        if self.provider.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "provider.token_ttl_hours",
                reason: "must be positive".to_string(),
            });
        }
        let s = &self.schedule;
        if s.minute_hour_end > 23 || s.daily_hour > 23 || s.minute_hour_start > s.minute_hour_end {
            return Err(ConfigError::Invalid {
                key: "schedule",
                reason: format!(
                    "minute hours {}..={} / daily hour {} out of range",
                    s.minute_hour_start, s.minute_hour_end, s.daily_hour
                ),
            });
        }
        if self.market.open >= self.market.close {
            return Err(ConfigError::Invalid {
                key: "market",
                reason: "open must precede close".to_string(),
            });
        }
        Ok(())
    }
}
