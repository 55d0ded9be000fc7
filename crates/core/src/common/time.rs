use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// 记录创建时间、日志等使用的统一时间格式。
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 管线中所有"当前时间"（创建时间戳、日线日期、调度判定）都必须经由此接口获取。
pub trait TimeProvider: Send + Sync {
    /// 获取当前时间
    fn now(&self) -> DateTime<Utc>;
}

/// # Summary
/// 真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 测试专用虚拟时钟，允许主动拨动时间。
///
/// # Invariants
/// - 内部利用 `RwLock` 提供多线程安全的读写；锁中毒时沿用内部数据。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Utc>>,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self
            .current_time
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *time = new_time;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// # Summary
/// 市场当前所处的交易阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    // 周末休市
    Weekend,
    // 开盘前
    PreOpen,
    // 盘中
    Open,
    // 已收盘
    AfterClose,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Weekend => write!(f, "closed (weekend)"),
            MarketStatus::PreOpen => write!(f, "pre-open"),
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::AfterClose => write!(f, "after close"),
        }
    }
}

/// # Summary
/// 交易时段定义，以交易所本地时间表达。
///
/// # Invariants
/// - `open` 必须早于 `close`。
/// - 不处理节假日日历，节假日由数据源返回空结果自然吸收。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketHours {
    // 相对 UTC 的小时偏移 (KRX 为 +9)
    pub utc_offset_hours: i32,
    // 开盘时间
    pub open: NaiveTime,
    // 收盘时间
    pub close: NaiveTime,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MarketHours {
    /// # Summary
    /// 交易所时区偏移。
    ///
    /// # Logic
    /// 1. 将小时偏移换算为秒并构造 `FixedOffset`。
    /// 2. 偏移非法 (超过 ±24h) 时退回 UTC。
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// 将时钟读数换算为交易所本地时间
    pub fn local(&self, clock: &dyn TimeProvider) -> DateTime<FixedOffset> {
        clock.now().with_timezone(&self.offset())
    }

    /// # Summary
    /// 判定给定本地时间所处的交易阶段。
    ///
    /// # Logic
    /// 1. 周六、周日直接判定为休市。
    /// 2. 按 `[open, close]` 闭区间判断盘前、盘中、收盘后。
    pub fn status_at(&self, local: DateTime<FixedOffset>) -> MarketStatus {
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketStatus::Weekend;
        }
        let time = local.time();
        if time < self.open {
            MarketStatus::PreOpen
        } else if time <= self.close {
            MarketStatus::Open
        } else {
            MarketStatus::AfterClose
        }
    }

    /// 当前交易阶段
    pub fn status(&self, clock: &dyn TimeProvider) -> MarketStatus {
        self.status_at(self.local(clock))
    }

    /// 当前本地时间的格式化字符串，用作记录的创建时间戳
    pub fn local_timestamp(&self, clock: &dyn TimeProvider) -> String {
        self.local(clock).format(TIMESTAMP_FORMAT).to_string()
    }
}
