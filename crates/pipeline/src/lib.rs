//! # kline-pipeline
//!
//! 应用服务层：把抓取、解析、均线、校验与写入串成单次运行的管线，
//! 并由调度器按交易时段周期性触发。

pub mod daily;
pub mod minute;
pub mod outcome;
pub mod scheduler;
