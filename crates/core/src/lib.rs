//! # kline-core
//!
//! 行情采集管线的领域核心：K 线实体、外部协作方端口 (Port)、错误类型、
//! 重试策略与全局配置。本 crate 不包含任何具体 I/O 实现。

pub mod auth;
pub mod common;
pub mod config;
pub mod market;
pub mod retry;
pub mod store;
