//! # kline-feed
//!
//! 行情数据源适配器：KIS 风格 REST 接口的行情客户端与访问令牌管理。

pub mod auth;
pub mod http;
pub mod kis;

use tracing::debug;

/// # Summary
/// 安装进程级 rustls 加密后端 (ring)。
///
/// # Logic
/// reqwest 以 `rustls-no-provider` 构建，构造任何 HTTP 客户端前必须先调用一次。
/// 重复调用是安全的，已安装时仅记录调试日志。
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
