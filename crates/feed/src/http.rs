use kline_core::market::error::MarketError;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// 鉴权失败的业务码 (令牌无效 / 令牌过期)
pub const AUTH_FAILURE_CODES: [&str; 2] = ["EGW00121", "EGW00123"];
/// 调用频率超限的业务码
pub const THROTTLED_CODE: &str = "EGW00201";

/// # Summary
/// 构造带请求超时的 HTTP 客户端。
///
/// # Returns
/// 客户端，或 `MarketError::Unknown` (TLS 后端未安装等)。
pub fn build_client(timeout: Duration) -> Result<Client, MarketError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| MarketError::Unknown(format!("failed to build HTTP client: {}", e)))
}

/// 传输层错误分类：超时与连接失败可重试，解码失败属于数据形态错误
pub fn transport_error(e: reqwest::Error) -> MarketError {
    if e.is_timeout() {
        MarketError::Timeout(e.to_string())
    } else if e.is_decode() {
        MarketError::Parse(e.to_string())
    } else {
        MarketError::Network(e.to_string())
    }
}

/// # Summary
/// 按业务码分类数据源错误。
///
/// # Returns
/// 鉴权码 → `Unauthorized`，限流码 → `Throttled`，其余 → `Provider`。
pub fn provider_error(code: &str, message: &str) -> MarketError {
    if AUTH_FAILURE_CODES.contains(&code) {
        MarketError::Unauthorized(format!("{}: {}", code, message))
    } else if code == THROTTLED_CODE {
        MarketError::Throttled(format!("{}: {}", code, message))
    } else {
        MarketError::Provider {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// # Summary
/// 按 HTTP 状态码分类非 2xx 响应。
///
/// # Returns
/// 401/403 → `Unauthorized`，429 → `Throttled`，5xx → `Network`，
/// 其余 → `Provider` (以状态码作为业务码)。
pub fn status_error(status: StatusCode, body: &str) -> MarketError {
    let detail = format!("HTTP {}: {}", status, truncate(body, 200));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MarketError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => MarketError::Throttled(detail),
        s if s.is_server_error() => MarketError::Network(detail),
        s => MarketError::Provider {
            code: s.as_u16().to_string(),
            message: detail,
        },
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
