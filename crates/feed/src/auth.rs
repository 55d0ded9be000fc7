use crate::http::{build_client, status_error, transport_error};
use async_trait::async_trait;
use kline_core::auth::entity::AccessToken;
use kline_core::auth::port::TokenProvider;
use kline_core::common::time::{RealTimeProvider, TimeProvider};
use kline_core::config::ProviderConfig;
use kline_core::market::error::MarketError;
use kline_core::retry::RetryPolicy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/oauth2/tokenP";

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    appsecret: &'a str,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// # Summary
/// 访问令牌管理器：签发、内存缓存、文件缓存与强制刷新。
///
/// # Invariants
/// - 签发过程处于 `issue_lock` 临界区内，同一时刻至多一个签发请求。
/// - 获取锁的等待有上限；超时后退回已缓存令牌 (内存优先，其次文件)，
///   即使它可能已过期，没有任何缓存时才返回错误。
/// - 令牌在本地 TTL 到期前被视为有效，TTL 需短于数据源声明的有效期。
pub struct KisTokenManager {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    ttl: chrono::Duration,
    cache_path: Option<PathBuf>,
    lock_wait: Duration,
    retry: RetryPolicy,
    clock: Arc<dyn TimeProvider>,
    // 最近一次签发或加载的令牌
    cached: RwLock<Option<AccessToken>>,
    issue_lock: Mutex<()>,
}

impl KisTokenManager {
    /// # Summary
    /// 根据数据源配置创建令牌管理器。
    ///
    /// # Arguments
    /// * `config`: 数据源连接配置。
    /// * `retry`: 签发请求的瞬时故障重试策略。
    ///
    /// # Returns
    /// 令牌管理器，HTTP 客户端构造失败时返回错误。
    pub fn new(config: &ProviderConfig, retry: RetryPolicy) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            ttl: chrono::Duration::hours(config.token_ttl_hours),
            cache_path: config.token_cache_path.as_ref().map(PathBuf::from),
            lock_wait: Duration::from_millis(config.token_lock_wait_ms),
            retry,
            clock: Arc::new(RealTimeProvider),
            cached: RwLock::new(None),
            issue_lock: Mutex::new(()),
        })
    }

    /// 替换时钟 (测试中用于拨动时间)
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// 内存中仍然有效的令牌
    async fn valid_cached(&self) -> Option<String> {
        let now = self.clock.now();
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.token.clone())
    }

    /// # Summary
    /// 锁等待超时时的退路。
    ///
    /// # Logic
    /// 1. 返回内存中的令牌 (不检查有效期)。
    /// 2. 否则尝试读取缓存文件。
    /// 3. 都没有时返回 `Timeout`。
    async fn fallback(&self) -> Result<String, MarketError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            warn!("token lock wait timed out, using cached token");
            return Ok(token.token.clone());
        }
        if let Some(token) = self.load_file().await {
            warn!("token lock wait timed out, using token from cache file");
            return Ok(token.token);
        }
        Err(MarketError::Timeout(format!(
            "token lock not acquired within {:?} and no cached token",
            self.lock_wait
        )))
    }

    async fn load_file(&self) -> Option<AccessToken> {
        let path = self.cache_path.as_ref()?;
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<AccessToken>(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable token cache");
                None
            }
        }
    }

    async fn save_file(&self, token: &AccessToken) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        let result = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let raw = serde_json::to_string(token).map_err(std::io::Error::other)?;
            tokio::fs::write(path, raw).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write token cache");
        }
    }

    /// # Summary
    /// 向签发接口申请新令牌并写入内存与文件缓存。调用方必须持有 `issue_lock`。
    async fn issue(&self) -> Result<String, MarketError> {
        let token = self
            .retry
            .run("token.issue", MarketError::is_transient, || self.request_token())
            .await?;

        let issued_at = self.clock.now();
        let access = AccessToken {
            token: token.clone(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        self.save_file(&access).await;
        *self.cached.write().await = Some(access);
        info!(ttl_hours = self.ttl.num_hours(), "access token issued");
        Ok(token)
    }

    async fn request_token(&self) -> Result<String, MarketError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let resp = self
            .client
            .post(&url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                appkey: &self.app_key,
                appsecret: &self.app_secret,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| MarketError::Parse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(MarketError::Parse("token response without access_token".into()));
        }
        Ok(parsed.access_token)
    }
}

#[async_trait]
impl TokenProvider for KisTokenManager {
    /// # Summary
    /// 获取可用令牌。
    ///
    /// # Logic
    /// 1. 内存缓存有效则直接返回。
    /// 2. 在等待上限内获取签发锁，超时走退路。
    /// 3. 持锁后复查内存缓存，再查文件缓存，都无效时签发新令牌。
    async fn access_token(&self) -> Result<String, MarketError> {
        if let Some(token) = self.valid_cached().await {
            return Ok(token);
        }

        let Ok(_guard) = tokio::time::timeout(self.lock_wait, self.issue_lock.lock()).await else {
            return self.fallback().await;
        };

        if let Some(token) = self.valid_cached().await {
            return Ok(token);
        }
        let now = self.clock.now();
        if let Some(token) = self.load_file().await.filter(|t| t.is_valid_at(now)) {
            debug!("reusing token from cache file");
            let value = token.token.clone();
            *self.cached.write().await = Some(token);
            return Ok(value);
        }
        self.issue().await
    }

    /// # Summary
    /// 绕过缓存强制签发新令牌。
    ///
    /// # Invariants
    /// - 锁等待超时时不回退到缓存：缓存中的令牌正是刚被拒绝的那一个，
    ///   此时返回 `Timeout`，由调用方决定本次运行失败。
    async fn refresh(&self) -> Result<String, MarketError> {
        let Ok(_guard) = tokio::time::timeout(self.lock_wait, self.issue_lock.lock()).await else {
            warn!(wait = ?self.lock_wait, "token lock wait timed out, refresh skipped");
            return Err(MarketError::Timeout(format!(
                "token refresh lock not acquired within {:?}",
                self.lock_wait
            )));
        };
        info!("forcing access token refresh");
        self.issue().await
    }
}
