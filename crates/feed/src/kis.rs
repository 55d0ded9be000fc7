use crate::http::{build_client, provider_error, status_error, transport_error};
use async_trait::async_trait;
use chrono::NaiveDate;
use kline_core::auth::port::TokenProvider;
use kline_core::common::Instrument;
use kline_core::config::ProviderConfig;
use kline_core::market::entity::{DailyRow, MinuteRow};
use kline_core::market::error::MarketError;
use kline_core::market::port::QuoteSource;
use kline_core::retry::RetryPolicy;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const MINUTE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice";
const MINUTE_TR_ID: &str = "FHKST03010200";
const DAILY_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice";
const DAILY_TR_ID: &str = "FHKST03010100";

/// # Summary
/// KIS 行情接口响应外层结构。
///
/// # Invariants
/// - `rt_cd == "0"` 表示成功，其余为业务错误，错误码见 `msg_cd`。
/// - 无数据时 `output2` 可能缺失或为空数组。
#[derive(Deserialize, Debug)]
struct Envelope<T> {
    #[serde(default)]
    rt_cd: String,
    #[serde(default)]
    msg_cd: String,
    #[serde(default)]
    msg1: String,
    #[serde(default = "Vec::new")]
    output2: Vec<T>,
}

/// 分钟行原始字段
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct RawMinute {
    stck_bsop_date: String,
    stck_cntg_hour: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    // 当前价，即该分钟收盘价
    stck_prpr: String,
    cntg_vol: String,
}

/// 日线行原始字段
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct RawDaily {
    stck_bsop_date: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    stck_clpr: String,
    acml_vol: String,
}

impl From<RawMinute> for MinuteRow {
    fn from(raw: RawMinute) -> Self {
        MinuteRow {
            date: raw.stck_bsop_date,
            time: raw.stck_cntg_hour,
            open: raw.stck_oprc,
            high: raw.stck_hgpr,
            low: raw.stck_lwpr,
            close: raw.stck_prpr,
            volume: raw.cntg_vol,
        }
    }
}

impl From<RawDaily> for DailyRow {
    fn from(raw: RawDaily) -> Self {
        DailyRow {
            date: raw.stck_bsop_date,
            open: raw.stck_oprc,
            high: raw.stck_hgpr,
            low: raw.stck_lwpr,
            close: raw.stck_clpr,
            volume: raw.acml_vol,
        }
    }
}

/// # Summary
/// KIS 风格 REST 行情源实现。
///
/// # Invariants
/// - 瞬时故障 (网络、超时、限流) 在 `RetryPolicy` 预算内重试。
/// - 鉴权失败只强制刷新一次令牌并重试一次，第二次失败直接返回。
/// - 业务错误与解析错误不重试。
pub struct KisQuoteSource {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl KisQuoteSource {
    pub fn new(
        config: &ProviderConfig,
        tokens: Arc<dyn TokenProvider>,
        retry: RetryPolicy,
    ) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            tokens,
            retry,
        })
    }

    /// # Summary
    /// 带鉴权重试规则的查询入口。
    ///
    /// # Logic
    /// 1. 取令牌，在重试策略下发起请求。
    /// 2. 若返回鉴权失败，强制刷新令牌后再完整执行一次；仍失败则返回错误。
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, MarketError> {
        let token = self.tokens.access_token().await?;
        match self.call(&token, path, tr_id, params).await {
            Err(MarketError::Unauthorized(reason)) => {
                warn!(tr_id, %reason, "credential rejected, refreshing token once");
                let token = self.tokens.refresh().await?;
                self.call(&token, path, tr_id, params).await
            }
            other => other,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        tr_id: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, MarketError> {
        self.retry
            .run(tr_id, MarketError::is_transient, || {
                self.call_once(token, path, tr_id, params)
            })
            .await
    }

    /// # Summary
    /// 单次 HTTP 调用与响应解码。
    ///
    /// # Logic
    /// 1. 携带 Bearer 令牌、应用凭证、`tr_id` 与 `custtype` 头发起 GET。
    /// 2. 优先按响应体中的业务码分类 (鉴权码在任何状态码下都视为鉴权失败)。
    /// 3. 非 2xx 再按状态码分类。
    /// 4. `rt_cd != "0"` 视为业务错误。
    async fn call_once<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        tr_id: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, MarketError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .header("appkey", &self.app_key)
            .header("appsecret", &self.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        let envelope = serde_json::from_str::<Envelope<T>>(&body);

        if !status.is_success() {
            let by_code = envelope
                .ok()
                .map(|env| provider_error(&env.msg_cd, &env.msg1))
                .filter(|e| matches!(e, MarketError::Unauthorized(_) | MarketError::Throttled(_)));
            return Err(by_code.unwrap_or_else(|| status_error(status, &body)));
        }

        let envelope = envelope.map_err(|e| MarketError::Parse(format!("{}: {}", tr_id, e)))?;
        if envelope.rt_cd != "0" {
            return Err(provider_error(&envelope.msg_cd, &envelope.msg1));
        }
        debug!(tr_id, rows = envelope.output2.len(), "quote response decoded");
        Ok(envelope.output2)
    }
}

#[async_trait]
impl QuoteSource for KisQuoteSource {
    async fn minute_rows(&self, instrument: &Instrument) -> Result<Vec<MinuteRow>, MarketError> {
        info!(instrument = %instrument, "requesting minute candles");
        let params = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", instrument.code.clone()),
            ("fid_period_div_code", "1".to_string()),
            ("fid_org_adj_prc", "0".to_string()),
        ];
        let raw: Vec<RawMinute> = self.fetch(MINUTE_PATH, MINUTE_TR_ID, &params).await?;
        // 无数据时数据源可能返回一个全空字段的占位行
        Ok(raw
            .into_iter()
            .filter(|r| !r.stck_bsop_date.is_empty())
            .map(MinuteRow::from)
            .collect())
    }

    async fn daily_rows(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRow>, MarketError> {
        info!(instrument = %instrument, %start, %end, "requesting daily candles");
        let params = [
            ("fid_cond_mrkt_div_code", "J".to_string()),
            ("fid_input_iscd", instrument.code.clone()),
            ("fid_input_date_1", start.format("%Y%m%d").to_string()),
            ("fid_input_date_2", end.format("%Y%m%d").to_string()),
            ("fid_period_div_code", "D".to_string()),
            ("fid_org_adj_prc", "0".to_string()),
        ];
        let raw: Vec<RawDaily> = self.fetch(DAILY_PATH, DAILY_TR_ID, &params).await?;
        Ok(raw
            .into_iter()
            .filter(|r| !r.stck_bsop_date.is_empty())
            .map(DailyRow::from)
            .collect())
    }
}
