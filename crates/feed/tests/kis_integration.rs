use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use kline_core::auth::port::TokenProvider;
use kline_core::common::Instrument;
use kline_core::common::time::FakeClockProvider;
use kline_core::config::ProviderConfig;
use kline_core::market::error::MarketError;
use kline_core::market::port::QuoteSource;
use kline_core::retry::RetryPolicy;
use kline_feed::auth::KisTokenManager;
use kline_feed::install_crypto_provider;
use kline_feed::kis::KisQuoteSource;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const MINUTE_OK: &str = r#"{
    "rt_cd": "0", "msg_cd": "MCA00000", "msg1": "ok",
    "output1": {"stck_prpr": "71200"},
    "output2": [
        {"stck_bsop_date": "20261019", "stck_cntg_hour": "093200", "stck_oprc": "71100",
         "stck_hgpr": "71300", "stck_lwpr": "71000", "stck_prpr": "71200", "cntg_vol": "1500"},
        {"stck_bsop_date": "20261019", "stck_cntg_hour": "093100", "stck_oprc": "71000",
         "stck_hgpr": "71150", "stck_lwpr": "70900", "stck_prpr": "71100", "cntg_vol": "900"},
        {}
    ]
}"#;

const EXPIRED_TOKEN: &str =
    r#"{"rt_cd": "1", "msg_cd": "EGW00123", "msg1": "기간이 만료된 token 입니다."}"#;

/// 行情桩服务的共享状态
#[derive(Clone, Default)]
struct Stub {
    token_calls: Arc<AtomicU32>,
    quote_calls: Arc<AtomicU32>,
    // 令牌接口的人为延迟 (毫秒)
    token_delay_ms: Arc<AtomicU64>,
    // 按顺序消费的行情响应，耗尽后返回 `ok_body`
    script: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    ok_body: Arc<Mutex<String>>,
    seen_auth: Arc<Mutex<Vec<String>>>,
    seen_tr_id: Arc<Mutex<Vec<String>>>,
    seen_query: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl Stub {
    fn with_body(body: &str) -> Self {
        let stub = Stub::default();
        *stub.ok_body.lock().unwrap() = body.to_string();
        stub
    }

    fn script(&self, responses: Vec<(StatusCode, &str)>) {
        let mut script = self.script.lock().unwrap();
        for (status, body) in responses {
            script.push_back((status, body.to_string()));
        }
    }
}

async fn issue_token(State(stub): State<Stub>) -> (StatusCode, String) {
    let n = stub.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = stub.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    (
        StatusCode::OK,
        format!(
            r#"{{"access_token": "tok-{}", "token_type": "Bearer", "expires_in": 86400}}"#,
            n
        ),
    )
}

async fn quotes(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    stub.quote_calls.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    stub.seen_auth.lock().unwrap().push(header("authorization"));
    stub.seen_tr_id.lock().unwrap().push(header("tr_id"));
    stub.seen_query.lock().unwrap().push(query);

    if let Some(scripted) = stub.script.lock().unwrap().pop_front() {
        return scripted;
    }
    (StatusCode::OK, stub.ok_body.lock().unwrap().clone())
}

async fn spawn_stub(stub: Stub) -> String {
    let router = Router::new()
        .route("/oauth2/tokenP", post(issue_token))
        .route(
            "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
            get(quotes),
        )
        .route(
            "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
            get(quotes),
        )
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

fn provider_config(base_url: &str, cache: Option<&std::path::Path>) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        app_key: "key".into(),
        app_secret: "secret".into(),
        timeout_secs: 5,
        token_ttl_hours: 23,
        token_cache_path: cache.map(|p| p.to_string_lossy().into_owned()),
        token_lock_wait_ms: 2_000,
    }
}

async fn source(stub: Stub, retry: RetryPolicy) -> KisQuoteSource {
    install_crypto_provider();
    let base_url = spawn_stub(stub).await;
    let config = provider_config(&base_url, None);
    let tokens = Arc::new(KisTokenManager::new(&config, RetryPolicy::no_retry()).unwrap());
    KisQuoteSource::new(&config, tokens, retry).unwrap()
}

fn samsung() -> Instrument {
    Instrument::new("005930")
}

#[tokio::test]
async fn test_minute_rows_are_mapped_and_token_reused() {
    let stub = Stub::with_body(MINUTE_OK);
    let feed = source(stub.clone(), RetryPolicy::no_retry()).await;

    let rows = feed.minute_rows(&samsung()).await.unwrap();
    assert_eq!(rows.len(), 2, "placeholder row must be dropped");
    assert_eq!(rows[0].time, "093200");
    assert_eq!(rows[0].close, "71200");
    assert_eq!(rows[1].volume, "900");

    feed.minute_rows(&samsung()).await.unwrap();
    assert_eq!(stub.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *stub.seen_tr_id.lock().unwrap(),
        vec!["FHKST03010200", "FHKST03010200"]
    );
    assert_eq!(stub.seen_auth.lock().unwrap()[0], "Bearer tok-1");
    let query = &stub.seen_query.lock().unwrap()[0];
    assert_eq!(query.get("fid_input_iscd").map(String::as_str), Some("005930"));
    assert_eq!(query.get("fid_period_div_code").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_empty_output_means_no_data() {
    let stub = Stub::with_body(r#"{"rt_cd": "0", "msg_cd": "MCA00000", "msg1": "ok", "output2": []}"#);
    let feed = source(stub.clone(), RetryPolicy::no_retry()).await;
    assert!(feed.minute_rows(&samsung()).await.unwrap().is_empty());

    *stub.ok_body.lock().unwrap() = r#"{"rt_cd": "0", "msg1": "ok"}"#.to_string();
    assert!(feed.minute_rows(&samsung()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_daily_rows_request_date_range() {
    let stub = Stub::with_body(
        r#"{"rt_cd": "0", "msg_cd": "MCA00000", "msg1": "ok", "output2": [
            {"stck_bsop_date": "20261019", "stck_oprc": "71000", "stck_hgpr": "72000",
             "stck_lwpr": "70500", "stck_clpr": "71800", "acml_vol": "15000000"}
        ]}"#,
    );
    let feed = source(stub.clone(), RetryPolicy::no_retry()).await;
    let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

    let rows = feed.daily_rows(&samsung(), day, day).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].close, "71800");
    assert_eq!(rows[0].volume, "15000000");

    assert_eq!(stub.seen_tr_id.lock().unwrap()[0], "FHKST03010100");
    let query = &stub.seen_query.lock().unwrap()[0];
    assert_eq!(query.get("fid_input_date_1").map(String::as_str), Some("20261019"));
    assert_eq!(query.get("fid_input_date_2").map(String::as_str), Some("20261019"));
    assert_eq!(query.get("fid_period_div_code").map(String::as_str), Some("D"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let stub = Stub::with_body(MINUTE_OK);
    // KIS 对过期令牌返回 500 + EGW00123
    stub.script(vec![(StatusCode::INTERNAL_SERVER_ERROR, EXPIRED_TOKEN)]);
    let feed = source(stub.clone(), RetryPolicy::fixed(3, Duration::ZERO)).await;

    let rows = feed.minute_rows(&samsung()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(stub.token_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *stub.seen_auth.lock().unwrap(),
        vec!["Bearer tok-1", "Bearer tok-2"]
    );
}

#[tokio::test]
async fn test_second_auth_failure_is_hard() {
    let stub = Stub::with_body(MINUTE_OK);
    stub.script(vec![
        (StatusCode::FORBIDDEN, ""),
        (StatusCode::FORBIDDEN, ""),
    ]);
    let feed = source(stub.clone(), RetryPolicy::fixed(3, Duration::ZERO)).await;

    let result = feed.minute_rows(&samsung()).await;
    assert!(matches!(result, Err(MarketError::Unauthorized(_))));
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stub.token_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let stub = Stub::with_body(MINUTE_OK);
    stub.script(vec![
        (StatusCode::BAD_GATEWAY, "upstream"),
        (
            StatusCode::OK,
            r#"{"rt_cd": "1", "msg_cd": "EGW00201", "msg1": "초당 거래건수를 초과하였습니다."}"#,
        ),
    ]);
    let feed = source(stub.clone(), RetryPolicy::fixed(3, Duration::ZERO)).await;

    assert_eq!(feed.minute_rows(&samsung()).await.unwrap().len(), 2);
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let stub = Stub::with_body(MINUTE_OK);
    stub.script(vec![(StatusCode::SERVICE_UNAVAILABLE, ""); 5]);
    let feed = source(stub.clone(), RetryPolicy::fixed(2, Duration::ZERO)).await;

    let result = feed.minute_rows(&samsung()).await;
    assert!(matches!(result, Err(MarketError::Network(_))));
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_provider_and_shape_errors_are_not_retried() {
    let stub = Stub::with_body(MINUTE_OK);
    stub.script(vec![(
        StatusCode::OK,
        r#"{"rt_cd": "1", "msg_cd": "OPSQ0002", "msg1": "없는 종목코드입니다."}"#,
    )]);
    let feed = source(stub.clone(), RetryPolicy::fixed(3, Duration::ZERO)).await;

    let result = feed.minute_rows(&samsung()).await;
    assert!(matches!(result, Err(MarketError::Provider { ref code, .. }) if code == "OPSQ0002"));
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 1);

    stub.script(vec![(StatusCode::OK, "<html>maintenance</html>")]);
    let result = feed.minute_rows(&samsung()).await;
    assert!(matches!(result, Err(MarketError::Parse(_))));
    assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_token_cache_file_survives_restart() -> anyhow::Result<()> {
    install_crypto_provider();
    let stub = Stub::default();
    let base_url = spawn_stub(stub.clone()).await;
    let dir = tempfile::tempdir()?;
    let cache = dir.path().join("auth").join("token.json");
    let config = provider_config(&base_url, Some(&cache));

    let first = KisTokenManager::new(&config, RetryPolicy::no_retry())?;
    assert_eq!(first.access_token().await?, "tok-1");
    assert!(cache.exists());

    // 模拟进程重启
    let second = KisTokenManager::new(&config, RetryPolicy::no_retry())?;
    assert_eq!(second.access_token().await?, "tok-1");
    assert_eq!(stub.token_calls.load(Ordering::SeqCst), 1);

    assert_eq!(second.refresh().await?, "tok-2");
    assert_eq!(second.access_token().await?, "tok-2");
    Ok(())
}

#[tokio::test]
async fn test_token_expires_after_ttl() -> anyhow::Result<()> {
    install_crypto_provider();
    let stub = Stub::default();
    let base_url = spawn_stub(stub.clone()).await;
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap(),
    ));
    let manager = KisTokenManager::new(&provider_config(&base_url, None), RetryPolicy::no_retry())?
        .with_clock(clock.clone());

    assert_eq!(manager.access_token().await?, "tok-1");
    clock.set_time(Utc.with_ymd_and_hms(2026, 10, 19, 22, 59, 0).unwrap());
    assert_eq!(manager.access_token().await?, "tok-1");
    clock.set_time(Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap() + ChronoDuration::hours(23));
    assert_eq!(manager.access_token().await?, "tok-2");
    Ok(())
}

#[tokio::test]
async fn test_lock_contention_falls_back_to_cached_token() -> anyhow::Result<()> {
    install_crypto_provider();
    let stub = Stub::default();
    let base_url = spawn_stub(stub.clone()).await;
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap(),
    ));
    let mut config = provider_config(&base_url, None);
    config.token_lock_wait_ms = 50;
    let manager = Arc::new(
        KisTokenManager::new(&config, RetryPolicy::no_retry())?.with_clock(clock.clone()),
    );

    // 尚无缓存：等待超时的一方只能报错
    stub.token_delay_ms.store(400, Ordering::SeqCst);
    let slow = tokio::spawn({
        let manager = manager.clone();
        async move { manager.access_token().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let contended = manager.access_token().await;
    assert!(matches!(contended, Err(MarketError::Timeout(_))));
    assert_eq!(slow.await??, "tok-1");

    // 令牌过期后再次竞争：等待超时的一方拿到旧令牌
    clock.set_time(Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
    let slow = tokio::spawn({
        let manager = manager.clone();
        async move { manager.access_token().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.access_token().await?, "tok-1");
    assert_eq!(slow.await??, "tok-2");
    Ok(())
}

#[tokio::test]
async fn test_refresh_under_contention_does_not_reuse_rejected_token() -> anyhow::Result<()> {
    install_crypto_provider();
    let stub = Stub::default();
    let base_url = spawn_stub(stub.clone()).await;
    let mut config = provider_config(&base_url, None);
    config.token_lock_wait_ms = 50;
    let manager = Arc::new(KisTokenManager::new(&config, RetryPolicy::no_retry())?);

    assert_eq!(manager.access_token().await?, "tok-1");

    // 另一方正在签发：强制刷新等待超时后报错，而不是交回 tok-1
    stub.token_delay_ms.store(400, Ordering::SeqCst);
    let slow = tokio::spawn({
        let manager = manager.clone();
        async move { manager.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let skipped = manager.refresh().await;
    assert!(matches!(skipped, Err(MarketError::Timeout(_))));
    assert_eq!(slow.await??, "tok-2");

    stub.token_delay_ms.store(0, Ordering::SeqCst);
    assert_eq!(manager.refresh().await?, "tok-3");
    assert_eq!(stub.token_calls.load(Ordering::SeqCst), 3);
    Ok(())
}
