use config::{Config, Environment, File};
use kline_core::config::AppConfig;
use std::path::Path;

/// 默认配置文件 (不存在时忽略)
pub const DEFAULT_CONFIG_FILE: &str = "config/kline";
/// 环境变量前缀，层级以 `__` 分隔，例如 `KLINE__PROVIDER__APP_KEY`
pub const ENV_PREFIX: &str = "KLINE";

/// # Summary
/// 分层加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 作为底层。
/// 2. 叠加配置文件：显式路径必须存在，默认路径可缺省。
/// 3. 叠加 `KLINE__*` 环境变量；测试时可传入 `env` 代替进程环境。
///
/// # Returns
/// 合并后的配置，不做业务校验 (见 `AppConfig::validate`)。
pub fn load(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<AppConfig, config::ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .source(env),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = load(Some(Path::new("/nonexistent/kline.toml")), None);
        assert!(config.is_err(), "explicit path must exist");

        let config = load(None, Some(env(&[]))).unwrap();
        assert_eq!(config.instrument.code, "005930");
        assert_eq!(config.store.batch_size, 25);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.schedule.daily_hour, 16);
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kline.toml");
        std::fs::write(
            &path,
            r#"
            [instrument]
            code = "000660"
            name = "SK hynix"

            [store]
            batch_size = 10
            batch_pause_ms = 0

            [retry]
            max_retries = 5
            delay = 250

            [market]
            close = "15:20:00"
            "#,
        )
        .unwrap();

        let config = load(
            Some(&path),
            Some(env(&[
                ("KLINE__PROVIDER__APP_KEY", "key-from-env"),
                ("KLINE__PROVIDER__APP_SECRET", "secret-from-env"),
                ("KLINE__STORE__BATCH_SIZE", "20"),
            ])),
        )
        .unwrap();

        assert_eq!(config.instrument.code, "000660");
        assert_eq!(config.instrument.name.as_deref(), Some("SK hynix"));
        assert_eq!(config.provider.app_key, "key-from-env");
        assert_eq!(config.store.batch_size, 20);
        assert_eq!(config.store.table_name, "stock_candles");
        assert_eq!(config.retry.delay, Duration::from_millis(250));
        assert_eq!(config.market.close.to_string(), "15:20:00");
        assert_eq!(config.market.utc_offset_hours, 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_looking_code_keeps_leading_zeros() {
        let config = load(None, Some(env(&[("KLINE__INSTRUMENT__CODE", "035720")]))).unwrap();
        assert_eq!(config.instrument.code, "035720");
    }
}
