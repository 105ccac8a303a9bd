use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScraperError;

const DEFAULT_PORTAL_URL: &str = "https://ucsd-transportation.t2hosted.com/Account/Portal";
const DEFAULT_RESULTS_PATH: &str = "/Account/Citations/Results";
const DEFAULT_CURSOR_FILE: &str = "latest_citations.json";

/// Supabase 接続設定
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

/// Grafana Loki 接続設定
#[derive(Debug, Clone)]
pub struct LokiConfig {
    pub push_url: String,
    pub username: String,
    pub password: String,
    pub service: String,
    pub job: String,
}

impl LokiConfig {
    pub fn new(
        push_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            push_url: push_url.into(),
            username: username.into(),
            password: password.into(),
            service: "ucsd-ticket-scraper".to_string(),
            job: "scrape-new-citations".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub portal_url: String,
    pub results_path: String,
    pub cursor_path: PathBuf,
    pub headless: bool,
    /// Chrome 実行ファイル (未指定なら chromiumoxide の自動検出)
    pub chrome_path: Option<String>,
    /// デバッグモード (未分類の結果でスクリーンショットを出力)
    pub debug: bool,
    /// 検索フォームの表示待ち
    pub page_timeout: Duration,
    /// 結果判定チェック1つあたりの待ち時間
    pub check_timeout: Duration,
    /// 結果テーブルの表示待ち
    pub table_timeout: Duration,
    pub max_retries: u32,
    /// 端末ごとの待機時間
    pub device_delay: Duration,
    /// パス間の待機時間
    pub restart_interval: Duration,
    pub supabase: Option<SupabaseConfig>,
    pub loki: Option<LokiConfig>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            results_path: DEFAULT_RESULTS_PATH.to_string(),
            cursor_path: PathBuf::from(DEFAULT_CURSOR_FILE),
            headless: true,
            chrome_path: None,
            debug: false,
            page_timeout: Duration::from_secs(10),
            check_timeout: Duration::from_secs(3),
            table_timeout: Duration::from_secs(10),
            max_retries: 3,
            device_delay: Duration::from_millis(300),
            restart_interval: Duration::from_secs(1),
            supabase: None,
            loki: None,
        }
    }
}

impl ScraperConfig {
    pub fn new(supabase_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            supabase: Some(SupabaseConfig {
                url: supabase_url.into(),
                service_role_key: service_role_key.into(),
            }),
            ..Default::default()
        }
    }

    /// 環境変数から設定を読み込む
    ///
    /// Supabase の設定は必須、Loki は3つ全て揃っている場合のみ有効。
    pub fn from_env() -> Result<Self, ScraperError> {
        let default = Self::default();

        let supabase_url = required_env("SUPABASE_URL")?;
        let service_role_key = required_env("SUPABASE_SERVICE_ROLE_KEY")?;

        let loki = match (
            optional_env("GRAFANA_PUSH_URL"),
            optional_env("GRAFANA_USERNAME"),
            optional_env("GRAFANA_PASSWORD"),
        ) {
            (Some(url), Some(user), Some(pass)) => Some(LokiConfig::new(url, user, pass)),
            (None, None, None) => None,
            _ => {
                return Err(ScraperError::Config(
                    "GRAFANA_PUSH_URL, GRAFANA_USERNAME and GRAFANA_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        Ok(Self {
            portal_url: optional_env("PORTAL_URL").unwrap_or_else(|| default.portal_url.clone()),
            cursor_path: optional_env("CITATION_CURSOR_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| default.cursor_path.clone()),
            headless: parsed_env("HEADLESS")?.unwrap_or(default.headless),
            chrome_path: optional_env("CHROME_PATH").or_else(|| optional_env("CHROMIUM_PATH")),
            debug: parsed_env("SCRAPER_DEBUG")?.unwrap_or(default.debug),
            max_retries: parsed_env("MAX_RETRIES")?
                .map(check_max_retries)
                .transpose()?
                .unwrap_or(default.max_retries),
            device_delay: parsed_env("DEVICE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(default.device_delay),
            restart_interval: parsed_env("RESTART_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(default.restart_interval),
            supabase: Some(SupabaseConfig {
                url: supabase_url,
                service_role_key,
            }),
            loki,
            ..default
        })
    }

    pub fn with_cursor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cursor_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn with_table_timeout(mut self, timeout: Duration) -> Self {
        self.table_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_device_delay(mut self, delay: Duration) -> Self {
        self.device_delay = delay;
        self
    }

    pub fn with_loki(mut self, loki: LokiConfig) -> Self {
        self.loki = Some(loki);
        self
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required_env(key: &str) -> Result<String, ScraperError> {
    optional_env(key).ok_or_else(|| ScraperError::Config(format!("{} is not set", key)))
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ScraperError> {
    optional_env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ScraperError::Config(format!("{} has an invalid value: {}", key, v)))
        })
        .transpose()
}

/// 試行回数は1以上
fn check_max_retries(max_retries: u32) -> Result<u32, ScraperError> {
    if max_retries == 0 {
        return Err(ScraperError::Config(
            "MAX_RETRIES must be at least 1".to_string(),
        ));
    }
    Ok(max_retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_retries_must_be_positive() {
        assert!(matches!(check_max_retries(0), Err(ScraperError::Config(_))));
        assert_eq!(check_max_retries(1).unwrap(), 1);
        assert_eq!(check_max_retries(5).unwrap(), 5);
    }

    #[test]
    fn test_config_builder() {
        let config = ScraperConfig::new("https://example.supabase.co", "key")
            .with_headless(false)
            .with_cursor_path("/tmp/cursors.json")
            .with_max_retries(5)
            .with_device_delay(Duration::ZERO);

        assert!(!config.headless);
        assert_eq!(config.cursor_path, PathBuf::from("/tmp/cursors.json"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.device_delay, Duration::ZERO);
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://example.supabase.co");
        assert_eq!(supabase.service_role_key, "key");
    }

    #[test]
    fn test_defaults() {
        let config = ScraperConfig::default();
        assert_eq!(config.portal_url, DEFAULT_PORTAL_URL);
        assert_eq!(config.results_path, "/Account/Citations/Results");
        assert_eq!(config.check_timeout, Duration::from_secs(3));
        assert_eq!(config.max_retries, 3);
        assert!(config.loki.is_none());
    }

    #[test]
    fn test_loki_labels() {
        let loki = LokiConfig::new("https://logs.example/loki/api/v1/push", "u", "p");
        assert_eq!(loki.service, "ucsd-ticket-scraper");
        assert_eq!(loki.job, "scrape-new-citations");
    }
}
