//! ログ出力
//!
//! 全てのイベントを tracing に出力し、設定されていれば Grafana Loki にも送信する

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::config::LokiConfig;
use crate::error::ScraperError;
use crate::traits::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// tracing とリモートシンクへの同時出力
#[derive(Clone, Default)]
pub struct Telemetry {
    sink: Option<Arc<dyn LogSink>>,
}

impl Telemetry {
    pub fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    /// tracing のみに出力
    pub fn local() -> Self {
        Self::default()
    }

    pub fn log(&self, level: LogLevel, message: &str, payload: Option<&Value>) {
        match (level, payload) {
            (LogLevel::Debug, _) => debug!(payload = ?payload, "{}", message),
            (LogLevel::Info, Some(p)) => info!(payload = %p, "{}", message),
            (LogLevel::Info, None) => info!("{}", message),
            (LogLevel::Warning, Some(p)) => warn!(payload = %p, "{}", message),
            (LogLevel::Warning, None) => warn!("{}", message),
            (LogLevel::Error, Some(p)) => error!(payload = %p, "{}", message),
            (LogLevel::Error, None) => error!("{}", message),
        }

        if let Some(sink) = &self.sink {
            sink.emit(level, message, payload);
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref(), None);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref(), None);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message.as_ref(), None);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref(), None);
    }
}

/// 送信待ちの上限。超えた分は捨てる
const LOKI_QUEUE_CAPACITY: usize = 1024;
const LOKI_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Grafana Loki への push
///
/// ログ行は有界キューに積み、1つの送信タスクが順に送る。
pub struct LokiSink {
    config: LokiConfig,
    queue: mpsc::Sender<Value>,
}

impl LokiSink {
    /// 送信タスクを起動する (tokio ランタイム内で呼ぶこと)
    pub fn spawn(config: LokiConfig) -> Result<Self, ScraperError> {
        let client = reqwest::Client::builder()
            .timeout(LOKI_PUSH_TIMEOUT)
            .build()?;
        let (queue, receiver) = mpsc::channel(LOKI_QUEUE_CAPACITY);
        tokio::spawn(push_loop(client, config.clone(), receiver));
        Ok(Self::with_queue(config, queue))
    }

    fn with_queue(config: LokiConfig, queue: mpsc::Sender<Value>) -> Self {
        Self { config, queue }
    }
}

impl LogSink for LokiSink {
    fn emit(&self, level: LogLevel, message: &str, payload: Option<&Value>) {
        let body = build_body(&self.config, level, message, payload);
        match self.queue.try_send(body) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Loki queue full, dropping log line"),
            Err(TrySendError::Closed(_)) => debug!("Loki pusher stopped, dropping log line"),
        }
    }
}

/// push API のリクエストボディを組み立てる
fn build_body(config: &LokiConfig, level: LogLevel, message: &str, payload: Option<&Value>) -> Value {
    let timestamp = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string();

    let mut values = vec![json!([timestamp, message])];
    if let Some(payload) = payload {
        values.push(json!([timestamp, payload.to_string()]));
    }

    json!({
        "streams": [{
            "stream": {
                "service": config.service,
                "job": config.job,
                "level": level.as_str(),
            },
            "values": values,
        }]
    })
}

/// キューが閉じるまで1件ずつ送信する
async fn push_loop(client: reqwest::Client, config: LokiConfig, mut receiver: mpsc::Receiver<Value>) {
    while let Some(body) = receiver.recv().await {
        let result = client
            .post(&config.push_url)
            .basic_auth(&config.username, Some(&config.password))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                warn!("Loki responded with status code {}: {}", status, text);
            }
            Err(e) => warn!("Failed to push logs to Loki: {}", e),
        }
    }
}
