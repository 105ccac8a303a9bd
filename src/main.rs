//! 駐車違反チケット巡回スクレイパー
//!
//! 実行方法:
//! ```
//! cargo run --bin citation-scraper
//! ```
//!
//! 必要な環境変数は `.env` からも読み込む (SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY)。

use std::sync::Arc;

use citation_scraper::traits::LogSink;
use citation_scraper::{
    ChromeLauncher, DeviceScanner, JsonCursorStore, LokiSink, ScraperConfig, SupabaseStore,
    Supervisor, Telemetry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envがあれば読み込む
    dotenv::dotenv().ok();

    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,citation_scraper=debug")),
        )
        .init();

    let config = ScraperConfig::from_env()?;

    let sink = match config.loki.clone() {
        Some(loki) => Some(Arc::new(LokiSink::spawn(loki)?) as Arc<dyn LogSink>),
        None => {
            info!("Grafana Loki not configured, logging locally only");
            None
        }
    };
    let telemetry = Telemetry::new(sink);

    let supabase = config
        .supabase
        .as_ref()
        .ok_or("SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY not set")?;
    let datastore = Arc::new(SupabaseStore::new(supabase)?);

    let cursors = JsonCursorStore::new(config.cursor_path.clone());
    info!("Using cursor file {:?}", cursors.path());

    let scanner = DeviceScanner::new(&config, datastore, Arc::new(cursors), telemetry.clone());
    let launcher = Arc::new(ChromeLauncher::new(config.clone(), telemetry.clone()));
    let mut supervisor = Supervisor::new(&config, launcher, scanner, telemetry);

    tokio::select! {
        _ = supervisor.run_forever() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                info!("Failed to listen for shutdown signal: {}", e);
            }
        }
    }

    supervisor.shutdown().await;
    Ok(())
}
