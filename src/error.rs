use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("抽出エラー: {0}")]
    Extraction(String),

    #[error("不正なチケット番号: {0}")]
    InvalidCitation(String),

    #[error("データストアエラー: {0}")]
    Datastore(String),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("設定エラー: {0}")]
    Config(String),
}

impl ScraperError {
    /// ブラウザ再起動で回復しうるエラーか
    pub fn is_retryable(&self) -> bool {
        match self {
            ScraperError::BrowserInit(_)
            | ScraperError::Navigation(_)
            | ScraperError::JavaScript(_)
            | ScraperError::Timeout(_) => true,
            ScraperError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
