//! JSON ファイルのカーソルストア

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScraperError;
use crate::traits::CursorStore;

use super::types::CursorMap;

/// `{ "<端末ID>": <最後のチケット番号> }` 形式の JSON ファイル
pub struct JsonCursorStore {
    path: PathBuf,
}

impl JsonCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStore for JsonCursorStore {
    async fn load(&self) -> Result<CursorMap, ScraperError> {
        let raw = tokio::fs::read(&self.path).await?;
        let cursors: CursorMap = serde_json::from_slice(&raw)?;
        debug!("Loaded {} device cursors from {:?}", cursors.len(), self.path);
        Ok(cursors)
    }

    async fn save(&self, cursors: &CursorMap) -> Result<(), ScraperError> {
        let json = serde_json::to_string_pretty(cursors)?;

        // 一時ファイルに書いてから置き換える (途中で落ちても元ファイルは壊れない)
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
