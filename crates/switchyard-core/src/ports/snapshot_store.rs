//! SnapshotStore port - registry の永続化（オプション）
//!
//! Registry 自体はメモリ上にあり、snapshot は「再起動後に handle を引き継ぐ」ためだけに使う。
//! 書き込みは丸ごと置き換え（append-only ではない）。
//!
//! # 実装
//! - JsonFileSnapshotStore: JSON ファイル 1 つに保存
//! - MemorySnapshotStore: テスト用

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::RegistryRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub records: Vec<RegistryRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), SnapshotError>;

    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<RegistrySnapshot>, SnapshotError>;
}

pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        // 途中で落ちても壊れたファイルを残さないよう、tmp に書いてから rename
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<RegistrySnapshot>, SnapshotError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Option<RegistrySnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), SnapshotError> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<RegistrySnapshot>, SnapshotError> {
        Ok(self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
