// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::models::product::ResultEnvelope;
use crate::domain::repositories::record_repository::{MediaKind, RecordRepository};
use crate::utils::errors::RepositoryError;

#[derive(Serialize)]
struct RecordLine<'a> {
    id: i64,
    #[serde(flatten)]
    envelope: &'a ResultEnvelope,
}

#[derive(Serialize)]
struct MediaLine<'a> {
    record_id: i64,
    kind: &'static str,
    path: &'a str,
    original_url: &'a str,
}

/// JSON Lines结果记录库
///
/// 每条记录一行追加到记录文件，媒体文件登记写到同名的
/// `.media.jsonl` 伴随文件
pub struct JsonlRecordStore {
    path: PathBuf,
    media_path: PathBuf,
    next_id: AtomicI64,
    lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let media_path = path.with_extension("media.jsonl");
        // 接着已有文件的行号继续编号
        let existing = std::fs::read_to_string(&path)
            .map(|content| content.lines().count() as i64)
            .unwrap_or(0);

        Self {
            path,
            media_path,
            next_id: AtomicI64::new(existing + 1),
            lock: Mutex::new(()),
        }
    }

    async fn append_line(path: &Path, line: String) -> Result<(), RepositoryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for JsonlRecordStore {
    async fn save_record(&self, envelope: ResultEnvelope) -> Result<i64, RepositoryError> {
        let _guard = self.lock.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&RecordLine {
            id,
            envelope: &envelope,
        })?;
        Self::append_line(&self.path, line).await?;
        Ok(id)
    }

    async fn save_media_file(
        &self,
        record_id: i64,
        kind: MediaKind,
        path: &str,
        original_url: &str,
    ) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let line = serde_json::to_string(&MediaLine {
            record_id,
            kind: kind.as_str(),
            path,
            original_url,
        })?;
        Self::append_line(&self.media_path, line).await?;
        Ok(())
    }
}
