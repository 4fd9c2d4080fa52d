// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::settings::StorageSettings;
use crate::domain::models::page::PageArtifact;
use crate::domain::repositories::storage_repository::{
    artifact_file_name, ArtifactSink, OnExisting, StorageError, WriteReceipt,
};

/// 本地文件系统产物存储
///
/// 先写同目录下的唯一临时文件并 fsync，再 rename 覆盖目标文件，
/// 读者只会看到旧产物或完整的新产物。同一进程内同一页的写入串行执行，
/// 跨进程依赖 rename 的原子性（后写者胜出）。
pub struct LocalArtifactSink {
    base_path: PathBuf,
    on_existing: OnExisting,
    page_locks: DashMap<u32, Arc<Mutex<()>>>,
}

impl LocalArtifactSink {
    pub fn new(base_path: impl Into<PathBuf>, on_existing: OnExisting) -> Self {
        Self {
            base_path: base_path.into(),
            on_existing,
            page_locks: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(&settings.output_dir, settings.on_existing)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, page: u32) -> PathBuf {
        self.base_path.join(artifact_file_name(page))
    }

    fn page_lock(&self, page: u32) -> Arc<Mutex<()>> {
        self.page_locks
            .entry(page)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn write_atomically(&self, target: &Path, data: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path).await?;

        let temp_path = self.base_path.join(format!(
            ".{}.{}.tmp",
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4()
        ));

        let written: std::io::Result<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, target).await
        }
        .await;

        if let Err(e) = written {
            // 临时文件可能不存在，忽略清理错误
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for LocalArtifactSink {
    async fn write(&self, artifact: &PageArtifact) -> Result<WriteReceipt, StorageError> {
        let lock = self.page_lock(artifact.page);
        let _guard = lock.lock().await;

        let target = self.path_for(artifact.page);
        let location = target.to_string_lossy().into_owned();

        if self.on_existing == OnExisting::Skip && fs::try_exists(&target).await? {
            return Ok(WriteReceipt {
                location,
                skipped: true,
            });
        }

        let data = serde_json::to_vec_pretty(artifact)?;
        self.write_atomically(&target, &data).await?;

        Ok(WriteReceipt {
            location,
            skipped: false,
        })
    }

    async fn read(&self, page: u32) -> Result<Option<PageArtifact>, StorageError> {
        match fs::read(self.path_for(page)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn location(&self, page: u32) -> String {
        self.path_for(page).to_string_lossy().into_owned()
    }
}

/// 内存产物存储，用于测试和不落盘的运行
pub struct InMemoryArtifactSink {
    artifacts: DashMap<u32, PageArtifact>,
    on_existing: OnExisting,
    writes: AtomicUsize,
}

impl InMemoryArtifactSink {
    pub fn new() -> Self {
        Self::with_policy(OnExisting::Overwrite)
    }

    pub fn with_policy(on_existing: OnExisting) -> Self {
        Self {
            artifacts: DashMap::new(),
            on_existing,
            writes: AtomicUsize::new(0),
        }
    }

    /// 实际发生的写入次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.artifacts.iter().map(|e| *e.key()).collect();
        pages.sort_unstable();
        pages
    }
}

impl Default for InMemoryArtifactSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactSink for InMemoryArtifactSink {
    async fn write(&self, artifact: &PageArtifact) -> Result<WriteReceipt, StorageError> {
        let location = self.location(artifact.page);
        match self.artifacts.entry(artifact.page) {
            dashmap::mapref::entry::Entry::Occupied(_) if self.on_existing == OnExisting::Skip => {
                Ok(WriteReceipt {
                    location,
                    skipped: true,
                })
            }
            entry => {
                entry.insert(artifact.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(WriteReceipt {
                    location,
                    skipped: false,
                })
            }
        }
    }

    async fn read(&self, page: u32) -> Result<Option<PageArtifact>, StorageError> {
        Ok(self.artifacts.get(&page).map(|a| a.value().clone()))
    }

    fn location(&self, page: u32) -> String {
        format!("memory://{}", artifact_file_name(page))
    }
}
