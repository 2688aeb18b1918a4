// 上传引擎
//
// 对外入口。单个文件的上传流程：
// 1. 读取文件元数据，拒绝空文件
// 2. 计算完整文件 MD5
// 3. 登记进行中的上传（同一内容同时只允许一个会话）
// 4. 查询/创建上传进度，必要时补算 slice_md5
// 5. 交给 TransferSession 执行秒传探测、预创建、分片上传、创建文件
//
// 引擎内部不做重试：失败后由调用方重新调用 upload，已确认的分片不会重传。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::folder::{FolderScanner, ScanOptions, ScannedFile};
use super::hasher;
use super::session::{TransferSession, UploadReport};
use crate::config::{AppConfig, UploadConfig};
use crate::error::UploadError;
use crate::persistence::{ProgressError, ProgressStore};
use crate::remote::RemoteTransferService;

/// 批量上传的单个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 网盘目标目录
    pub destination: String,
    /// 网盘上显示的文件名（None 时使用本地文件名）
    pub display_name: Option<String>,
}

impl UploadItem {
    pub fn new(local_path: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            destination: destination.into(),
            display_name: None,
        }
    }
}

/// 文件夹上传中单个文件的结果
#[derive(Debug)]
pub struct FolderUploadEntry {
    pub file: ScannedFile,
    pub result: Result<UploadReport, UploadError>,
}

/// 上传引擎
pub struct UploadEngine {
    remote: Arc<dyn RemoteTransferService>,
    store: Arc<ProgressStore>,
    config: UploadConfig,
    /// 进行中的上传（content_md5 -> 本地路径）
    in_flight: DashMap<String, PathBuf>,
}

/// 进行中登记，释放时自动移除
struct InFlightGuard<'a> {
    map: &'a DashMap<String, PathBuf>,
    content_md5: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.content_md5);
    }
}

impl UploadEngine {
    pub fn new(
        remote: Arc<dyn RemoteTransferService>,
        store: Arc<ProgressStore>,
        config: UploadConfig,
    ) -> Self {
        info!(
            "创建上传引擎: 分片大小={}, 秒传阈值={}, 最大同时上传={}, 上传服务器={:?}",
            config.chunk_size,
            config.rapid_upload_threshold,
            config.max_concurrent_tasks,
            config.upload_server
        );
        Self {
            remote,
            store,
            config,
            in_flight: DashMap::new(),
        }
    }

    /// 按应用配置打开进度表并创建引擎
    pub fn from_config(remote: Arc<dyn RemoteTransferService>, config: &AppConfig) -> Self {
        let store = ProgressStore::open(&config.progress.path, config.progress.retention());
        info!(
            "上传进度表: {:?}, 保留 {} 小时, 待续传 {} 个",
            store.path(),
            config.progress.retention_hours,
            store.len()
        );
        Self::new(remote, Arc::new(store), config.upload.clone())
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// 上传单个文件
    ///
    /// `destination` 为网盘目录；文件保存为 `destination/<display_name 或本地文件名>`
    pub async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        display_name: Option<&str>,
    ) -> Result<UploadReport, UploadError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| UploadError::local_io(local_path, e))?;

        if !metadata.is_file() {
            return Err(UploadError::local_io(
                local_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "不是普通文件"),
            ));
        }
        if metadata.len() == 0 {
            warn!("拒绝上传空文件: {:?}", local_path);
            return Err(UploadError::EmptyFile {
                path: local_path.to_path_buf(),
            });
        }

        let remote_path =
            resolve_remote_path(destination, local_path, display_name).ok_or_else(|| {
                UploadError::local_io(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "无法确定文件名"),
                )
            })?;

        let digest = hasher::digest_file(local_path)
            .await
            .map_err(|e| UploadError::local_io(local_path, e))?;

        let _guard = self.enter(local_path, &digest.content_md5)?;

        let progress = self
            .store
            .resume_or_create(&digest, local_path, &remote_path, &self.config)
            .await
            .map_err(|e| match e {
                ProgressError::Source(e) => UploadError::local_io(local_path, e),
                ProgressError::Persist(e) => UploadError::persist(local_path, e),
            })?;

        TransferSession::new(
            self.remote.as_ref(),
            &self.store,
            &self.config,
            local_path,
            progress,
        )
        .run()
        .await
    }

    /// 并发上传多个文件，结果顺序与输入一致
    ///
    /// 同时进行的上传数不超过 `max_concurrent_tasks`，单个文件失败不影响其他文件
    pub async fn upload_all(
        &self,
        items: Vec<UploadItem>,
    ) -> Vec<Result<UploadReport, UploadError>> {
        let limit = self.config.max_concurrent_tasks.max(1);
        info!("批量上传: {} 个文件, 并发={}", items.len(), limit);

        stream::iter(items)
            .map(|item| async move {
                self.upload(
                    &item.local_path,
                    &item.destination,
                    item.display_name.as_deref(),
                )
                .await
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// 上传整个文件夹，保留目录结构
    pub async fn upload_folder(
        &self,
        local_dir: &Path,
        remote_dir: &str,
    ) -> anyhow::Result<Vec<FolderUploadEntry>> {
        let scanner = FolderScanner::with_options(ScanOptions {
            skip_hidden: self.config.skip_hidden_files,
            ..Default::default()
        });
        let scan_root = local_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || scanner.scan(&scan_root)).await??;

        let items = files
            .iter()
            .map(|f| UploadItem::new(f.local_path.clone(), f.remote_dir(remote_dir)))
            .collect();
        let results = self.upload_all(items).await;

        let entries: Vec<FolderUploadEntry> = files
            .into_iter()
            .zip(results)
            .map(|(file, result)| FolderUploadEntry { file, result })
            .collect();

        let failed = entries.iter().filter(|e| e.result.is_err()).count();
        let rapid = entries
            .iter()
            .filter(|e| matches!(&e.result, Ok(report) if report.rapid))
            .count();
        info!(
            "文件夹上传结束: {:?} -> {}, 共 {} 个文件, 秒传 {}, 失败 {}",
            local_dir,
            remote_dir,
            entries.len(),
            rapid,
            failed
        );

        Ok(entries)
    }

    fn enter(&self, local_path: &Path, content_md5: &str) -> Result<InFlightGuard<'_>, UploadError> {
        match self.in_flight.entry(content_md5.to_string()) {
            Entry::Occupied(existing) => {
                warn!(
                    "相同内容的文件正在上传: {:?} (进行中: {:?}), md5={}",
                    local_path,
                    existing.get(),
                    content_md5
                );
                Err(UploadError::InProgress {
                    path: local_path.to_path_buf(),
                    content_md5: content_md5.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(local_path.to_path_buf());
                debug!("登记进行中的上传: md5={}", content_md5);
                Ok(InFlightGuard {
                    map: &self.in_flight,
                    content_md5: content_md5.to_string(),
                })
            }
        }
    }
}

/// 计算网盘文件路径
///
/// - `destination` 视为目录，末尾的 `/` 会被去掉，缺少开头的 `/` 时补上
/// - 文件名取 `display_name`，为空时取本地文件名，总是追加在 `destination` 之后
pub fn resolve_remote_path(
    destination: &str,
    local_path: &Path,
    display_name: Option<&str>,
) -> Option<String> {
    let name = match display_name.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => local_path.file_name()?.to_string_lossy().into_owned(),
    };

    let dir = destination.trim_end_matches('/');
    let dir = if dir.is_empty() || dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("/{}", dir)
    };

    Some(format!("{}/{}", dir, name))
}
