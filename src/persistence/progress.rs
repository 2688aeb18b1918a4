//! 上传进度表
//!
//! 所有进行中的上传共用一个 JSON 文件，键为文件内容 MD5。
//! 每次修改都整表重写（先写临时文件，再原子重命名），
//! 进度表只包含进行中的上传，体积很小。
//!
//! ## 并发
//!
//! 进度表由一把 `parking_lot::Mutex` 保护，"读-改-写盘" 全程持锁，
//! 不同会话更新不同记录时不会互相覆盖。不支持多进程共用同一个文件。

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::types::UploadProgress;
use crate::config::UploadConfig;
use crate::uploader::hasher::{self, FileDigest};

/// 上传进度表
#[derive(Debug)]
pub struct ProgressStore {
    /// 进度表文件路径
    path: PathBuf,
    /// 记录保留时长
    retention: Duration,
    /// 内存中的进度表（content_md5 -> 进度）
    table: Mutex<HashMap<String, UploadProgress>>,
}

/// 准备上传进度时的错误
///
/// 区分源文件读取失败与进度表写盘失败，两者的处理方式不同
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// 读取源文件（元数据、前缀哈希）失败
    #[error("读取源文件失败: {0}")]
    Source(#[source] io::Error),

    /// 进度表写盘失败
    #[error("保存上传进度失败: {0}")]
    Persist(#[source] io::Error),
}

/// 读取整个进度表
///
/// 文件不存在或无法解析时返回空表（不视为错误）
pub fn load(path: &Path) -> HashMap<String, UploadProgress> {
    if !path.exists() {
        debug!("进度表不存在，使用空表: {:?}", path);
        return HashMap::new();
    }

    let parsed = File::open(path).and_then(|file| {
        serde_json::from_reader::<_, HashMap<String, UploadProgress>>(BufReader::new(file))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    });

    match parsed {
        Ok(table) => {
            debug!("已加载进度表: {:?} ({} 条记录)", path, table.len());
            table
        }
        Err(e) => {
            warn!("进度表损坏或无法读取，使用空表: {:?}, 错误: {}", path, e);
            HashMap::new()
        }
    }
}

impl ProgressStore {
    /// 打开进度表，丢弃已过期的记录
    pub fn open(path: impl Into<PathBuf>, retention: Duration) -> Self {
        let path = path.into();
        let table = load(&path);
        let store = Self {
            path,
            retention,
            table: Mutex::new(table),
        };

        match store.purge_expired() {
            Ok(0) => {}
            Ok(n) => info!("已清理 {} 条过期上传进度", n),
            Err(e) => warn!("清理过期上传进度失败: {}", e),
        }

        store
    }

    /// 进度表文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 记录数量（包括尚未清理的过期记录）
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// 查询进度，不存在或已过期时返回 None
    pub fn get(&self, content_md5: &str) -> Option<UploadProgress> {
        let table = self.table.lock();
        let progress = table.get(content_md5)?;
        if progress.is_expired(self.retention) {
            debug!("上传进度已过期，忽略: md5={}", content_md5);
            return None;
        }
        Some(progress.clone())
    }

    /// 获取或创建本地文件的上传进度
    ///
    /// 计算文件 MD5 后查表；记录不存在、已过期、或目标路径/分片大小不一致时，
    /// 新建一条空记录并写盘。大文件在缺少 slice_md5 时补算。
    pub async fn get_or_create(
        &self,
        local_path: &Path,
        destination_path: &str,
        config: &UploadConfig,
    ) -> Result<UploadProgress, ProgressError> {
        let digest = hasher::digest_file(local_path)
            .await
            .map_err(ProgressError::Source)?;
        self.resume_or_create(&digest, local_path, destination_path, config)
            .await
    }

    /// 同 [`get_or_create`](Self::get_or_create)，使用已算好的文件摘要
    pub async fn resume_or_create(
        &self,
        digest: &FileDigest,
        local_path: &Path,
        destination_path: &str,
        config: &UploadConfig,
    ) -> Result<UploadProgress, ProgressError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(ProgressError::Source)?;
        let local_mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let (mut progress, mut dirty) = match self.get(&digest.content_md5) {
            Some(existing) if existing.matches(destination_path, config.chunk_size) => {
                info!(
                    "找到可续传的上传进度: md5={}, 已完成分片={}, session={}",
                    existing.content_md5,
                    existing.completed_chunks(),
                    existing.has_session()
                );
                (existing, false)
            }
            existing => {
                if let Some(other) = existing {
                    info!(
                        "上传进度与本次上传不符，重新创建: md5={}, 原目标={}, 原分片大小={}",
                        other.content_md5, other.destination_path, other.chunk_size
                    );
                }
                let fresh = UploadProgress::new(
                    digest.content_md5.clone(),
                    destination_path.to_string(),
                    local_mtime,
                    digest.file_size,
                    config.chunk_size,
                );
                (fresh, true)
            }
        };

        if progress.total_size > config.rapid_upload_threshold && progress.slice_md5.is_none() {
            let slice_md5 = hasher::digest_prefix(local_path, config.slice_size)
                .await
                .map_err(ProgressError::Source)?;
            progress.slice_md5 = Some(slice_md5);
            dirty = true;
        }

        if dirty {
            self.insert(progress.clone())
                .map_err(ProgressError::Persist)?;
        }

        Ok(progress)
    }

    /// 插入或替换整条记录并写盘
    pub fn insert(&self, progress: UploadProgress) -> io::Result<()> {
        let mut table = self.table.lock();
        let key = progress.content_md5.clone();
        let previous = table.insert(key.clone(), progress);

        if let Err(e) = self.persist(&table) {
            match previous {
                Some(previous) => table.insert(key, previous),
                None => table.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// 保存上传会话 ID
    pub fn record_session(&self, content_md5: &str, session_id: &str) -> io::Result<()> {
        self.update(content_md5, |p| p.session_id = session_id.to_string())?;
        debug!("已保存上传会话: md5={}, session={}", content_md5, session_id);
        Ok(())
    }

    /// 记录分片完成
    ///
    /// 返回成功时整张表已落盘，该分片才算完成
    pub fn record_chunk(&self, content_md5: &str, index: usize, chunk_md5: &str) -> io::Result<()> {
        self.update(content_md5, |p| p.set_chunk(index, chunk_md5.to_string()))?;
        debug!(
            "已记录分片: md5={}, part={}, chunk_md5={}",
            content_md5, index, chunk_md5
        );
        Ok(())
    }

    /// 删除记录，返回记录是否存在
    pub fn delete(&self, content_md5: &str) -> io::Result<bool> {
        let mut table = self.table.lock();
        let Some(previous) = table.remove(content_md5) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&table) {
            table.insert(content_md5.to_string(), previous);
            return Err(e);
        }
        debug!("已删除上传进度: md5={}", content_md5);
        Ok(true)
    }

    /// 清理过期记录，返回清理数量
    pub fn purge_expired(&self) -> io::Result<usize> {
        let mut table = self.table.lock();
        let before = table.len();
        let retention = self.retention;
        table.retain(|_, p| !p.is_expired(retention));
        let removed = before - table.len();

        if removed > 0 {
            self.persist(&table)?;
        }
        Ok(removed)
    }

    /// 修改一条记录并写盘，写盘失败时恢复原记录
    fn update<F>(&self, content_md5: &str, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut UploadProgress),
    {
        let mut table = self.table.lock();
        let entry = table.get_mut(content_md5).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("上传进度不存在: md5={}", content_md5),
            )
        })?;

        let previous = entry.clone();
        f(entry);
        entry.touch();

        if let Err(e) = self.persist(&table) {
            table.insert(content_md5.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    /// 整表写盘（临时文件 + 原子重命名）
    fn persist(&self, table: &HashMap<String, UploadProgress>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!("已创建进度表目录: {:?}", parent);
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        let sorted: BTreeMap<&String, &UploadProgress> = table.iter().collect();

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &sorted)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
