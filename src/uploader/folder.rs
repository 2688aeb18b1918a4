//! 文件夹扫描
//!
//! 负责:
//! - 递归扫描本地文件夹
//! - 保留目录结构（相对路径 → 网盘路径）
//! - 过滤隐藏文件、超大文件、空文件

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 文件扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径（用于构建远程路径）
    pub relative_path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
}

impl ScannedFile {
    /// 网盘上的所在目录：`remote_root` + 相对路径的父目录（统一使用 `/`）
    pub fn remote_dir(&self, remote_root: &str) -> String {
        let mut dir = remote_root.trim_end_matches('/').to_string();
        if let Some(parent) = self.relative_path.parent() {
            for component in parent.components() {
                if let Component::Normal(part) = component {
                    dir.push('/');
                    dir.push_str(&part.to_string_lossy());
                }
            }
        }
        dir
    }

    /// 网盘上的完整路径
    pub fn remote_path(&self, remote_root: &str) -> String {
        match self.relative_path.file_name() {
            Some(name) => format!("{}/{}", self.remote_dir(remote_root), name.to_string_lossy()),
            None => self.remote_dir(remote_root),
        }
    }
}

/// 文件夹扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 最大文件大小（字节），超过此大小的文件将被跳过
    pub max_file_size: Option<u64>,
    /// 最大文件数量，超过此数量将停止扫描
    pub max_files: Option<usize>,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

/// 文件夹扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 递归扫描文件夹，结果按相对路径排序
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<ScannedFile>> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            anyhow::bail!("扫描路径不存在: {}", root_path.display());
        }
        if !root_path.is_dir() {
            anyhow::bail!("扫描路径不是文件夹: {}", root_path.display());
        }

        info!("开始扫描文件夹: {}", root_path.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && entry.depth() > 0 && is_hidden(entry)));

        let mut files = Vec::new();

        for entry in walker {
            let entry =
                entry.with_context(|| format!("读取目录失败: {}", root_path.display()))?;

            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("跳过非常规文件: {}", entry.path().display());
                }
                continue;
            }

            let size = entry
                .metadata()
                .with_context(|| format!("读取文件元数据失败: {}", entry.path().display()))?
                .len();

            if size == 0 {
                warn!("跳过空文件: {}", entry.path().display());
                continue;
            }

            if let Some(max_size) = self.options.max_file_size {
                if size > max_size {
                    warn!("跳过超大文件: {} ({})", entry.path().display(), format_bytes(size));
                    continue;
                }
            }

            let relative_path = entry
                .path()
                .strip_prefix(root_path)
                .with_context(|| {
                    format!(
                        "计算相对路径失败: {} (root: {})",
                        entry.path().display(),
                        root_path.display()
                    )
                })?
                .to_path_buf();

            debug!("扫描到文件: {} ({})", relative_path.display(), format_bytes(size));

            files.push(ScannedFile {
                local_path: entry.into_path(),
                relative_path,
                size,
            });

            if let Some(max_files) = self.options.max_files {
                if files.len() >= max_files {
                    warn!("已达到最大文件数量限制 ({}), 停止扫描", max_files);
                    break;
                }
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        info!(
            "文件夹扫描完成: {} 个文件，总大小 {}",
            files.len(),
            format_bytes(files.iter().map(|f| f.size).sum())
        );

        Ok(files)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// 格式化字节大小
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
