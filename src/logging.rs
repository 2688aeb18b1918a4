//! 日志系统配置
//!
//! 控制台输出 + 可选的文件持久化。日志文件按大小滚动，启动时清理过期文件。

use crate::config::LogConfig;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "pan-uploader.";

/// 日志文件扩展名
const LOG_FILE_SUFFIX: &str = ".log";

/// 日志时间格式
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 滚动日志文件的内部状态
struct RollingFile {
    /// 启动时间戳（YYYY-MM-DD-HHMMSS），同一次运行的文件共享
    started_at: String,
    log_dir: PathBuf,
    file: Option<File>,
    /// 0 为首个文件，之后每滚动一次加 1
    index: u32,
    max_file_size: u64,
    written: u64,
}

impl RollingFile {
    fn open(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let mut rolling = Self {
            started_at: Local::now().format("%Y-%m-%d-%H%M%S").to_string(),
            log_dir,
            file: None,
            index: 0,
            max_file_size,
            written: 0,
        };
        rolling.open_current()?;
        Ok(rolling)
    }

    fn current_path(&self) -> PathBuf {
        let name = match self.index {
            0 => format!("{}{}{}", LOG_FILE_PREFIX, self.started_at, LOG_FILE_SUFFIX),
            n => format!(
                "{}{}_{}{}",
                LOG_FILE_PREFIX, self.started_at, n, LOG_FILE_SUFFIX
            ),
        };
        self.log_dir.join(name)
    }

    fn open_current(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.file = Some(file);
        self.written = 0;
        Ok(())
    }

    fn write_buf(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 当前文件已有内容且写入后超限时滚动
        if self.written > 0 && self.written + buf.len() as u64 > self.max_file_size {
            if let Some(mut file) = self.file.take() {
                file.flush()?;
            }
            self.index += 1;
            self.open_current()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件未打开"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// 日志文件管理器
///
/// 实现 `Write`，作为 `tracing_appender::non_blocking` 的输出目标
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<RollingFile>>,
}

impl LogFileManager {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFile::open(log_dir, max_file_size)?)),
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, RollingFile>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "日志文件锁已损坏"))
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write_buf(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

/// 日志系统守卫
/// 必须保持存活，否则后台写入线程会退出
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// 文件输出初始化失败时回退到仅控制台输出。
/// 全局订阅器已存在时（例如测试中重复初始化）静默忽略。
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_ansi(true);

    let file_manager = if config.enabled {
        match fs::create_dir_all(&config.log_dir)
            .and_then(|_| LogFileManager::new(config.log_dir.clone(), config.max_file_size))
        {
            Ok(manager) => Some(manager),
            Err(e) => {
                eprintln!(
                    "初始化日志文件失败: {:?}, 错误: {}，回退到仅控制台输出",
                    config.log_dir, e
                );
                None
            }
        }
    } else {
        None
    };

    let Some(file_manager) = file_manager else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init();
        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_manager);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
        config.log_dir,
        config.retention_days,
        config.level,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    cleanup_old_logs(&config.log_dir, config.retention_days);

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 清理过期日志文件，返回删除数量
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> usize {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut deleted = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };

        let expired = match log_file_date(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None if is_log_file(filename) => modified_before(&entry, retention),
            None => continue,
        };

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    tracing::debug!("已删除过期日志文件: {:?}", path);
                }
                Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
            }
        }
    }

    if deleted > 0 {
        info!("已清理 {} 个过期日志文件", deleted);
    }

    deleted
}

fn is_log_file(filename: &str) -> bool {
    filename.starts_with(LOG_FILE_PREFIX) && filename.ends_with(LOG_FILE_SUFFIX)
}

/// 从文件名中提取日期
///
/// - pan-uploader.YYYY-MM-DD-HHMMSS.log
/// - pan-uploader.YYYY-MM-DD-HHMMSS_N.log
fn log_file_date(filename: &str) -> Option<chrono::NaiveDate> {
    let stem = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    let date = stem.get(..10)?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn modified_before(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            chrono::Utc::now().signed_duration_since(modified) > retention
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("pan-uploader.2026-01-02-030405.log"),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 2)
        );
        assert_eq!(
            log_file_date("pan-uploader.2026-01-02-030405_3.log"),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 2)
        );
        assert_eq!(log_file_date("other.2026-01-02.log"), None);
        assert_eq!(log_file_date("pan-uploader.garbage.log"), None);
    }

    #[test]
    fn test_rotation_by_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = LogFileManager::new(temp_dir.path().to_path_buf(), 16).unwrap();

        manager.write_all(b"0123456789").unwrap();
        manager.write_all(b"0123456789").unwrap();
        manager.write_all(b"0123456789").unwrap();
        manager.flush().unwrap();

        let count = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        fs::write(dir.join("pan-uploader.2000-01-01-000000.log"), "old").unwrap();
        fs::write(dir.join("pan-uploader.2000-01-01-000000_1.log"), "old").unwrap();
        let today = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        fs::write(dir.join(format!("pan-uploader.{}.log", today)), "new").unwrap();
        fs::write(dir.join("unrelated.txt"), "keep").unwrap();

        assert_eq!(cleanup_old_logs(dir, 7), 2);
        assert_eq!(fs::read_dir(dir).unwrap().count(), 2);
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
    }
}
