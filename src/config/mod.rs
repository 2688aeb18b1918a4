// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 上传进度持久化配置
    #[serde(default)]
    pub progress: ProgressConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传配置
///
/// 阈值默认值来自百度网盘的接口限制，换用其他服务时应按对方限制调整
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片大小（字节），文件不超过该大小时整文件一次上传
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 秒传阈值（字节），超过该大小才进行秒传探测
    #[serde(default = "default_rapid_upload_threshold")]
    pub rapid_upload_threshold: u64,
    /// 秒传校验段大小（字节），即 slice_md5 覆盖的文件前缀长度
    #[serde(default = "default_slice_size")]
    pub slice_size: u64,
    /// 最大同时上传文件数
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// 上传文件夹时是否跳过隐藏文件（以.开头的文件/文件夹）
    #[serde(default)]
    pub skip_hidden_files: bool,
    /// 上传服务器（由服务器选择逻辑预先确定；None 时由传输服务自行决定）
    #[serde(default)]
    pub upload_server: Option<String>,
}

fn default_chunk_size() -> u64 {
    4 * 1024 * 1024
}

fn default_rapid_upload_threshold() -> u64 {
    1024 * 1024
}

fn default_slice_size() -> u64 {
    256 * 1024
}

fn default_max_concurrent_tasks() -> usize {
    5
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            rapid_upload_threshold: default_rapid_upload_threshold(),
            slice_size: default_slice_size(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            skip_hidden_files: false,
            upload_server: None,
        }
    }
}

impl UploadConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("分片大小必须大于 0".to_string());
        }
        if self.slice_size == 0 {
            return Err("秒传校验段大小必须大于 0".to_string());
        }
        if self.max_concurrent_tasks == 0 {
            return Err("最大同时上传文件数至少为 1".to_string());
        }
        Ok(())
    }
}

/// 上传进度持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// 进度表文件路径（默认位于系统临时目录）
    #[serde(default = "default_progress_path")]
    pub path: PathBuf,
    /// 进度记录保留时长（小时），超时的记录不再用于续传
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_progress_path() -> PathBuf {
    std::env::temp_dir()
        .join("baidu-pan-uploader")
        .join("upload-progress.json")
}

fn default_retention_hours() -> u64 {
    24
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            path: default_progress_path(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl ProgressConfig {
    /// 保留时长
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

impl AppConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        self.upload.validate()?;
        if self.progress.retention_hours == 0 {
            return Err("进度记录保留时长必须大于 0".to_string());
        }
        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("配置校验失败: {}", e))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("保存配置失败: {}", e))?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }
}
