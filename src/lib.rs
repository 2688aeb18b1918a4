// Baidu Netdisk Uploader
// 百度网盘断点续传上传库

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 日志系统
pub mod logging;

// 上传进度持久化
pub mod persistence;

// 远程传输服务接口
pub mod remote;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, ProgressConfig, UploadConfig};
pub use error::{RemoteError, UploadError, UploadPhase};
pub use logging::{init_logging, LogGuard};
pub use persistence::{ProgressStore, UploadProgress};
pub use remote::{
    ChunkAck, ChunkRequest, FinalizeRequest, ProbeRequest, RemoteObject, RemoteTransferService,
    SessionRequest,
};
pub use uploader::{UploadEngine, UploadItem, UploadReport};
