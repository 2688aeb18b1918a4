//! 上传进度持久化
//!
//! 断点续传依赖这里的进度表：程序中断后重新上传同一文件时，
//! 已确认的分片直接跳过，已申请的上传会话继续使用。
//!
//! ## 文件结构
//!
//! ```text
//! $TMPDIR/baidu-pan-uploader/
//! └── upload-progress.json    # 所有进行中上传的进度（content_md5 -> 记录）
//! ```

pub mod progress;
pub mod types;

pub use progress::{ProgressError, ProgressStore};
pub use types::UploadProgress;
