// 上传引擎模块
//
// - hasher: 文件 MD5 / 前缀 MD5
// - chunk: 分片规划与分片读取
// - session: 单文件上传状态机
// - engine: 对外入口（单文件、批量、文件夹）
// - folder: 本地文件夹扫描

pub mod chunk;
pub mod engine;
pub mod folder;
pub mod hasher;
pub mod session;

pub use chunk::{ChunkPlan, UploadChunk};
pub use engine::{resolve_remote_path, FolderUploadEntry, UploadEngine, UploadItem};
pub use folder::{FolderScanner, ScanOptions, ScannedFile};
pub use hasher::{digest_bytes, digest_file, digest_prefix, FileDigest};
pub use session::{ProbeOutcome, SessionState, TransferSession, UploadReport};
