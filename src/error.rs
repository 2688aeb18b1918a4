// 上传错误类型
//
// 引擎从不吞掉阶段失败：每个错误都带上本地文件路径，远程错误再带上失败阶段

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// 远程传输服务返回的错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// 网络错误、超时等（可稍后整体重试，已确认的分片不会重传）
    #[error("传输错误: {0}")]
    Transport(String),

    /// 响应格式异常或缺少必要字段
    #[error("协议错误: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub fn transport(msg: impl Into<String>) -> Self {
        RemoteError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        RemoteError::Protocol(msg.into())
    }

    /// 是否为传输层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// 上传协议阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    /// 秒传探测
    Probe,
    /// 预创建（申请上传会话）
    OpenSession,
    /// 分片上传
    PutChunk,
    /// 创建文件（合并分片）
    Finalize,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPhase::Probe => "probe",
            UploadPhase::OpenSession => "openSession",
            UploadPhase::PutChunk => "putChunk",
            UploadPhase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传错误
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// 本地文件不存在或不可读（不重试）
    #[error("读取本地文件失败: {path:?}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 空文件不进入上传流程
    #[error("拒绝上传空文件: {path:?}")]
    EmptyFile { path: PathBuf },

    /// 远程阶段失败
    #[error("上传失败 [{phase}]: {path:?}: {source}")]
    Remote {
        path: PathBuf,
        phase: UploadPhase,
        #[source]
        source: RemoteError,
    },

    /// 上传进度无法持久化，分片不能视为完成
    #[error("保存上传进度失败: {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 相同内容的文件正在被另一个会话上传
    #[error("相同内容的文件正在上传中: {path:?} (md5={content_md5})")]
    InProgress { path: PathBuf, content_md5: String },
}

impl UploadError {
    pub(crate) fn local_io(path: &Path, source: io::Error) -> Self {
        UploadError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn remote(path: &Path, phase: UploadPhase, source: RemoteError) -> Self {
        UploadError::Remote {
            path: path.to_path_buf(),
            phase,
            source,
        }
    }

    pub(crate) fn persist(path: &Path, source: io::Error) -> Self {
        UploadError::Persist {
            path: path.to_path_buf(),
            source,
        }
    }

    /// 本地文件路径
    pub fn path(&self) -> &Path {
        match self {
            UploadError::LocalIo { path, .. }
            | UploadError::EmptyFile { path }
            | UploadError::Remote { path, .. }
            | UploadError::Persist { path, .. }
            | UploadError::InProgress { path, .. } => path,
        }
    }

    /// 失败的远程阶段（本地错误返回 None）
    pub fn phase(&self) -> Option<UploadPhase> {
        match self {
            UploadError::Remote { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// 重新调用 upload 是否有意义
    ///
    /// 远程错误和持久化错误都可以稍后整体重试，断点续传会跳过已确认的分片
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            UploadError::Remote { .. } | UploadError::Persist { .. } | UploadError::InProgress { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(UploadPhase::Probe.to_string(), "probe");
        assert_eq!(UploadPhase::OpenSession.to_string(), "openSession");
        assert_eq!(UploadPhase::PutChunk.to_string(), "putChunk");
        assert_eq!(UploadPhase::Finalize.to_string(), "finalize");
    }

    #[test]
    fn test_error_accessors() {
        let err = UploadError::remote(
            Path::new("/data/a.bin"),
            UploadPhase::PutChunk,
            RemoteError::transport("connection reset"),
        );
        assert_eq!(err.phase(), Some(UploadPhase::PutChunk));
        assert_eq!(err.path(), Path::new("/data/a.bin"));
        assert!(err.is_resumable());
        assert!(err.to_string().contains("putChunk"));

        let err = UploadError::EmptyFile {
            path: PathBuf::from("/data/empty"),
        };
        assert_eq!(err.phase(), None);
        assert!(!err.is_resumable());

        let err = UploadError::local_io(
            Path::new("/missing"),
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(!err.is_resumable());
    }

    #[test]
    fn test_remote_error_kind() {
        assert!(RemoteError::transport("timeout").is_transport());
        assert!(!RemoteError::protocol("missing fs_id").is_transport());
    }
}
