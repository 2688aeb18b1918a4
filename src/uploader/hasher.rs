// 文件哈希
//
// 秒传和断点续传都以文件内容 MD5 为键：
// - content_md5：完整文件 MD5，进度记录的唯一标识
// - slice_md5：文件前 256KB MD5，秒传探测时使用

use md5::Context as Md5Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// 读取缓冲区大小
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 完整文件摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// 文件完整 MD5（小写十六进制）
    pub content_md5: String,
    /// 哈希时读到的字节数
    pub file_size: u64,
}

/// 流式计算整个文件的 MD5（阻塞线程池中执行）
pub async fn digest_file(path: &Path) -> io::Result<FileDigest> {
    let path = path.to_path_buf();
    run_blocking(move || digest_file_sync(&path)).await
}

/// 只读取文件前 `limit` 字节计算 MD5，代价与文件大小无关
pub async fn digest_prefix(path: &Path, limit: u64) -> io::Result<String> {
    let path = path.to_path_buf();
    run_blocking(move || digest_prefix_sync(&path, limit)).await
}

/// 计算内存数据的 MD5
pub fn digest_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("哈希任务执行失败: {}", e)))?
}

fn digest_file_sync(path: &Path) -> io::Result<FileDigest> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Md5Context::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut file_size = 0u64;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.consume(&buffer[..n]);
        file_size += n as u64;
    }

    let content_md5 = format!("{:x}", hasher.compute());
    debug!(
        "文件哈希计算完成: path={:?}, size={}, content_md5={}",
        path, file_size, content_md5
    );

    Ok(FileDigest {
        content_md5,
        file_size,
    })
}

fn digest_prefix_sync(path: &Path, limit: u64) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = file.take(limit);
    let mut hasher = Md5Context::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.consume(&buffer[..n]);
    }

    let slice_md5 = format!("{:x}", hasher.compute());
    debug!("前缀哈希计算完成: path={:?}, limit={}, slice_md5={}", path, limit, slice_md5);
    Ok(slice_md5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_digest_known_value() {
        let file = temp_file_with(b"hello world");
        let digest = digest_file(file.path()).await.unwrap();
        assert_eq!(digest.content_md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digest.file_size, 11);
    }

    #[tokio::test]
    async fn test_small_file_prefix_equals_content() {
        // 文件小于前缀长度时两者一致
        let file = temp_file_with(b"Hello, World! This is a test file.");
        let digest = digest_file(file.path()).await.unwrap();
        let slice = digest_prefix(file.path(), 256 * 1024).await.unwrap();
        assert_eq!(digest.content_md5, slice);
    }

    #[tokio::test]
    async fn test_prefix_only_reads_limit() {
        let mut content = vec![1u8; 256 * 1024];
        content.extend(vec![2u8; 256 * 1024]);
        let file = temp_file_with(&content);

        let slice = digest_prefix(file.path(), 256 * 1024).await.unwrap();
        assert_eq!(slice, digest_bytes(&content[..256 * 1024]));

        let digest = digest_file(file.path()).await.unwrap();
        assert_ne!(digest.content_md5, slice);
        assert_eq!(digest.content_md5, digest_bytes(&content));
    }

    #[tokio::test]
    async fn test_same_content_same_digest() {
        let a = temp_file_with(b"Test content for MD5 consistency check");
        let b = temp_file_with(b"Test content for MD5 consistency check");
        assert_eq!(
            digest_file(a.path()).await.unwrap(),
            digest_file(b.path()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = digest_file(Path::new("/nonexistent/file.bin")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(digest_prefix(Path::new("/nonexistent/file.bin"), 10).await.is_err());
    }
}
