//! 上传进度记录
//!
//! 每个不同的文件内容对应一条记录，以完整文件 MD5 为键。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 上传进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// 文件完整 MD5（记录标识）
    pub content_md5: String,

    /// 文件前 256KB MD5（仅大文件计算）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_md5: Option<String>,

    /// 上传会话 ID（预创建前为空）
    #[serde(default)]
    pub session_id: String,

    /// 各分片的 MD5，下标即分片序号；None 表示尚未确认
    #[serde(default)]
    pub chunk_digests: Vec<Option<String>>,

    /// 网盘目标路径
    pub destination_path: String,

    /// 本地修改时间 (Unix timestamp)
    pub local_mtime: i64,

    /// 文件大小
    pub total_size: u64,

    /// 规划分片时使用的分片大小
    #[serde(default)]
    pub chunk_size: u64,

    /// 最后更新时间
    pub last_touched: DateTime<Utc>,
}

impl UploadProgress {
    /// 创建新的进度记录（无分片、无会话）
    pub fn new(
        content_md5: String,
        destination_path: String,
        local_mtime: i64,
        total_size: u64,
        chunk_size: u64,
    ) -> Self {
        Self {
            content_md5,
            slice_md5: None,
            session_id: String::new(),
            chunk_digests: Vec::new(),
            destination_path,
            local_mtime,
            total_size,
            chunk_size,
            last_touched: Utc::now(),
        }
    }

    /// 更新时间戳
    pub fn touch(&mut self) {
        self.last_touched = Utc::now();
    }

    /// 是否已超过保留时长
    pub fn is_expired(&self, retention: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.last_touched)
            .to_std()
            .map(|elapsed| elapsed > retention)
            .unwrap_or(false)
    }

    /// 是否已有上传会话
    pub fn has_session(&self) -> bool {
        !self.session_id.is_empty()
    }

    /// 分片是否已确认
    pub fn is_chunk_done(&self, index: usize) -> bool {
        matches!(self.chunk_digests.get(index), Some(Some(_)))
    }

    /// 记录分片 MD5（按需扩展数组）
    pub fn set_chunk(&mut self, index: usize, md5: String) {
        if self.chunk_digests.len() <= index {
            self.chunk_digests.resize(index + 1, None);
        }
        self.chunk_digests[index] = Some(md5);
        self.touch();
    }

    /// 已确认的分片数量
    pub fn completed_chunks(&self) -> usize {
        self.chunk_digests.iter().filter(|d| d.is_some()).count()
    }

    /// 前 `chunk_count` 个分片全部确认时，按序返回分片 MD5 列表
    pub fn block_list(&self, chunk_count: usize) -> Option<Vec<String>> {
        (0..chunk_count)
            .map(|i| self.chunk_digests.get(i).cloned().flatten())
            .collect()
    }

    /// 记录能否用于续传到 `destination_path`（按 `chunk_size` 分片）
    pub fn matches(&self, destination_path: &str, chunk_size: u64) -> bool {
        self.destination_path == destination_path && self.chunk_size == chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UploadProgress {
        UploadProgress::new(
            "abc".to_string(),
            "/apps/a.bin".to_string(),
            1_700_000_000,
            10,
            4,
        )
    }

    #[test]
    fn test_sparse_chunks() {
        let mut p = sample();
        p.set_chunk(2, "md5_2".to_string());
        assert_eq!(p.chunk_digests.len(), 3);
        assert!(!p.is_chunk_done(0));
        assert!(p.is_chunk_done(2));
        assert!(!p.is_chunk_done(5));
        assert_eq!(p.completed_chunks(), 1);
        assert_eq!(p.block_list(3), None);

        p.set_chunk(0, "md5_0".to_string());
        p.set_chunk(1, "md5_1".to_string());
        assert_eq!(
            p.block_list(3),
            Some(vec![
                "md5_0".to_string(),
                "md5_1".to_string(),
                "md5_2".to_string()
            ])
        );
    }

    #[test]
    fn test_expiry() {
        let mut p = sample();
        assert!(!p.is_expired(Duration::from_secs(24 * 3600)));

        p.last_touched = Utc::now() - chrono::Duration::hours(25);
        assert!(p.is_expired(Duration::from_secs(24 * 3600)));

        p.touch();
        assert!(!p.is_expired(Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn test_matches() {
        let p = sample();
        assert!(p.matches("/apps/a.bin", 4));
        assert!(!p.matches("/apps/b.bin", 4));
        assert!(!p.matches("/apps/a.bin", 8));
    }

    #[test]
    fn test_serialized_layout() {
        let mut p = sample();
        p.set_chunk(1, "md5_1".to_string());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["chunk_digests"], serde_json::json!([null, "md5_1"]));
        assert!(json.get("slice_md5").is_none());

        let back: UploadProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
