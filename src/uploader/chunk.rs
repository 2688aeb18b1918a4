// 上传分片规划
//
// 分片规则：
// - 文件 <= 分片大小：整文件一次上传（单一分片）
// - 否则按分片大小切分，最后一个分片可能较短
// - 空文件没有分片（由上传引擎提前拒绝）

use std::io::{self, SeekFrom};
use std::ops::Range;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 上传分片信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    /// 分片索引（即 partseq）
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
}

impl UploadChunk {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self { index, range }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 读取分片数据
    ///
    /// 只读取该分片的字节范围，内存占用不超过一个分片
    pub async fn read_data(&self, file_path: &Path) -> io::Result<Vec<u8>> {
        let len = self.buffer_len()?;
        let mut file = File::open(file_path).await?;
        file.seek(SeekFrom::Start(self.range.start)).await?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;

        debug!(
            "读取分片 #{}: bytes={}-{}, 大小={} bytes",
            self.index,
            self.range.start,
            self.range.end.saturating_sub(1),
            buffer.len()
        );

        Ok(buffer)
    }

    // 32 位平台上分片大小可能超出 usize
    fn buffer_len(&self) -> io::Result<usize> {
        usize::try_from(self.size()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("分片 #{} 过大，无法读入内存: {} bytes", self.index, self.size()),
            )
        })
    }
}

/// 分片计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    chunk_count: usize,
}

impl ChunkPlan {
    /// 创建分片计划
    ///
    /// `chunk_size` 为 0 时按 1 字节处理（配置校验会提前拒绝）
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunk_count = total_size.div_ceil(chunk_size) as usize;
        Self {
            total_size,
            chunk_size,
            chunk_count,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 分片数量
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// 是否整文件一次上传
    pub fn is_whole_shot(&self) -> bool {
        self.total_size <= self.chunk_size
    }

    /// 获取指定分片
    pub fn chunk(&self, index: usize) -> Option<UploadChunk> {
        if index >= self.chunk_count {
            return None;
        }
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(UploadChunk::new(index, start..end))
    }

    /// 按顺序遍历所有分片
    pub fn chunks(&self) -> impl Iterator<Item = UploadChunk> + '_ {
        (0..self.chunk_count).filter_map(move |i| self.chunk(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_chunk_calculation() {
        // 完整分片
        let plan = ChunkPlan::new(16 * MB, 4 * MB);
        assert_eq!(plan.chunk_count(), 4);
        assert_eq!(plan.chunk(0).unwrap().range, 0..4 * MB);
        assert_eq!(plan.chunk(3).unwrap().range, 12 * MB..16 * MB);
        assert!(plan.chunk(4).is_none());

        // 不完整分片
        let plan = ChunkPlan::new(17 * MB, 4 * MB);
        assert_eq!(plan.chunk_count(), 5);
        assert_eq!(plan.chunk(4).unwrap().range, 16 * MB..17 * MB);
        assert_eq!(plan.chunk(4).unwrap().size(), MB);
    }

    #[test]
    fn test_whole_shot_boundary() {
        let plan = ChunkPlan::new(4 * MB, 4 * MB);
        assert!(plan.is_whole_shot());
        assert_eq!(plan.chunk_count(), 1);
        assert_eq!(plan.chunk(0).unwrap().range, 0..4 * MB);

        let plan = ChunkPlan::new(4 * MB + 1, 4 * MB);
        assert!(!plan.is_whole_shot());
        assert_eq!(plan.chunk_count(), 2);
        assert_eq!(plan.chunk(1).unwrap().size(), 1);
    }

    #[test]
    fn test_small_file_no_chunking() {
        let plan = ChunkPlan::new(2 * MB, 4 * MB);
        assert!(plan.is_whole_shot());
        let chunks: Vec<_> = plan.chunks().collect();
        assert_eq!(chunks, vec![UploadChunk::new(0, 0..2 * MB)]);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 4 * MB);
        assert_eq!(plan.chunk_count(), 0);
        assert_eq!(plan.chunks().count(), 0);
    }

    #[test]
    fn test_ten_megabytes_in_three_chunks() {
        let plan = ChunkPlan::new(10 * MB, 4 * MB);
        let sizes: Vec<_> = plan.chunks().map(|c| c.size()).collect();
        assert_eq!(sizes, vec![4 * MB, 4 * MB, 2 * MB]);
    }

    #[tokio::test]
    async fn test_read_data() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let plan = ChunkPlan::new(10, 4);
        let data: Vec<_> = {
            let mut out = Vec::new();
            for chunk in plan.chunks() {
                out.push(chunk.read_data(file.path()).await.unwrap());
            }
            out
        };
        assert_eq!(data, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
    }

    #[tokio::test]
    async fn test_read_data_past_end_fails() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123").unwrap();
        file.flush().unwrap();

        // 文件在规划后被截短
        let chunk = UploadChunk::new(1, 4..8);
        let err = chunk.read_data(file.path()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_buffer_len() {
        assert_eq!(UploadChunk::new(2, 8..12).buffer_len().unwrap(), 4);
        assert_eq!(
            UploadChunk::new(0, 0..u64::from(u32::MAX)).buffer_len().unwrap(),
            u32::MAX as usize
        );
    }

    #[cfg(target_pointer_width = "32")]
    #[tokio::test]
    async fn test_oversized_chunk_is_invalid_input() {
        let file = NamedTempFile::new().unwrap();
        let chunk = UploadChunk::new(0, 0..(1u64 << 33));
        let err = chunk.read_data(file.path()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_file(total in 1u64..10_000_000, chunk_size in 1u64..5_000_000) {
            let plan = ChunkPlan::new(total, chunk_size);
            let chunks: Vec<_> = plan.chunks().collect();

            prop_assert_eq!(chunks.len() as u64, total.div_ceil(chunk_size));
            prop_assert_eq!(plan.is_whole_shot(), chunks.len() == 1);

            let mut offset = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.range.start, offset);
                prop_assert!(chunk.size() > 0);
                prop_assert!(chunk.size() <= chunk_size);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.size(), chunk_size);
                }
                offset = chunk.range.end;
            }
            prop_assert_eq!(offset, total);
        }
    }
}
