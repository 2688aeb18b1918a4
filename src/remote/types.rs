// 远程传输服务的请求/响应类型

use serde::{Deserialize, Serialize};

// =====================================================
// 请求
// =====================================================

/// 秒传探测请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// 文件完整 MD5
    pub content_md5: String,
    /// 文件前 256KB MD5
    pub slice_md5: String,
    /// 文件大小
    pub size: u64,
    /// 网盘目标路径
    pub destination_path: String,
}

/// 预创建（申请上传会话）请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// 网盘目标路径
    pub destination_path: String,
    /// 文件大小
    pub size: u64,
    /// 本地修改时间 (Unix timestamp)
    pub local_mtime: i64,
    /// 计划上传的分片数量
    pub chunk_count: usize,
}

impl SessionRequest {
    /// 是否分片上传
    pub fn is_chunked(&self) -> bool {
        self.chunk_count > 1
    }
}

/// 分片上传请求
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// 上传服务器（由调用方选定，None 时由服务实现决定）
    pub upload_server: Option<String>,
    /// 网盘目标路径
    pub destination_path: String,
    /// 上传会话 ID
    pub session_id: String,
    /// 分片序号（从 0 开始）
    pub part_seq: usize,
    /// 分片数据
    pub data: Vec<u8>,
}

/// 创建文件（合并分片）请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    /// 网盘目标路径
    pub destination_path: String,
    /// 文件大小
    pub size: u64,
    /// 上传会话 ID
    pub session_id: String,
    /// 按分片序号排列的分片 MD5
    pub block_list: Vec<String>,
    /// 本地修改时间 (Unix timestamp)
    pub local_mtime: i64,
}

// =====================================================
// 响应
// =====================================================

/// 分片上传确认
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkAck {
    /// 分片 MD5（服务器返回）
    #[serde(default)]
    pub md5: String,
}

impl ChunkAck {
    pub fn new(md5: impl Into<String>) -> Self {
        Self { md5: md5.into() }
    }

    /// 是否携带有效的分片摘要
    pub fn is_success(&self) -> bool {
        !self.md5.is_empty()
    }
}

/// 网盘文件描述（秒传或创建文件成功后返回）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// 文件服务器ID
    #[serde(default)]
    pub fs_id: u64,

    /// 文件路径
    #[serde(default)]
    pub path: String,

    /// 文件大小
    #[serde(default)]
    pub size: u64,

    /// 文件 MD5
    #[serde(default)]
    pub md5: String,

    /// 服务器文件名
    #[serde(default)]
    pub server_filename: String,

    /// 服务器创建时间
    #[serde(default)]
    pub ctime: i64,

    /// 服务器修改时间
    #[serde(default)]
    pub mtime: i64,
}

impl RemoteObject {
    /// 是否为有效的文件描述（必须带 fs_id）
    pub fn is_success(&self) -> bool {
        self.fs_id > 0
    }
}
