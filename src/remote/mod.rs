// 远程传输服务
//
// 上传引擎只依赖这里的四个操作：秒传探测、预创建、分片上传、创建文件。
// 具体厂商接口（请求格式、认证、超时）由调用方实现。

pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use types::{ChunkAck, ChunkRequest, FinalizeRequest, ProbeRequest, RemoteObject, SessionRequest};

use crate::error::RemoteError;
use async_trait::async_trait;

/// 远程传输服务
#[async_trait]
pub trait RemoteTransferService: Send + Sync {
    /// 秒传探测
    ///
    /// 服务器已有相同内容时返回文件描述，否则返回 `None`
    async fn probe_existing(&self, req: &ProbeRequest) -> Result<Option<RemoteObject>, RemoteError>;

    /// 预创建文件，返回上传会话 ID
    async fn open_session(&self, req: &SessionRequest) -> Result<String, RemoteError>;

    /// 上传单个分片，返回分片确认（含分片 MD5）
    async fn put_chunk(&self, req: ChunkRequest) -> Result<ChunkAck, RemoteError>;

    /// 合并分片，创建文件
    async fn finalize(&self, req: &FinalizeRequest) -> Result<RemoteObject, RemoteError>;
}
