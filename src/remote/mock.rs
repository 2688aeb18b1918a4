// 测试用的内存传输服务，记录每次调用

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    ChunkAck, ChunkRequest, FinalizeRequest, ProbeRequest, RemoteObject, RemoteTransferService,
    SessionRequest,
};
use crate::error::RemoteError;
use crate::uploader::hasher::digest_bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe(ProbeRequest),
    OpenSession(SessionRequest),
    PutChunk {
        part_seq: usize,
        len: usize,
        session_id: String,
        upload_server: Option<String>,
    },
    Finalize(FinalizeRequest),
}

#[derive(Default)]
pub struct MockRemote {
    pub calls: Mutex<Vec<Call>>,
    pub sessions: AtomicUsize,
    /// 秒传命中时返回的文件
    pub existing: Option<RemoteObject>,
    pub fail_probe: bool,
    pub fail_open_session: bool,
    /// 该分片上传时返回传输错误
    pub fail_put_at: Option<usize>,
    pub fail_finalize: bool,
    pub empty_session_id: bool,
    pub empty_ack: bool,
    /// 创建文件时返回不带 fs_id 的描述
    pub invalid_object: bool,
    /// 预创建时先通知 entered，再等待 release
    pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn put_parts(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::PutChunk { part_seq, .. } => Some(*part_seq),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn finalize_requests(&self) -> Vec<FinalizeRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Finalize(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteTransferService for MockRemote {
    async fn probe_existing(&self, req: &ProbeRequest) -> Result<Option<RemoteObject>, RemoteError> {
        self.calls.lock().push(Call::Probe(req.clone()));
        if self.fail_probe {
            return Err(RemoteError::transport("dns lookup failed"));
        }
        Ok(self.existing.clone())
    }

    async fn open_session(&self, req: &SessionRequest) -> Result<String, RemoteError> {
        self.calls.lock().push(Call::OpenSession(req.clone()));

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        if self.fail_open_session {
            return Err(RemoteError::transport("connection refused"));
        }

        if self.empty_session_id {
            return Ok(String::new());
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{}", n))
    }

    async fn put_chunk(&self, req: ChunkRequest) -> Result<ChunkAck, RemoteError> {
        self.calls.lock().push(Call::PutChunk {
            part_seq: req.part_seq,
            len: req.data.len(),
            session_id: req.session_id.clone(),
            upload_server: req.upload_server.clone(),
        });

        if self.fail_put_at == Some(req.part_seq) {
            return Err(RemoteError::transport("connection reset"));
        }
        if self.empty_ack {
            return Ok(ChunkAck::default());
        }
        Ok(ChunkAck::new(digest_bytes(&req.data)))
    }

    async fn finalize(&self, req: &FinalizeRequest) -> Result<RemoteObject, RemoteError> {
        self.calls.lock().push(Call::Finalize(req.clone()));

        if self.fail_finalize {
            return Err(RemoteError::transport("timeout"));
        }
        if self.invalid_object {
            return Ok(RemoteObject::default());
        }

        let server_filename = req
            .destination_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(RemoteObject {
            fs_id: 1000 + req.block_list.len() as u64,
            path: req.destination_path.clone(),
            size: req.size,
            md5: req.block_list.first().cloned().unwrap_or_default(),
            server_filename,
            ctime: req.local_mtime,
            mtime: req.local_mtime,
        })
    }
}
