// 单文件传输会话
//
// 状态机：
//   Start → DedupCheck → Deduped
//                      ↘ SessionOpen → Transferring → AllChunksAcked → Finalized
//
// - 文件大于秒传阈值才进行秒传探测
// - 进度记录已有 session_id 时跳过预创建
// - 分片严格按序上传，已确认的分片直接跳过，每确认一个就落盘
// - 任一阶段失败立即返回，进度表保留最后一次落盘的状态

use std::path::Path;

use tracing::{debug, info, warn};

use super::chunk::ChunkPlan;
use crate::config::UploadConfig;
use crate::error::{RemoteError, UploadError, UploadPhase};
use crate::persistence::{ProgressStore, UploadProgress};
use crate::remote::{
    ChunkRequest, FinalizeRequest, ProbeRequest, RemoteObject, RemoteTransferService,
    SessionRequest,
};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    /// 秒传探测中
    DedupCheck,
    /// 秒传成功（终态）
    Deduped,
    /// 已持有上传会话
    SessionOpen,
    /// 分片上传中
    Transferring,
    /// 所有分片已确认
    AllChunksAcked,
    /// 文件已创建（终态）
    Finalized,
}

/// 秒传探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 服务器已有相同内容，直接得到文件描述
    Deduped(RemoteObject),
    /// 需要正常上传
    NeedsUpload,
}

/// 单次上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// 网盘文件描述
    pub object: RemoteObject,
    /// 是否秒传
    pub rapid: bool,
    /// 本次实际上传的分片数
    pub chunks_sent: usize,
    /// 续传时跳过的分片数
    pub chunks_skipped: usize,
}

/// 传输会话
///
/// 持有进度记录的一份副本，每个改变状态的步骤都写回进度表
pub struct TransferSession<'a> {
    remote: &'a dyn RemoteTransferService,
    store: &'a ProgressStore,
    config: &'a UploadConfig,
    local_path: &'a Path,
    progress: UploadProgress,
    plan: ChunkPlan,
    state: SessionState,
    chunks_sent: usize,
    chunks_skipped: usize,
}

impl<'a> TransferSession<'a> {
    pub fn new(
        remote: &'a dyn RemoteTransferService,
        store: &'a ProgressStore,
        config: &'a UploadConfig,
        local_path: &'a Path,
        progress: UploadProgress,
    ) -> Self {
        let plan = ChunkPlan::new(progress.total_size, config.chunk_size);
        Self {
            remote,
            store,
            config,
            local_path,
            progress,
            plan,
            state: SessionState::Start,
            chunks_sent: 0,
            chunks_skipped: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn progress(&self) -> &UploadProgress {
        &self.progress
    }

    /// 执行完整的上传流程
    pub async fn run(mut self) -> Result<UploadReport, UploadError> {
        info!(
            "开始上传: {:?} -> {}, 大小={}, 分片数={}, 已完成={}",
            self.local_path,
            self.progress.destination_path,
            self.progress.total_size,
            self.plan.chunk_count(),
            self.progress.completed_chunks()
        );

        if let ProbeOutcome::Deduped(object) = self.probe().await? {
            self.forget_progress();
            return Ok(UploadReport {
                object,
                rapid: true,
                chunks_sent: 0,
                chunks_skipped: 0,
            });
        }

        self.open_session().await?;
        self.transfer().await?;
        let object = self.finalize().await?;

        Ok(UploadReport {
            object,
            rapid: false,
            chunks_sent: self.chunks_sent,
            chunks_skipped: self.chunks_skipped,
        })
    }

    /// 秒传探测
    ///
    /// 文件不超过秒传阈值时不探测，直接返回 `NeedsUpload`
    pub async fn probe(&mut self) -> Result<ProbeOutcome, UploadError> {
        if self.progress.total_size <= self.config.rapid_upload_threshold {
            debug!(
                "文件不超过秒传阈值，跳过探测: size={}, threshold={}",
                self.progress.total_size, self.config.rapid_upload_threshold
            );
            return Ok(ProbeOutcome::NeedsUpload);
        }

        self.state = SessionState::DedupCheck;

        let slice_md5 = self.progress.slice_md5.clone().ok_or_else(|| {
            self.fail(
                UploadPhase::Probe,
                RemoteError::protocol("缺少 slice_md5，无法秒传探测"),
            )
        })?;

        let req = ProbeRequest {
            content_md5: self.progress.content_md5.clone(),
            slice_md5,
            size: self.progress.total_size,
            destination_path: self.progress.destination_path.clone(),
        };

        match self.remote.probe_existing(&req).await {
            Ok(Some(object)) => {
                info!(
                    "秒传成功: {}, fs_id={}",
                    self.progress.destination_path, object.fs_id
                );
                self.state = SessionState::Deduped;
                Ok(ProbeOutcome::Deduped(object))
            }
            Ok(None) => {
                debug!("秒传未命中，进入正常上传: {}", self.progress.destination_path);
                Ok(ProbeOutcome::NeedsUpload)
            }
            Err(e) => Err(self.fail(UploadPhase::Probe, e)),
        }
    }

    /// 预创建（已有会话时直接复用）
    pub async fn open_session(&mut self) -> Result<(), UploadError> {
        if self.progress.has_session() {
            info!(
                "复用已有上传会话: session={}, 已完成分片={}/{}",
                self.progress.session_id,
                self.progress.completed_chunks(),
                self.plan.chunk_count()
            );
            self.state = SessionState::SessionOpen;
            return Ok(());
        }

        let req = SessionRequest {
            destination_path: self.progress.destination_path.clone(),
            size: self.progress.total_size,
            local_mtime: self.progress.local_mtime,
            chunk_count: self.plan.chunk_count(),
        };

        let session_id = self
            .remote
            .open_session(&req)
            .await
            .map_err(|e| self.fail(UploadPhase::OpenSession, e))?;

        if session_id.is_empty() {
            return Err(self.fail(
                UploadPhase::OpenSession,
                RemoteError::protocol("预创建响应缺少会话 ID"),
            ));
        }

        self.store
            .record_session(&self.progress.content_md5, &session_id)
            .map_err(|e| UploadError::persist(self.local_path, e))?;
        self.progress.session_id = session_id;
        self.state = SessionState::SessionOpen;

        info!(
            "预创建成功: {}, session={}",
            self.progress.destination_path, self.progress.session_id
        );
        Ok(())
    }

    /// 按序上传所有未确认的分片
    pub async fn transfer(&mut self) -> Result<(), UploadError> {
        self.state = SessionState::Transferring;

        let plan = self.plan;
        for chunk in plan.chunks() {
            if self.progress.is_chunk_done(chunk.index) {
                debug!("分片 #{} 已确认，跳过", chunk.index);
                self.chunks_skipped += 1;
                continue;
            }

            let data = chunk
                .read_data(self.local_path)
                .await
                .map_err(|e| UploadError::local_io(self.local_path, e))?;

            let req = ChunkRequest {
                upload_server: self.config.upload_server.clone(),
                destination_path: self.progress.destination_path.clone(),
                session_id: self.progress.session_id.clone(),
                part_seq: chunk.index,
                data,
            };

            let ack = self
                .remote
                .put_chunk(req)
                .await
                .map_err(|e| self.fail(UploadPhase::PutChunk, e))?;

            if !ack.is_success() {
                return Err(self.fail(
                    UploadPhase::PutChunk,
                    RemoteError::protocol(format!("分片 #{} 响应缺少 MD5", chunk.index)),
                ));
            }

            self.store
                .record_chunk(&self.progress.content_md5, chunk.index, &ack.md5)
                .map_err(|e| UploadError::persist(self.local_path, e))?;
            self.progress.set_chunk(chunk.index, ack.md5);
            self.chunks_sent += 1;

            debug!(
                "分片 #{} 上传成功 ({}/{})",
                chunk.index,
                self.progress.completed_chunks(),
                self.plan.chunk_count()
            );
        }

        self.state = SessionState::AllChunksAcked;
        Ok(())
    }

    /// 合并分片，创建文件
    pub async fn finalize(&mut self) -> Result<RemoteObject, UploadError> {
        let block_list = self
            .progress
            .block_list(self.plan.chunk_count())
            .ok_or_else(|| {
                self.fail(
                    UploadPhase::Finalize,
                    RemoteError::protocol("仍有分片未确认，无法创建文件"),
                )
            })?;

        let req = FinalizeRequest {
            destination_path: self.progress.destination_path.clone(),
            size: self.progress.total_size,
            session_id: self.progress.session_id.clone(),
            block_list,
            local_mtime: self.progress.local_mtime,
        };

        let object = self
            .remote
            .finalize(&req)
            .await
            .map_err(|e| self.fail(UploadPhase::Finalize, e))?;

        if !object.is_success() {
            return Err(self.fail(
                UploadPhase::Finalize,
                RemoteError::protocol("创建文件响应缺少 fs_id"),
            ));
        }

        self.state = SessionState::Finalized;
        self.forget_progress();

        info!(
            "上传完成: {}, fs_id={}, 上传分片={}, 跳过分片={}",
            object.path, object.fs_id, self.chunks_sent, self.chunks_skipped
        );
        Ok(object)
    }

    fn fail(&self, phase: UploadPhase, source: RemoteError) -> UploadError {
        warn!(
            "上传阶段失败 [{}]: {:?} -> {}, 错误: {}",
            phase, self.local_path, self.progress.destination_path, source
        );
        UploadError::remote(self.local_path, phase, source)
    }

    /// 远程文件已存在，进度记录不再需要
    fn forget_progress(&self) {
        if let Err(e) = self.store.delete(&self.progress.content_md5) {
            warn!(
                "删除上传进度失败（记录将在过期后清理）: md5={}, 错误: {}",
                self.progress.content_md5, e
            );
        }
    }
}
