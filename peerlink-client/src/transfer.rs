use crate::bus::{EventBus, SessionEvent};
use crate::config::TransferConfig;
use crate::connection::PeerSender;
use crate::error::{Result, SessionError};
use bytes::{Bytes, BytesMut};
use peerlink_core::{
    ChannelData, ChannelPayload, ChunkFrame, FileTransferRecord, PeerId, TransferAction,
    TransferId, TransferStatus, chunk_checksum, chunk_count, progress_percent,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Bytes of a file about to be offered to a peer.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FileSource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Reads a whole file from disk. The MIME type is left generic.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        Ok(Self::new(name, "application/octet-stream", data))
    }
}

enum Side {
    Outbound { data: Bytes, next_chunk: u32 },
    Inbound { buffer: BytesMut, next_chunk: u32 },
}

struct ActiveTransfer {
    record: FileTransferRecord,
    side: Side,
}

/// Runs the request/accept handshake and moves chunks for every active
/// transfer. Terminal records leave the active set.
pub struct TransferEngine {
    local_id: PeerId,
    config: TransferConfig,
    bus: EventBus,
    active: HashMap<TransferId, ActiveTransfer>,
    outbound_queue: VecDeque<TransferId>,
    finished: Vec<FileTransferRecord>,
}

impl TransferEngine {
    pub fn new(local_id: PeerId, config: TransferConfig, bus: EventBus) -> Self {
        Self {
            local_id,
            config,
            bus,
            active: HashMap::new(),
            outbound_queue: VecDeque::new(),
            finished: Vec::new(),
        }
    }

    /// Offers `file` to `receiver`. No bytes move until the receiver accepts.
    pub async fn initiate(
        &mut self,
        sender: &dyn PeerSender,
        receiver: PeerId,
        file: FileSource,
    ) -> Result<FileTransferRecord> {
        let id = TransferId::new();
        let record = FileTransferRecord::new(
            id.clone(),
            file.name,
            file.data.len() as u64,
            file.mime_type,
            self.local_id.clone(),
            receiver.clone(),
            self.config.chunk_size,
        )
        .map_err(|e| SessionError::TransferRefused {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        info!(
            "Offering '{}' ({} bytes, {} chunks) to {}",
            record.file_name,
            record.file_size,
            record.total_chunks(),
            receiver
        );

        self.bus.publish(SessionEvent::TransferInitiated(record.clone()));
        self.active.insert(
            id.clone(),
            ActiveTransfer {
                record: record.clone(),
                side: Side::Outbound {
                    data: file.data,
                    next_chunk: 0,
                },
            },
        );

        let request = ChannelPayload::FileTransfer {
            action: TransferAction::Request,
            transfer_id: id.clone(),
            file_name: Some(record.file_name.clone()),
            file_size: Some(record.file_size),
            file_type: Some(record.mime_type.clone()),
            chunk_size: Some(record.chunk_size),
        };
        if !Self::send_payload(sender, &receiver, &request).await {
            self.finish(&id, TransferStatus::Failed, Some("request could not be sent"), None)?;
            return Err(SessionError::TransferRequestFailed(id));
        }

        Ok(record)
    }

    /// Applies a `file-transfer` control payload from `from`. Requests outside
    /// the configured chunk limits are answered with a reject and never tracked.
    pub async fn handle_control(
        &mut self,
        sender: &dyn PeerSender,
        from: &PeerId,
        payload: ChannelPayload,
    ) -> Result<()> {
        let ChannelPayload::FileTransfer {
            action,
            transfer_id,
            file_name,
            file_size,
            file_type,
            chunk_size,
        } = payload
        else {
            return Ok(());
        };

        match action {
            TransferAction::Request => {
                if self.active.contains_key(&transfer_id) {
                    debug!("Repeated request for {}", transfer_id);
                    return Ok(());
                }
                let (Some(file_name), Some(file_size)) = (file_name, file_size) else {
                    warn!("Incomplete transfer request {} from {}", transfer_id, from);
                    return Ok(());
                };
                let chunk_size = chunk_size.unwrap_or(self.config.chunk_size);
                if let Err(reason) = self.check_request(file_size, chunk_size) {
                    warn!("Refusing transfer {} from {}: {}", transfer_id, from, reason);
                    let reject = ChannelPayload::transfer_action(TransferAction::Reject, transfer_id);
                    if !Self::send_payload(sender, from, &reject).await {
                        debug!("Refusal not delivered to {}", from);
                    }
                    return Ok(());
                }
                let record = FileTransferRecord::new(
                    transfer_id.clone(),
                    file_name,
                    file_size,
                    file_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
                    from.clone(),
                    self.local_id.clone(),
                    chunk_size,
                )
                .map_err(|e| SessionError::TransferRefused {
                    id: transfer_id.clone(),
                    reason: e.to_string(),
                })?;
                info!(
                    "{} offers '{}' ({} bytes)",
                    from, record.file_name, record.file_size
                );

                self.bus.publish(SessionEvent::TransferRequested(record.clone()));
                self.active.insert(
                    transfer_id,
                    ActiveTransfer {
                        record,
                        side: Side::Inbound {
                            buffer: BytesMut::new(),
                            next_chunk: 0,
                        },
                    },
                );
            }

            TransferAction::Accept => {
                let Some(transfer) = self.owned_by(&transfer_id, from, true) else {
                    return Ok(());
                };
                if transfer.record.status != TransferStatus::Pending {
                    return Ok(());
                }
                info!("{} accepted {}", from, transfer_id);
                self.start(&transfer_id)?;
                if self.is_empty_transfer(&transfer_id) {
                    self.finish(&transfer_id, TransferStatus::Completed, None, None)?;
                } else {
                    self.outbound_queue.push_back(transfer_id);
                }
            }

            TransferAction::Reject => {
                let Some(transfer) = self.owned_by(&transfer_id, from, true) else {
                    return Ok(());
                };
                if transfer.record.status != TransferStatus::Pending {
                    return Ok(());
                }
                info!("{} rejected {}", from, transfer_id);
                self.finish(&transfer_id, TransferStatus::Rejected, None, None)?;
            }

            TransferAction::Cancel => {
                if self.counterpart_of(&transfer_id) != Some(from) {
                    return Ok(());
                }
                info!("{} cancelled {}", from, transfer_id);
                self.finish(&transfer_id, TransferStatus::Cancelled, None, None)?;
            }
        }

        Ok(())
    }

    /// Accepts an inbound request. Chunks are expected right after.
    pub async fn accept(&mut self, sender: &dyn PeerSender, id: &TransferId) -> Result<()> {
        let from = self.pending_inbound(id)?;
        let accept = ChannelPayload::transfer_action(TransferAction::Accept, id.clone());
        if !Self::send_payload(sender, &from, &accept).await {
            self.finish(id, TransferStatus::Failed, Some("sender unreachable"), None)?;
            return Err(SessionError::DeliverySendFailed(from));
        }

        self.start(id)?;
        if self.is_empty_transfer(id) {
            self.finish(id, TransferStatus::Completed, None, Some(Bytes::new()))?;
        }
        Ok(())
    }

    pub async fn reject(&mut self, sender: &dyn PeerSender, id: &TransferId) -> Result<()> {
        let from = self.pending_inbound(id)?;
        let reject = ChannelPayload::transfer_action(TransferAction::Reject, id.clone());
        if !Self::send_payload(sender, &from, &reject).await {
            warn!("Reject notice for {} not delivered", id);
        }
        self.finish(id, TransferStatus::Rejected, None, None)?;
        Ok(())
    }

    /// Cancels from this end and notifies the other one.
    pub async fn cancel(&mut self, sender: &dyn PeerSender, id: &TransferId) -> Result<()> {
        let Some(counterpart) = self.counterpart_of(id).cloned() else {
            return Err(SessionError::UnknownTransfer(id.clone()));
        };
        self.finish(id, TransferStatus::Cancelled, None, None)?;

        let cancel = ChannelPayload::transfer_action(TransferAction::Cancel, id.clone());
        if !Self::send_payload(sender, &counterpart, &cancel).await {
            warn!("Cancel notice for {} not delivered to {}", id, counterpart);
        }
        Ok(())
    }

    /// Cancels every active transfer, notifying each counterpart.
    pub async fn cancel_all(&mut self, sender: &dyn PeerSender) {
        let mut ids: Vec<TransferId> = self.active.keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        for id in ids {
            if let Err(e) = self.cancel(sender, &id).await {
                warn!("Failed to cancel {}: {}", id, e);
            }
        }
    }

    pub fn has_outbound_work(&self) -> bool {
        !self.outbound_queue.is_empty()
    }

    /// Emits up to `max_chunks` chunks, one at a time round robin across
    /// outbound transfers. Returns how many were sent.
    pub async fn pump(&mut self, sender: &dyn PeerSender, max_chunks: usize) -> usize {
        let mut sent = 0;

        while sent < max_chunks {
            let Some(id) = self.outbound_queue.pop_front() else {
                break;
            };
            let Some(frame) = self.next_frame(&id) else {
                continue;
            };
            let Some(transfer) = self.active.get(&id) else {
                continue;
            };
            let receiver = transfer.record.receiver_id.clone();

            let delivered = match frame.encode() {
                Ok(bytes) => sender.send_data(&receiver, ChannelData::Binary(bytes)).await,
                Err(e) => {
                    error!("Failed to encode chunk {} of {}: {}", frame.index, id, e);
                    false
                }
            };
            if !delivered {
                self.abort(sender, &id, format!("chunk {} could not be sent", frame.index))
                    .await;
                continue;
            }

            sent += 1;
            if self.advance_outbound(&id, &frame) {
                self.outbound_queue.push_back(id);
            }
        }

        sent
    }

    /// Consumes a binary chunk frame from `from`.
    pub async fn handle_chunk(&mut self, sender: &dyn PeerSender, from: &PeerId, bytes: &[u8]) {
        let frame = match ChunkFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Undecodable chunk frame from {}: {}", from, e);
                return;
            }
        };
        let id = frame.transfer_id.clone();

        let Some(transfer) = self.owned_by(&id, from, false) else {
            debug!("Chunk for unknown transfer {} from {}", id, from);
            return;
        };
        if transfer.record.status != TransferStatus::Transferring {
            debug!("Chunk for {} in {:?}", id, transfer.record.status);
            return;
        }

        if let Err(reason) = self.check_chunk(&frame) {
            self.abort(sender, &id, reason).await;
            return;
        }

        let Some(transfer) = self.active.get_mut(&id) else {
            return;
        };
        let Side::Inbound { buffer, next_chunk } = &mut transfer.side else {
            return;
        };
        buffer.extend_from_slice(&frame.data);
        *next_chunk += 1;
        let completed = *next_chunk;
        let total = transfer.record.total_chunks();
        if let Some(mut descriptor) = transfer.record.descriptor(frame.index) {
            descriptor.checksum = frame.checksum;
            transfer.record.chunks.push(descriptor);
        }

        self.report_progress(&id, completed, total);
        if completed == total {
            let data = match self.active.get_mut(&id).map(|t| &mut t.side) {
                Some(Side::Inbound { buffer, .. }) => std::mem::take(buffer).freeze(),
                _ => Bytes::new(),
            };
            if let Err(e) = self.finish(&id, TransferStatus::Completed, None, Some(data)) {
                error!("Failed to complete {}: {}", id, e);
            }
        }
    }

    /// The peer went away: everything shared with it fails.
    pub fn forget_peer(&mut self, peer_id: &PeerId) {
        let ids: Vec<TransferId> = self
            .active
            .values()
            .filter(|t| t.record.counterpart(&self.local_id) == peer_id)
            .map(|t| t.record.id.clone())
            .collect();

        for id in ids {
            if let Err(e) = self.finish(&id, TransferStatus::Failed, Some("peer disconnected"), None) {
                warn!("Failed to fail {}: {}", id, e);
            }
        }
    }

    /// Active transfers, in no particular order.
    pub fn transfers(&self) -> Vec<FileTransferRecord> {
        self.active.values().map(|t| t.record.clone()).collect()
    }

    pub fn transfer(&self, id: &TransferId) -> Option<&FileTransferRecord> {
        self.active.get(id).map(|t| &t.record)
    }

    /// Records that reached a terminal state, in the order they did.
    pub fn finished(&self) -> &[FileTransferRecord] {
        &self.finished
    }

    pub fn clear_history(&mut self) {
        self.finished.clear();
    }

    async fn send_payload(sender: &dyn PeerSender, to: &PeerId, payload: &ChannelPayload) -> bool {
        match payload.to_data() {
            Ok(data) => sender.send_data(to, data).await,
            Err(e) => {
                error!("Failed to serialize transfer payload: {}", e);
                false
            }
        }
    }

    /// The active transfer `id`, if `from` is its counterpart and this end
    /// is the sender (`outbound`) or the receiver.
    fn owned_by(&self, id: &TransferId, from: &PeerId, outbound: bool) -> Option<&ActiveTransfer> {
        let transfer = self.active.get(id)?;
        let (local, remote) = if outbound {
            (&transfer.record.sender_id, &transfer.record.receiver_id)
        } else {
            (&transfer.record.receiver_id, &transfer.record.sender_id)
        };
        (local == &self.local_id && remote == from).then_some(transfer)
    }

    fn counterpart_of(&self, id: &TransferId) -> Option<&PeerId> {
        self.active
            .get(id)
            .map(|t| t.record.counterpart(&self.local_id))
    }

    fn pending_inbound(&self, id: &TransferId) -> Result<PeerId> {
        let Some(transfer) = self.active.get(id) else {
            return Err(SessionError::UnknownTransfer(id.clone()));
        };
        let record = &transfer.record;
        if record.receiver_id != self.local_id {
            return Err(SessionError::UnknownTransfer(id.clone()));
        }
        if record.status != TransferStatus::Pending {
            return Err(peerlink_core::TransitionError {
                id: id.clone(),
                from: record.status,
                to: TransferStatus::Accepted,
            }
            .into());
        }
        Ok(record.sender_id.clone())
    }

    fn is_empty_transfer(&self, id: &TransferId) -> bool {
        self.active
            .get(id)
            .is_some_and(|t| t.record.total_chunks() == 0)
    }

    /// pending -> accepted -> transferring, announcing both steps.
    fn start(&mut self, id: &TransferId) -> Result<()> {
        let Some(transfer) = self.active.get_mut(id) else {
            return Err(SessionError::UnknownTransfer(id.clone()));
        };
        transfer.record.transition(TransferStatus::Accepted)?;
        self.bus
            .publish(SessionEvent::TransferAccepted(transfer.record.clone()));
        transfer.record.transition(TransferStatus::Transferring)?;
        self.bus
            .publish(SessionEvent::TransferStarted(transfer.record.clone()));
        Ok(())
    }

    fn check_request(&self, file_size: u64, chunk_size: u32) -> std::result::Result<(), String> {
        let min = self.config.min_chunk_size.max(1);
        if chunk_size < min {
            return Err(format!("chunk size {chunk_size} is below {min}"));
        }
        match chunk_count(file_size, chunk_size) {
            Some(count) if count <= self.config.max_chunks => Ok(()),
            Some(count) => Err(format!(
                "{count} chunks exceed the limit of {}",
                self.config.max_chunks
            )),
            None => Err(format!(
                "{file_size} bytes in chunks of {chunk_size} overflow the chunk index"
            )),
        }
    }

    fn next_frame(&self, id: &TransferId) -> Option<ChunkFrame> {
        let transfer = self.active.get(id)?;
        if transfer.record.status != TransferStatus::Transferring {
            return None;
        }
        let Side::Outbound { data, next_chunk } = &transfer.side else {
            return None;
        };
        let range = transfer.record.chunk_range(*next_chunk)?;
        let chunk = data.get(range)?;

        Some(ChunkFrame {
            transfer_id: id.clone(),
            index: *next_chunk,
            checksum: self.config.verify_checksums.then(|| chunk_checksum(chunk)),
            data: chunk.to_vec(),
        })
    }

    /// Returns true while chunks remain to be sent.
    fn advance_outbound(&mut self, id: &TransferId, frame: &ChunkFrame) -> bool {
        let Some(transfer) = self.active.get_mut(id) else {
            return false;
        };
        let Side::Outbound { next_chunk, .. } = &mut transfer.side else {
            return false;
        };
        *next_chunk = frame.index + 1;
        let completed = *next_chunk;
        let total = transfer.record.total_chunks();
        if let Some(mut descriptor) = transfer.record.descriptor(frame.index) {
            descriptor.checksum = frame.checksum;
            transfer.record.chunks.push(descriptor);
        }

        self.report_progress(id, completed, total);
        if completed < total {
            return true;
        }
        if let Err(e) = self.finish(id, TransferStatus::Completed, None, None) {
            error!("Failed to complete {}: {}", id, e);
        }
        false
    }

    fn check_chunk(&self, frame: &ChunkFrame) -> std::result::Result<(), String> {
        let Some(transfer) = self.active.get(&frame.transfer_id) else {
            return Err("transfer vanished".to_owned());
        };
        let Side::Inbound { next_chunk, .. } = &transfer.side else {
            return Err("chunk for an outbound transfer".to_owned());
        };
        if frame.index != *next_chunk {
            return Err(format!(
                "chunk {} arrived, expected {}",
                frame.index, next_chunk
            ));
        }
        let Some(descriptor) = transfer.record.descriptor(frame.index) else {
            return Err(format!("chunk {} out of range", frame.index));
        };
        if frame.data.len() != descriptor.size as usize {
            return Err(format!(
                "chunk {} has {} bytes, expected {}",
                frame.index,
                frame.data.len(),
                descriptor.size
            ));
        }
        if self.config.verify_checksums {
            if let Some(expected) = frame.checksum {
                if chunk_checksum(&frame.data) != expected {
                    return Err(format!("checksum mismatch on chunk {}", frame.index));
                }
            }
        }
        Ok(())
    }

    fn report_progress(&mut self, id: &TransferId, completed: u32, total: u32) {
        let Some(transfer) = self.active.get_mut(id) else {
            return;
        };
        if transfer.record.set_progress(progress_percent(completed, total)) {
            self.bus.publish(SessionEvent::TransferProgress {
                transfer_id: id.clone(),
                progress: transfer.record.progress,
            });
        }
    }

    /// Fails a transfer mid-stream and tells the counterpart if possible.
    async fn abort(&mut self, sender: &dyn PeerSender, id: &TransferId, reason: String) {
        error!("Transfer {} failed: {}", id, reason);
        let Some(counterpart) = self.counterpart_of(id).cloned() else {
            return;
        };
        let error = SessionError::TransferChunkError {
            id: id.clone(),
            reason,
        };
        if let Err(e) = self.finish(id, TransferStatus::Failed, Some(&error.to_string()), None) {
            warn!("Failed to fail {}: {}", id, e);
            return;
        }

        let cancel = ChannelPayload::transfer_action(TransferAction::Cancel, id.clone());
        let _ = Self::send_payload(sender, &counterpart, &cancel).await;
    }

    /// Moves a transfer into a terminal state, drops it from the active set
    /// and publishes the matching event.
    fn finish(
        &mut self,
        id: &TransferId,
        status: TransferStatus,
        error: Option<&str>,
        data: Option<Bytes>,
    ) -> Result<FileTransferRecord> {
        let Some(mut transfer) = self.active.remove(id) else {
            return Err(SessionError::UnknownTransfer(id.clone()));
        };
        if let Err(e) = transfer.record.transition(status) {
            self.active.insert(id.clone(), transfer);
            return Err(e.into());
        }
        transfer.record.error = error.map(str::to_owned);
        self.outbound_queue.retain(|queued| queued != id);

        let record = transfer.record;
        self.finished.push(record.clone());
        let event = match status {
            TransferStatus::Completed => {
                info!("Transfer {} completed", id);
                SessionEvent::TransferCompleted {
                    record: record.clone(),
                    data,
                }
            }
            TransferStatus::Rejected => SessionEvent::TransferRejected(record.clone()),
            TransferStatus::Cancelled => SessionEvent::TransferCancelled(record.clone()),
            _ => SessionEvent::TransferFailed(record.clone()),
        };
        self.bus.publish(event);
        Ok(record)
    }
}
