use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct TransferId(pub String);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TransferId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Accepted,
    Rejected,
    Transferring,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed
                | TransferStatus::Failed
                | TransferStatus::Rejected
                | TransferStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;

        match (self, next) {
            (Pending, Accepted) | (Pending, Rejected) => true,
            (Accepted, Transferring) => true,
            (Transferring, Completed) => true,
            (Pending | Accepted | Transferring, Cancelled) => true,
            (Pending | Accepted | Transferring, Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer {id}: cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub id: TransferId,
    pub from: TransferStatus,
    pub to: TransferStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub transfer_id: TransferId,
    pub index: u32,
    pub size: u32,
    pub checksum: Option<[u8; 32]>,
}

/// Number of chunks needed for `file_size` bytes: `ceil(file_size / chunk_size)`.
/// `None` for a zero chunk size or a count that does not fit in a `u32`.
pub fn chunk_count(file_size: u64, chunk_size: u32) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(file_size.div_ceil(u64::from(chunk_size))).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file_size} bytes cannot be split into chunks of {chunk_size} bytes")]
pub struct ChunkLayoutError {
    pub file_size: u64,
    pub chunk_size: u32,
}

/// `completed / total * 100`, rounded. An empty transfer is complete at 100.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((f64::from(completed) / f64::from(total)) * 100.0).round() as u8
}

pub fn chunk_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferRecord {
    pub id: TransferId,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub sender_id: PeerId,
    pub receiver_id: PeerId,
    pub status: TransferStatus,
    pub progress: u8,
    pub chunk_size: u32,
    pub total_chunks: u32,
    /// Descriptors of the chunks moved so far, in index order.
    pub chunks: Vec<ChunkDescriptor>,
    pub error: Option<String>,
}

impl FileTransferRecord {
    pub fn new(
        id: TransferId,
        file_name: String,
        file_size: u64,
        mime_type: String,
        sender_id: PeerId,
        receiver_id: PeerId,
        chunk_size: u32,
    ) -> Result<Self, ChunkLayoutError> {
        let total_chunks = chunk_count(file_size, chunk_size).ok_or(ChunkLayoutError {
            file_size,
            chunk_size,
        })?;

        Ok(Self {
            id,
            file_name,
            file_size,
            mime_type,
            sender_id,
            receiver_id,
            status: TransferStatus::Pending,
            progress: 0,
            chunk_size,
            total_chunks,
            chunks: Vec::new(),
            error: None,
        })
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Expected descriptor of chunk `index`, without a checksum.
    pub fn descriptor(&self, index: u32) -> Option<ChunkDescriptor> {
        if index >= self.total_chunks {
            return None;
        }
        let offset = u64::from(index) * u64::from(self.chunk_size);
        let size = (self.file_size - offset).min(u64::from(self.chunk_size)) as u32;
        Some(ChunkDescriptor {
            transfer_id: self.id.clone(),
            index,
            size,
            checksum: None,
        })
    }

    /// Byte range of chunk `index` within the file.
    pub fn chunk_range(&self, index: u32) -> Option<std::ops::Range<usize>> {
        let chunk = self.descriptor(index)?;
        let start = usize::try_from(u64::from(index) * u64::from(self.chunk_size)).ok()?;
        Some(start..start + chunk.size as usize)
    }

    /// The peer on the other end, seen from `local`.
    pub fn counterpart(&self, local: &PeerId) -> &PeerId {
        if &self.sender_id == local {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn transition(&mut self, next: TransferStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == TransferStatus::Completed {
            self.progress = 100;
        }
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TransferStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Records progress while transferring. Returns true if it moved.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        if self.status != TransferStatus::Transferring {
            return false;
        }
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }
}
