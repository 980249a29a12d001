use dashmap::DashMap;
use peerlink_core::{PeerId, RoomId};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room {0} is full")]
    RoomFull(RoomId),
    #[error("room id must not be empty")]
    EmptyRoomId,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// Members present before the join, the joiner excluded.
    pub existing: Vec<PeerId>,
    /// The room the peer was in before, with whoever is still there.
    pub previous: Option<Departure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub remaining: Vec<PeerId>,
}

struct RoomsInner {
    rooms: DashMap<RoomId, BTreeSet<PeerId>>,
    memberships: DashMap<PeerId, RoomId>,
    max_room_size: usize,
}

/// Room membership for every connected session. A session is in at most
/// one room and a room lives exactly as long as it has members.
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<RoomsInner>,
}

impl RoomManager {
    /// `max_room_size` of 0 means unbounded.
    pub fn new(max_room_size: usize) -> Self {
        Self {
            inner: Arc::new(RoomsInner {
                rooms: DashMap::new(),
                memberships: DashMap::new(),
                max_room_size,
            }),
        }
    }

    pub fn join(&self, peer_id: &PeerId, room_id: &RoomId) -> Result<Joined, JoinError> {
        if room_id.as_str().is_empty() {
            return Err(JoinError::EmptyRoomId);
        }

        let limit = self.inner.max_room_size;
        let is_full = |members: &BTreeSet<PeerId>| {
            limit > 0 && !members.contains(peer_id) && members.len() >= limit
        };
        if self.inner.rooms.get(room_id).is_some_and(|m| is_full(&m)) {
            return Err(JoinError::RoomFull(room_id.clone()));
        }

        let previous = match self.room_of(peer_id) {
            Some(current) if &current == room_id => None,
            Some(_) => self.leave(peer_id),
            None => None,
        };

        let existing = {
            let mut members = self.inner.rooms.entry(room_id.clone()).or_default();
            if is_full(&members) {
                return Err(JoinError::RoomFull(room_id.clone()));
            }
            if members.is_empty() {
                info!("Creating new room: {}", room_id);
            }
            members.insert(peer_id.clone());
            members
                .iter()
                .filter(|m| *m != peer_id)
                .cloned()
                .collect()
        };
        self.inner
            .memberships
            .insert(peer_id.clone(), room_id.clone());

        Ok(Joined { existing, previous })
    }

    /// Removes the peer from its room. The room is disposed once empty.
    pub fn leave(&self, peer_id: &PeerId) -> Option<Departure> {
        let (_, room_id) = self.inner.memberships.remove(peer_id)?;

        let remaining: Vec<PeerId> = {
            let mut members = self.inner.rooms.get_mut(&room_id)?;
            members.remove(peer_id);
            members.iter().cloned().collect()
        };

        if self
            .inner
            .rooms
            .remove_if(&room_id, |_, members| members.is_empty())
            .is_some()
        {
            info!("Disposing empty room: {}", room_id);
        }

        Some(Departure { room_id, remaining })
    }

    pub fn room_of(&self, peer_id: &PeerId) -> Option<RoomId> {
        self.inner.memberships.get(peer_id).map(|r| r.value().clone())
    }

    /// True when both peers are members of the same room.
    pub fn share_room(&self, a: &PeerId, b: &PeerId) -> bool {
        match (self.room_of(a), self.room_of(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    pub fn members(&self, room_id: &RoomId) -> Vec<PeerId> {
        self.inner
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }
}
