//! Room reconciliation
//!
//! Holds the client's cached copy of the room it sits in, plus the last room
//! listing fetched in the lobby. Snapshots reach the store from two paths
//! (action responses and the push channel) in no guaranteed order, so every
//! snapshot is applied through [`RoomStore::apply_snapshot`], which only moves
//! the cache forward in version order.

use crate::{
    protocol::{RoomId, RoomSnapshot},
    session::SessionId,
};

/// Outcome of offering a snapshot to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The snapshot replaced the cached room
    Replaced,
    /// The snapshot was not newer than the cached room and was ignored
    Stale,
}

/// Cached room state of one client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStore {
    current: Option<RoomSnapshot>,
    listing: Vec<RoomSnapshot>,
}

impl RoomStore {
    /// The room the client sits in
    pub fn current(&self) -> Option<&RoomSnapshot> {
        self.current.as_ref()
    }

    /// Identifier of the room the client sits in
    pub fn current_id(&self) -> Option<RoomId> {
        self.current.as_ref().map(|room| room.id)
    }

    /// Rooms from the last successful listing
    pub fn listing(&self) -> &[RoomSnapshot] {
        &self.listing
    }

    /// Whether the cached room names the session as its host
    pub fn is_host(&self, session_id: SessionId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|room| room.host_session_id == session_id)
    }

    /// Offers an authoritative snapshot
    ///
    /// A snapshot of another room always replaces the cache. A snapshot of the
    /// cached room replaces it only if its version is strictly greater, so
    /// re-delivery of the same snapshot and late echoes are no-ops.
    #[must_use]
    pub fn apply_snapshot(self, snapshot: RoomSnapshot) -> (Self, Applied) {
        let stale = self
            .current
            .as_ref()
            .is_some_and(|held| held.id == snapshot.id && snapshot.version <= held.version);
        if stale {
            (self, Applied::Stale)
        } else {
            (
                Self {
                    current: Some(snapshot),
                    ..self
                },
                Applied::Replaced,
            )
        }
    }

    /// Replaces the lobby listing
    #[must_use]
    pub fn with_listing(self, listing: Vec<RoomSnapshot>) -> Self {
        Self { listing, ..self }
    }

    /// Forgets the cached room, keeping the listing
    #[must_use]
    pub fn leave(self) -> Self {
        Self {
            current: None,
            ..self
        }
    }
}
