//! Session identity and push tunnels
//!
//! The server side pushes frames to each connected participant through a
//! [`Tunnel`]. The client side keeps the identifier it was handed during the
//! push handshake in a [`Session`], backed by an [`IdentityStore`] so that it
//! survives reloads.

use serde::{Deserialize, Serialize};

use crate::protocol::Frame;

/// Server-assigned identifier of a connected participant
///
/// Identifiers are handed out in increasing order starting from 1 and are
/// never reused while the server runs.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the raw numeric value carried on the wire
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Trait for pushing frames to one connected participant
///
/// Implementations might use Server-Sent Events, WebSockets, or an in-process
/// queue in tests.
pub trait Tunnel {
    /// Pushes a frame to the participant
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to push
    fn send_frame(&self, frame: &Frame);

    /// Closes the push stream
    fn close(self);
}

/// Durable slot holding the participant's identifier across reloads
pub trait IdentityStore {
    /// Returns the persisted identifier, if any
    fn load(&self) -> Option<SessionId>;

    /// Persists a new identifier, replacing the previous one
    fn save(&mut self, id: SessionId);
}

/// An [`IdentityStore`] that lives only as long as the process
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    id: Option<SessionId>,
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<SessionId> {
        self.id
    }

    fn save(&mut self, id: SessionId) {
        self.id = Some(id);
    }
}

/// The client's view of its own identity
///
/// The identifier only changes through [`Session::capture`], which the push
/// channel calls once per handshake.
#[derive(Debug)]
pub struct Session<S: IdentityStore> {
    store: S,
    id: Option<SessionId>,
}

impl<S: IdentityStore> Session<S> {
    /// Creates a session, restoring any identifier the store already holds
    pub fn new(store: S) -> Self {
        let id = store.load();
        Self { store, id }
    }

    /// Current identifier, or `None` before the first handshake
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// Records the identifier issued by a fresh handshake
    ///
    /// # Returns
    ///
    /// `true` if the identifier differs from the one previously held
    pub fn capture(&mut self, id: SessionId) -> bool {
        let changed = self.id != Some(id);
        self.id = Some(id);
        self.store.save(id);
        changed
    }

    /// Gives access to the backing store
    pub fn store(&self) -> &S {
        &self.store
    }
}
