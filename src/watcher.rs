//! Connected session management
//!
//! This module tracks every session connected to the lobby, whether each one
//! holds a seat in a room, and fans frames out to the sessions of a room
//! through their tunnels.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::{
    constants,
    protocol::{Frame, RoomId},
    session::{SessionId, Tunnel},
};

/// Where a connected session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Connected, browsing the room list
    Lobby,
    /// Holding a seat in a room
    Seated(RoomId),
}

/// Errors that can occur when managing watchers
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The lobby has reached the maximum number of connected sessions
    #[error("maximum number of sessions reached")]
    MaximumSessions,
}

/// Registry of connected sessions
///
/// Keeps a reverse mapping from room to seated sessions so that room
/// broadcasts never scan the whole registry.
#[derive(Debug, Default)]
pub struct Watchers {
    /// Primary mapping from session to its location
    mapping: HashMap<SessionId, Value>,
    /// Seated sessions per room
    reverse_mapping: HashMap<RoomId, HashSet<SessionId>>,
}

impl Watchers {
    /// Registers a newly connected session in the lobby
    ///
    /// # Errors
    ///
    /// Returns `Error::MaximumSessions` if the registry is full.
    pub fn add_watcher(&mut self, watcher_id: SessionId) -> Result<(), Error> {
        if self.mapping.len() >= constants::session::MAX_CLIENTS {
            return Err(Error::MaximumSessions);
        }
        self.mapping.insert(watcher_id, Value::Lobby);
        Ok(())
    }

    /// Checks if a session is registered
    pub fn has_watcher(&self, watcher_id: SessionId) -> bool {
        self.mapping.contains_key(&watcher_id)
    }

    /// Number of registered sessions
    pub fn count(&self) -> usize {
        self.mapping.len()
    }

    /// Forgets a session
    ///
    /// # Returns
    ///
    /// Where the session was, if it was registered
    pub fn remove_watcher(&mut self, watcher_id: SessionId) -> Option<Value> {
        let value = self.mapping.remove(&watcher_id)?;
        if let Value::Seated(room_id) = value {
            self.forget_seat(watcher_id, room_id);
        }
        Some(value)
    }

    /// Room the session is seated in
    pub fn room_of(&self, watcher_id: SessionId) -> Option<RoomId> {
        match self.mapping.get(&watcher_id) {
            Some(Value::Seated(room_id)) => Some(*room_id),
            _ => None,
        }
    }

    /// Moves a registered session into a room
    ///
    /// Unregistered sessions are ignored.
    pub fn seat(&mut self, watcher_id: SessionId, room_id: RoomId) {
        let Some(value) = self.mapping.get_mut(&watcher_id) else {
            return;
        };
        let previous = std::mem::replace(value, Value::Seated(room_id));
        if let Value::Seated(previous_room) = previous {
            self.forget_seat(watcher_id, previous_room);
        }
        self.reverse_mapping
            .entry(room_id)
            .or_default()
            .insert(watcher_id);
    }

    /// Moves a session back to the lobby
    pub fn unseat(&mut self, watcher_id: SessionId) {
        let Some(value) = self.mapping.get_mut(&watcher_id) else {
            return;
        };
        if let Value::Seated(room_id) = std::mem::replace(value, Value::Lobby) {
            self.forget_seat(watcher_id, room_id);
        }
    }

    fn forget_seat(&mut self, watcher_id: SessionId, room_id: RoomId) {
        if let Some(seated) = self.reverse_mapping.get_mut(&room_id) {
            seated.remove(&watcher_id);
            if seated.is_empty() {
                self.reverse_mapping.remove(&room_id);
            }
        }
    }

    /// Sessions seated in a room, in ascending order
    pub fn seated(&self, room_id: RoomId) -> Vec<SessionId> {
        self.reverse_mapping
            .get(&room_id)
            .map(|seated| seated.iter().copied().sorted().collect_vec())
            .unwrap_or_default()
    }

    /// Sends a frame to a specific session
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to send
    /// * `watcher_id` - The session to send to
    /// * `tunnel_finder` - Function to retrieve the tunnel for the session
    pub fn send_frame<T: Tunnel, F: Fn(SessionId) -> Option<T>>(
        &self,
        frame: &Frame,
        watcher_id: SessionId,
        tunnel_finder: F,
    ) {
        let Some(tunnel) = tunnel_finder(watcher_id) else {
            return;
        };

        tunnel.send_frame(frame);
    }

    /// Broadcasts a frame to every session seated in a room
    ///
    /// Sessions without a live tunnel are skipped.
    pub fn announce_room<T: Tunnel, F: Fn(SessionId) -> Option<T>>(
        &self,
        room_id: RoomId,
        frame: &Frame,
        tunnel_finder: F,
    ) {
        for watcher_id in self.seated(room_id) {
            self.send_frame(frame, watcher_id, &tunnel_finder);
        }
    }

    /// Closes a session's tunnel
    pub fn close_session<T: Tunnel, F: Fn(SessionId) -> Option<T>>(
        &self,
        watcher_id: SessionId,
        tunnel_finder: F,
    ) {
        if let Some(tunnel) = tunnel_finder(watcher_id) {
            tunnel.close();
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, collections::HashMap, rc::Rc};

    use super::*;
    use crate::protocol::Handshake;

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        frames: Rc<RefCell<Vec<Frame>>>,
        closed: Rc<RefCell<bool>>,
    }

    impl Tunnel for MockTunnel {
        fn send_frame(&self, frame: &Frame) {
            self.frames.borrow_mut().push(frame.clone());
        }

        fn close(self) {
            *self.closed.borrow_mut() = true;
        }
    }

    fn id(n: u64) -> SessionId {
        SessionId::from(n)
    }

    fn room(n: u64) -> RoomId {
        RoomId::from(n)
    }

    #[test]
    fn test_add_and_remove() {
        let mut watchers = Watchers::default();
        watchers.add_watcher(id(1)).unwrap();
        assert!(watchers.has_watcher(id(1)));
        assert_eq!(watchers.count(), 1);
        assert_eq!(watchers.remove_watcher(id(1)), Some(Value::Lobby));
        assert!(!watchers.has_watcher(id(1)));
        assert_eq!(watchers.remove_watcher(id(1)), None);
    }

    #[test]
    fn test_maximum_sessions() {
        let mut watchers = Watchers::default();
        for n in 0..constants::session::MAX_CLIENTS as u64 {
            watchers.add_watcher(id(n + 1)).unwrap();
        }
        assert_eq!(
            watchers.add_watcher(id(1000)),
            Err(Error::MaximumSessions)
        );
    }

    #[test]
    fn test_seat_moves_between_rooms() {
        let mut watchers = Watchers::default();
        watchers.add_watcher(id(1)).unwrap();
        watchers.add_watcher(id(2)).unwrap();

        watchers.seat(id(1), room(1));
        watchers.seat(id(2), room(1));
        assert_eq!(watchers.seated(room(1)), vec![id(1), id(2)]);
        assert_eq!(watchers.room_of(id(1)), Some(room(1)));

        watchers.seat(id(1), room(2));
        assert_eq!(watchers.seated(room(1)), vec![id(2)]);
        assert_eq!(watchers.seated(room(2)), vec![id(1)]);

        watchers.unseat(id(2));
        assert!(watchers.seated(room(1)).is_empty());
        assert_eq!(watchers.room_of(id(2)), None);

        assert_eq!(watchers.remove_watcher(id(1)), Some(Value::Seated(room(2))));
        assert!(watchers.seated(room(2)).is_empty());
    }

    #[test]
    fn test_seat_unknown_session_is_ignored() {
        let mut watchers = Watchers::default();
        watchers.seat(id(9), room(1));
        assert!(watchers.seated(room(1)).is_empty());
    }

    #[test]
    fn test_announce_room_reaches_only_seated_sessions() {
        let mut watchers = Watchers::default();
        let tunnels: HashMap<SessionId, MockTunnel> =
            (1..=3).map(|n| (id(n), MockTunnel::default())).collect();
        for n in 1..=3 {
            watchers.add_watcher(id(n)).unwrap();
        }
        watchers.seat(id(1), room(1));
        watchers.seat(id(2), room(1));

        let frame = Frame::from(Handshake::new(id(1)));
        watchers.announce_room(room(1), &frame, |s| tunnels.get(&s).cloned());

        assert_eq!(tunnels[&id(1)].frames.borrow().len(), 1);
        assert_eq!(tunnels[&id(2)].frames.borrow().len(), 1);
        assert!(tunnels[&id(3)].frames.borrow().is_empty());
    }

    #[test]
    fn test_close_session() {
        let watchers = Watchers::default();
        let tunnel = MockTunnel::default();
        watchers.close_session(id(1), |_| Some(tunnel.clone()));
        assert!(*tunnel.closed.borrow());
    }
}
