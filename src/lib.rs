//! # Hilo
//!
//! Round synchronization and state reconciliation for a multiplayer
//! higher/lower comparison game. Participants sit in a shared room and, round
//! after round, guess whether a hidden item is worth more or less than a
//! known one.
//!
//! The crate has two halves that speak the same [`protocol`]:
//!
//! * [`lobby::Lobby`], the authoritative engine. It owns rooms and rounds,
//!   resolves each round exactly once and pushes events to seated sessions.
//! * [`client::Client`], one participant's reconciliation engine. It keeps a
//!   cached view of the room and round consistent with whatever the lobby
//!   pushes or answers, runs the round countdown and derives the active
//!   screen.
//!
//! Neither half owns a clock, a socket or a runtime. Time-based work is
//! expressed as alarms handed to a caller-supplied scheduler, and I/O goes
//! through the [`session::Tunnel`] and [`client::action::Transport`] traits.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use serde::{Deserialize, Serialize};

pub mod constants;

pub mod catalog;
pub mod client;
pub mod config;
pub mod leaderboard;
pub mod lobby;
pub mod names;
pub mod protocol;
pub mod room;
pub mod round;
pub mod session;
pub mod watcher;

/// Alarms the lobby schedules for its own timed transitions
///
/// The lobby hands these to its scheduler together with a delay and expects
/// them back through [`lobby::Lobby::receive_alarm`]. Each alarm names the
/// round it was scheduled for, so an alarm that outlives its round is
/// recognized as stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// The answer window of a round closed
    RoundDeadline {
        /// Room of the round
        room_id: protocol::RoomId,
        /// Round index, 1-based
        round: u32,
    },
    /// The results pause after a round ended
    NextRound {
        /// Room of the round
        room_id: protocol::RoomId,
        /// Index of the round that just ended
        round: u32,
    },
}
