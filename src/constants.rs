//! Configuration constants for the higher/lower game
//!
//! This module contains the limits and tunables shared by the authoritative
//! lobby and by every client, so both sides agree on round timing, name
//! lengths and scoring.

/// Session registry limits
pub mod session {
    /// Maximum number of simultaneously connected sessions
    pub const MAX_CLIENTS: usize = 100;
}

/// Room configuration constants
pub mod room {
    /// Maximum number of rooms that may exist at once
    pub const MAX_ROOMS: usize = 20;
    /// Maximum number of players seated in a single room
    pub const MAX_PLAYERS: usize = 50;
    /// Maximum length of a room name in characters
    pub const MAX_NAME_LENGTH: usize = 64;
    /// Name given to rooms created without one
    pub const DEFAULT_NAME: &str = "Game Room";
}

/// Player configuration constants
pub mod player {
    /// Maximum length of a player name in characters
    pub const MAX_NAME_LENGTH: usize = 32;
    /// Prefix of the name given to players who join without one
    pub const DEFAULT_NAME_PREFIX: &str = "Player_";
}

/// Game length constants
pub mod game {
    /// Requests below this many rounds fall back to [`DEFAULT_ROUNDS`]
    pub const MIN_ROUNDS: u32 = 5;
    /// Requests above this many rounds are clamped down to it
    pub const MAX_ROUNDS: u32 = 50;
    /// Number of rounds used when the request is out of range
    pub const DEFAULT_ROUNDS: u32 = 10;
}

/// Round timing constants, in seconds
pub mod round {
    /// Default time a participant has to answer
    pub const DEFAULT_DURATION: u64 = 15;
    /// Minimum configurable answer time
    pub const MIN_DURATION: u64 = 5;
    /// Maximum configurable answer time
    pub const MAX_DURATION: u64 = 240;
    /// Default extra time the server waits past the deadline for forced answers
    pub const DEFAULT_DEADLINE_GRACE: u64 = 2;
    /// Maximum configurable deadline grace
    pub const MAX_DEADLINE_GRACE: u64 = 10;
    /// Default time round results stay on screen before the next round
    pub const DEFAULT_RESULTS_DISPLAY: u64 = 3;
    /// Maximum configurable results display time
    pub const MAX_RESULTS_DISPLAY: u64 = 30;
}

/// Scoring constants
pub mod scoring {
    /// Points for an instant correct answer; a correct answer at the
    /// deadline earns half of this
    pub const POINTS_AWARDED: u64 = 100;
}

/// Item catalog constants
pub mod catalog {
    /// Maximum number of items loaded from a catalog source
    pub const MAX_ITEMS: usize = 100;
}
