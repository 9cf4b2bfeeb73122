//! Top-level screen of a client
//!
//! The screen only moves on explicit user intents and authoritative outcomes;
//! timers and scores never drive it. Events that make no sense for the
//! current screen leave it where it is.

use serde::Serialize;

/// Top-level screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Screen {
    /// Choosing a display name
    #[default]
    NameEntry,
    /// Browsing, creating and joining rooms
    Lobby,
    /// Seated in a room that has not started
    WaitingRoom,
    /// Answering rounds
    Playing,
    /// Looking at the final standings
    GameOver,
}

/// Inputs of the screen machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    /// A valid display name was entered
    NameSubmitted,
    /// Creating or joining a room succeeded
    RoomEntered,
    /// The game started
    GameStarted,
    /// The last round was played
    GameFinished,
    /// Leaving the room succeeded
    RoomLeft,
    /// The push channel issued a new session
    SessionReset,
}

impl Screen {
    /// Screen after an event
    #[must_use]
    pub fn next(self, event: ScreenEvent) -> Self {
        match (self, event) {
            (Self::NameEntry, ScreenEvent::NameSubmitted)
            | (
                Self::WaitingRoom | Self::Playing | Self::GameOver,
                ScreenEvent::RoomLeft | ScreenEvent::SessionReset,
            ) => Self::Lobby,
            (Self::Lobby, ScreenEvent::RoomEntered) => Self::WaitingRoom,
            (Self::WaitingRoom, ScreenEvent::GameStarted) => Self::Playing,
            (Self::WaitingRoom | Self::Playing, ScreenEvent::GameFinished) => Self::GameOver,
            (screen, _) => screen,
        }
    }

    /// Whether the client sits in a room on this screen
    pub fn in_room(self) -> bool {
        matches!(self, Self::WaitingRoom | Self::Playing | Self::GameOver)
    }
}
