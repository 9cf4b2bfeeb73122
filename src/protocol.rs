//! Wire schema shared by the lobby and its clients
//!
//! Everything that crosses the network lives here: the snapshots the server
//! broadcasts, the [`Event`] union pushed over the event stream, the
//! [`Frame`] wrapper that also carries the connection handshake, and the
//! request/response bodies of the action endpoints.
//!
//! Incoming frames are decoded with [`Frame::decode`], which rejects anything
//! without a known discriminant or with an inconsistent room snapshot, so the
//! stores behind it only ever see well-formed events.

use std::fmt::Display;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{constants, session::SessionId};

/// Server-assigned identifier of a room
///
/// Room identifiers start at 1 and are never reused, so a frame naming a room
/// the client has left can always be told apart from its current room.
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
pub struct RoomId(u64);

impl RoomId {
    /// Returns the raw numeric value carried on the wire
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle of a room; only ever moves forward
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Accepting players, game not started
    #[default]
    Waiting,
    /// Rounds in progress
    Playing,
    /// All rounds played
    Finished,
}

/// A participant's guess about item B relative to item A
///
/// Encoded on the wire as `1` (higher) or `2` (lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Choice {
    /// Item B is worth at least as much as item A
    Higher,
    /// Item B is worth at most as much as item A
    Lower,
}

/// A choice code outside `{1, 2}`
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid choice {0}, expected 1 (higher) or 2 (lower)")]
pub struct InvalidChoice(u8);

impl TryFrom<u8> for Choice {
    type Error = InvalidChoice;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Higher),
            2 => Ok(Self::Lower),
            other => Err(InvalidChoice(other)),
        }
    }
}

impl From<Choice> for u8 {
    fn from(choice: Choice) -> Self {
        match choice {
            Choice::Higher => 1,
            Choice::Lower => 2,
        }
    }
}

impl Choice {
    /// Whether this guess is right for the given pair
    ///
    /// Equal values make both guesses correct.
    pub fn is_correct(self, value_a: i64, value_b: i64) -> bool {
        match self {
            Self::Higher => value_b >= value_a,
            Self::Lower => value_b <= value_a,
        }
    }
}

/// One seated player as seen by everyone in the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Identifier of the player's session
    pub session_id: SessionId,
    /// Display name
    pub name: String,
    /// Total score in the current game
    pub score: u64,
    /// Consecutive correct answers
    pub streak: u32,
    /// Whether the player has answered the current round
    pub has_answered: bool,
    /// Whether the player hosts the room
    pub is_host: bool,
}

/// Complete authoritative copy of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room identifier
    pub id: RoomId,
    /// Display name
    pub name: String,
    /// Session of the current host
    pub host_session_id: SessionId,
    /// Number of seated players
    pub player_count: usize,
    /// Seat limit
    pub max_players: usize,
    /// Number of rounds in a game
    pub max_rounds: u32,
    /// Lifecycle state
    pub status: RoomStatus,
    /// Current round, 1-based; 0 before the game starts
    pub current_round: u32,
    /// Incremented by the server on every mutation of the room
    pub version: u64,
    /// Seated players in join order
    pub players: Vec<PlayerSnapshot>,
}

impl RoomSnapshot {
    /// Looks up a seated player
    pub fn player(&self, session_id: SessionId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.session_id == session_id)
    }

    /// Whether the session holds a seat in this room
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.player(session_id).is_some()
    }

    /// Checks the structural invariants every server snapshot satisfies
    ///
    /// A snapshot is consistent when it lists at least one player, its
    /// `player_count` matches the roster, exactly one player is flagged host
    /// and that player is `host_session_id`.
    pub fn is_consistent(&self) -> bool {
        let hosts = self.players.iter().filter(|p| p.is_host).collect_vec();
        !self.players.is_empty()
            && self.player_count == self.players.len()
            && hosts.len() == 1
            && hosts[0].session_id == self.host_session_id
            && self.players.iter().map(|p| p.session_id).all_unique()
    }
}

/// Fields announcing a new round
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStart {
    /// Room as of the round's start
    pub room: RoomSnapshot,
    /// Round index, 1-based
    pub round: u32,
    /// Label of the known item
    #[serde(rename = "labelA")]
    pub label_a: String,
    /// Value of the known item
    #[serde(rename = "valueA")]
    pub value_a: i64,
    /// Label of the item whose value is hidden
    #[serde(rename = "labelB")]
    pub label_b: String,
    /// Picture of the known item
    #[serde(rename = "imageA", default)]
    pub image_a: Option<String>,
    /// Picture of the hidden item
    #[serde(rename = "imageB", default)]
    pub image_b: Option<String>,
}

/// One player's outcome for a resolved round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    /// Identifier of the player's session
    pub session_id: SessionId,
    /// Display name
    pub name: String,
    /// Whether the answer was right
    pub correct: bool,
    /// Whether the player ran out of time
    pub timed_out: bool,
    /// Time the player took to answer
    #[serde(rename = "response_time")]
    pub response_time_ms: u64,
    /// Points earned this round
    pub score_delta: u64,
    /// Total score after this round
    pub score: u64,
    /// Streak after this round
    pub streak: u32,
}

/// Aggregated outcome of a round, sent once the round closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResults {
    /// Room the round belongs to
    pub room_id: RoomId,
    /// Round index, 1-based
    pub round: u32,
    /// Revealed value of item B
    #[serde(rename = "valueB")]
    pub value_b: i64,
    /// Label of item B
    #[serde(rename = "labelB")]
    pub label_b: String,
    /// One entry per seated player
    pub results: Vec<RoundResult>,
}

/// Payload of events that only carry the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    /// Room after the change
    pub room: RoomSnapshot,
}

/// Events pushed to every seated player of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Event {
    /// A player took a seat
    PlayerJoined(RoomUpdate),
    /// A player left or disconnected
    PlayerLeft(RoomUpdate),
    /// The host started the game; carries round 1
    GameStarted(RoundStart),
    /// The round barrier closed
    RoundResults(RoundResults),
    /// The next round began
    NewRound(RoundStart),
    /// Scores or answer flags changed
    PlayerUpdate(RoomUpdate),
    /// The final round was resolved
    GameFinished(RoomUpdate),
}

impl Event {
    /// Room the event belongs to
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::PlayerJoined(update)
            | Self::PlayerLeft(update)
            | Self::PlayerUpdate(update)
            | Self::GameFinished(update) => update.room.id,
            Self::GameStarted(start) | Self::NewRound(start) => start.room.id,
            Self::RoundResults(results) => results.room_id,
        }
    }

    /// Room snapshot carried by the event, if any
    pub fn room(&self) -> Option<&RoomSnapshot> {
        match self {
            Self::PlayerJoined(update)
            | Self::PlayerLeft(update)
            | Self::PlayerUpdate(update)
            | Self::GameFinished(update) => Some(&update.room),
            Self::GameStarted(start) | Self::NewRound(start) => Some(&start.room),
            Self::RoundResults(_) => None,
        }
    }

    fn check(&self) -> Result<(), FrameError> {
        if let Some(room) = self.room().filter(|room| !room.is_consistent()) {
            return Err(FrameError::InconsistentRoom(room.id));
        }
        match self {
            Self::GameStarted(start) | Self::NewRound(start) if start.round == 0 => {
                Err(FrameError::InvalidPayload("round index must be 1-based".to_owned()))
            }
            Self::RoundResults(results) if results.round == 0 => {
                Err(FrameError::InvalidPayload("round index must be 1-based".to_owned()))
            }
            _ => Ok(()),
        }
    }
}

/// First frame of every push connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Human-readable greeting
    #[serde(default)]
    pub message: String,
    /// Identifier assigned to this connection
    pub session_id: SessionId,
}

impl Handshake {
    /// Builds the greeting sent to a newly connected session
    pub fn new(session_id: SessionId) -> Self {
        Self {
            message: "Connected to SSE stream".to_owned(),
            session_id,
        }
    }
}

/// Anything pushed over the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::From)]
#[serde(untagged)]
pub enum Frame {
    /// Connection greeting carrying the session identifier
    Handshake(Handshake),
    /// Room event
    Event(Event),
}

/// Reasons an incoming frame is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not a JSON object
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Neither an `action` nor a `session_id` field
    #[error("frame has no discriminant")]
    MissingDiscriminant,
    /// The payload does not match the schema of its kind
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// A room snapshot violating its invariants
    #[error("inconsistent snapshot of room {0}")]
    InconsistentRoom(RoomId),
}

impl Frame {
    /// Decodes and validates one frame body
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the text is not a JSON object, carries no
    /// discriminant, does not match the schema of its kind, or contains an
    /// inconsistent room snapshot.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(FrameError::Malformed("expected an object".to_owned()));
        };

        if object.contains_key("action") {
            let event: Event = serde_json::from_value(value)
                .map_err(|e| FrameError::InvalidPayload(e.to_string()))?;
            event.check()?;
            Ok(Self::Event(event))
        } else if object.contains_key("session_id") {
            let handshake: Handshake = serde_json::from_value(value)
                .map_err(|e| FrameError::InvalidPayload(e.to_string()))?;
            Ok(Self::Handshake(handshake))
        } else {
            Err(FrameError::MissingDiscriminant)
        }
    }

    /// Converts the frame to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// HTTP method of an action endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Method {
    /// Read-only query
    #[display("GET")]
    Get,
    /// State-changing action
    #[display("POST")]
    Post,
}

/// Header carrying the session identifier on every action request
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Body of a create-room request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CreateRoom {
    /// Room name; empty picks the default name
    #[serde(default)]
    #[garde(length(chars, max = constants::room::MAX_NAME_LENGTH))]
    pub room_name: String,
    /// Creator's display name; empty picks a default name
    #[serde(default)]
    #[garde(length(chars, max = constants::player::MAX_NAME_LENGTH))]
    pub player_name: String,
    /// Requested number of rounds, clamped by the server
    #[serde(default)]
    #[garde(skip)]
    pub max_rounds: u32,
}

fn validate_room_id(id: &RoomId, _ctx: &()) -> garde::Result {
    if id.get() == 0 {
        Err(garde::Error::new("Invalid room ID"))
    } else {
        Ok(())
    }
}

/// Body of a join-room request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JoinRoom {
    /// Room to join
    #[garde(custom(validate_room_id))]
    pub room_id: RoomId,
    /// Joining player's display name; empty picks a default name
    #[serde(default)]
    #[garde(length(chars, max = constants::player::MAX_NAME_LENGTH))]
    pub player_name: String,
}

/// Body of an answer submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SubmitAnswer {
    /// The guess
    #[garde(skip)]
    pub choice: Choice,
    /// Time taken since the round started
    #[serde(rename = "response_time")]
    #[garde(skip)]
    pub response_time_ms: u64,
}

/// One call against the action endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    /// List open rooms
    ListRooms,
    /// Create a room and take its first seat as host
    CreateRoom(CreateRoom),
    /// Take a seat in a waiting room
    JoinRoom(JoinRoom),
    /// Give up the current seat
    LeaveRoom,
    /// Start the game (host only)
    StartGame,
    /// Answer the current round
    SubmitAnswer(SubmitAnswer),
    /// Fetch the room, round and own progress
    QueryState,
}

/// Reasons an action request cannot be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No endpoint at this method and path
    #[error("unknown endpoint {0} {1}")]
    UnknownEndpoint(Method, String),
    /// The body does not match the endpoint's schema
    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

impl ActionRequest {
    /// Method and path of the endpoint serving this request
    pub fn endpoint(&self) -> (Method, &'static str) {
        match self {
            Self::ListRooms => (Method::Get, "/rooms"),
            Self::CreateRoom(_) => (Method::Post, "/rooms/create"),
            Self::JoinRoom(_) => (Method::Post, "/rooms/join"),
            Self::LeaveRoom => (Method::Post, "/rooms/leave"),
            Self::StartGame => (Method::Post, "/rooms/start"),
            Self::SubmitAnswer(_) => (Method::Post, "/rooms/choice"),
            Self::QueryState => (Method::Get, "/rooms/info"),
        }
    }

    /// JSON body of the request, if the endpoint takes one
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn body(&self) -> Option<String> {
        fn to_json<T: Serialize>(body: &T) -> String {
            serde_json::to_string(body).expect("default serializer cannot fail")
        }

        match self {
            Self::CreateRoom(body) => Some(to_json(body)),
            Self::JoinRoom(body) => Some(to_json(body)),
            Self::SubmitAnswer(body) => Some(to_json(body)),
            Self::ListRooms | Self::LeaveRoom | Self::StartGame | Self::QueryState => None,
        }
    }

    /// Rebuilds a request from its endpoint and body
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownEndpoint`] for an unserved method and
    /// path, or [`RequestError::InvalidBody`] when the body does not parse.
    pub fn decode(method: Method, path: &str, body: &str) -> Result<Self, RequestError> {
        fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, RequestError> {
            let body = if body.trim().is_empty() { "{}" } else { body };
            serde_json::from_str(body).map_err(|e| RequestError::InvalidBody(e.to_string()))
        }

        match (method, path) {
            (Method::Get, "/rooms") => Ok(Self::ListRooms),
            (Method::Post, "/rooms/create") => parse(body).map(Self::CreateRoom),
            (Method::Post, "/rooms/join") => parse(body).map(Self::JoinRoom),
            (Method::Post, "/rooms/leave") => Ok(Self::LeaveRoom),
            (Method::Post, "/rooms/start") => Ok(Self::StartGame),
            (Method::Post, "/rooms/choice") => parse(body).map(Self::SubmitAnswer),
            (Method::Get, "/rooms/info") => Ok(Self::QueryState),
            (method, path) => Err(RequestError::UnknownEndpoint(method, path.to_owned())),
        }
    }
}

/// Immediate feedback to the player who answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Round the answer was recorded for
    pub round: u32,
    /// Whether the answer was right
    pub correct: bool,
    /// Total score after the answer
    pub score: u64,
    /// Streak after the answer
    pub streak: u32,
    /// Human-readable verdict
    pub message: String,
    /// Revealed value of item B
    #[serde(rename = "valueB")]
    pub value_b: i64,
    /// Seated players that have not answered yet
    pub waiting_for: usize,
    /// Time taken as recorded by the server
    #[serde(rename = "response_time")]
    pub response_time_ms: u64,
    /// Whether this was the final round of the game
    pub game_over: bool,
}

/// Answer to a state query
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateView {
    /// Whether the caller holds a seat
    pub in_room: bool,
    /// Whether the caller hosts the room
    #[serde(default)]
    pub is_host: bool,
    /// The caller's room
    pub room: Option<RoomSnapshot>,
    /// Current round, when a game is running
    pub round: Option<u32>,
    /// Caller's score
    #[serde(default)]
    pub my_score: u64,
    /// Caller's streak
    #[serde(default)]
    pub my_streak: u32,
    /// Whether the caller's game is over
    #[serde(default)]
    pub my_game_over: bool,
    /// Whether the caller answered the current round
    #[serde(default)]
    pub has_answered: bool,
    /// Label of the known item
    #[serde(rename = "labelA")]
    pub label_a: Option<String>,
    /// Value of the known item
    #[serde(rename = "valueA")]
    pub value_a: Option<i64>,
    /// Label of the hidden item
    #[serde(rename = "labelB")]
    pub label_b: Option<String>,
}

/// Success payload of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionResponse {
    /// Open rooms
    RoomList {
        /// Waiting and playing rooms
        rooms: Vec<RoomSnapshot>,
    },
    /// Room created with the caller as host
    RoomCreated {
        /// The new room
        room: RoomSnapshot,
    },
    /// Seat taken
    RoomJoined {
        /// The joined room
        room: RoomSnapshot,
    },
    /// Seat given up
    RoomLeft {
        /// Human-readable confirmation
        message: String,
    },
    /// Game started; carries round 1
    GameStarted(RoundStart),
    /// Answer recorded
    ChoiceResult(AnswerOutcome),
    /// Current state of the caller
    RoomInfo(StateView),
}

impl ActionResponse {
    /// Converts the response to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Body returned for a rejected action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Reason the action was rejected
    pub error: String,
}

impl ErrorBody {
    /// Wraps a rejection reason
    pub fn new(reason: impl Display) -> Self {
        Self {
            error: reason.to_string(),
        }
    }

    /// Converts the body to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
