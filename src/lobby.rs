//! The authoritative lobby
//!
//! [`Lobby`] owns every room and every connected session. It services the
//! action endpoints, pushes room events to seated players and reacts to the
//! alarms it schedules for round deadlines and result pauses. It never reads
//! a clock or spawns a timer itself: callers hand it a tunnel finder to reach
//! connected sessions and a scheduler that later feeds alarms back through
//! [`Lobby::receive_alarm`].

use std::collections::BTreeMap;

use garde::Validate;
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};
use web_time::Duration;

use crate::{
    AlarmMessage,
    catalog::Catalog,
    config::LobbyOptions,
    names,
    protocol::{
        ActionRequest, ActionResponse, CreateRoom, ErrorBody, Event, Frame, Handshake, JoinRoom,
        Method, RoomId, RoomStatus, RoomUpdate, SubmitAnswer,
    },
    room::{self, Advance, Player, Room},
    round::Phase,
    session::{SessionId, Tunnel},
    watcher::{self, Watchers},
};

/// Reasons an action is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The request carried no known session
    #[error("No session ID")]
    NoSession,
    /// Creating or joining while already seated
    #[error("You are already in a room")]
    AlreadySeated,
    /// The room table is full
    #[error("Server is full, no room slots available")]
    ServerFull,
    /// A room identifier of zero
    #[error("Invalid room ID")]
    InvalidRoomId,
    /// No room with that identifier
    #[error("Room not found")]
    RoomNotFound,
    /// The caller holds no seat
    #[error("You are not in any room")]
    NotInRoom,
    /// The request could not be decoded or failed validation
    #[error("{0}")]
    InvalidRequest(String),
    /// A requested name was refused
    #[error(transparent)]
    Name(#[from] names::Error),
    /// The room refused the operation
    #[error(transparent)]
    Room(#[from] room::Error),
}

/// The authoritative game server state
#[derive(Debug)]
pub struct Lobby {
    options: LobbyOptions,
    catalog: Catalog,
    rng: fastrand::Rng,
    watchers: Watchers,
    rooms: BTreeMap<RoomId, Room>,
    next_session: u64,
    next_room: u64,
}

impl Lobby {
    /// Creates an empty lobby
    ///
    /// # Arguments
    ///
    /// * `options` - Validated lobby options
    /// * `catalog` - Item pool rounds are drawn from
    pub fn new(options: LobbyOptions, catalog: Catalog) -> Self {
        Self::with_rng(options, catalog, fastrand::Rng::new())
    }

    /// Creates an empty lobby drawing items from the given random source
    pub fn with_rng(options: LobbyOptions, catalog: Catalog, rng: fastrand::Rng) -> Self {
        Self {
            options,
            catalog,
            rng,
            watchers: Watchers::default(),
            rooms: BTreeMap::new(),
            next_session: 1,
            next_room: 1,
        }
    }

    /// Options the lobby runs with
    pub fn options(&self) -> &LobbyOptions {
        &self.options
    }

    /// Looks up a room
    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Room the session is seated in
    pub fn room_of(&self, session_id: SessionId) -> Option<RoomId> {
        self.watchers.room_of(session_id)
    }

    /// Number of open rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Registers a new push connection
    ///
    /// The caller attaches a tunnel under the returned session identifier and
    /// pushes the handshake as the connection's first frame.
    ///
    /// # Errors
    ///
    /// Returns `watcher::Error::MaximumSessions` if the lobby is full.
    pub fn connect(&mut self) -> Result<Handshake, watcher::Error> {
        let session_id = SessionId::from(self.next_session);
        self.watchers.add_watcher(session_id)?;
        self.next_session += 1;
        info!(session = %session_id, "session connected");
        Ok(Handshake::new(session_id))
    }

    /// Drops a push connection
    ///
    /// A seated session gives up its seat exactly as if it had left.
    pub fn disconnect<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: SessionId,
        mut schedule_message: S,
        tunnel_finder: F,
    ) where
        S: FnMut(AlarmMessage, Duration),
    {
        if self.watchers.room_of(session_id).is_some() {
            self.unseat(session_id, &mut schedule_message, &tunnel_finder);
        }
        self.watchers.close_session(session_id, &tunnel_finder);
        if self.watchers.remove_watcher(session_id).is_some() {
            info!(session = %session_id, "session disconnected");
        }
    }

    /// Services a raw endpoint call and renders the JSON reply
    ///
    /// # Arguments
    ///
    /// * `session_id` - Value of the session header, if present and numeric
    /// * `method` - HTTP method
    /// * `path` - Endpoint path
    /// * `body` - Request body, possibly empty
    /// * `schedule_message` - Function to schedule alarms
    /// * `tunnel_finder` - Function to find a session's push tunnel
    ///
    /// # Returns
    ///
    /// The success payload, or `{"error": reason}`
    pub fn handle_endpoint<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: Option<SessionId>,
        method: Method,
        path: &str,
        body: &str,
        schedule_message: S,
        tunnel_finder: F,
    ) -> String
    where
        S: FnMut(AlarmMessage, Duration),
    {
        let reply = ActionRequest::decode(method, path, body)
            .map_err(|e| ActionError::InvalidRequest(e.to_string()))
            .and_then(|request| {
                self.handle(session_id, request, schedule_message, tunnel_finder)
            });
        match reply {
            Ok(response) => response.to_message(),
            Err(error) => ErrorBody::new(error).to_message(),
        }
    }

    /// Services one action
    ///
    /// # Errors
    ///
    /// Returns the [`ActionError`] describing why the action was refused; a
    /// refused action changes nothing.
    pub fn handle<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: Option<SessionId>,
        request: ActionRequest,
        mut schedule_message: S,
        tunnel_finder: F,
    ) -> Result<ActionResponse, ActionError>
    where
        S: FnMut(AlarmMessage, Duration),
    {
        if matches!(request, ActionRequest::ListRooms) {
            return Ok(self.list_rooms());
        }
        let session_id = session_id
            .filter(|id| self.watchers.has_watcher(*id))
            .ok_or(ActionError::NoSession)?;

        match request {
            ActionRequest::ListRooms => Ok(self.list_rooms()),
            ActionRequest::CreateRoom(request) => self.create_room(session_id, &request),
            ActionRequest::JoinRoom(request) => {
                self.join_room(session_id, &request, &tunnel_finder)
            }
            ActionRequest::LeaveRoom => {
                if self.watchers.room_of(session_id).is_none() {
                    return Err(ActionError::NotInRoom);
                }
                let message = if self.unseat(session_id, &mut schedule_message, &tunnel_finder)
                {
                    "Room deleted (empty)"
                } else {
                    "Left room successfully"
                };
                Ok(ActionResponse::RoomLeft {
                    message: message.to_owned(),
                })
            }
            ActionRequest::StartGame => {
                self.start_game(session_id, &mut schedule_message, &tunnel_finder)
            }
            ActionRequest::SubmitAnswer(request) => self.submit_answer(
                session_id,
                request,
                &mut schedule_message,
                &tunnel_finder,
            ),
            ActionRequest::QueryState => {
                let room = self.seated_room(session_id)?;
                Ok(ActionResponse::RoomInfo(room.state_view(session_id)))
            }
        }
    }

    fn seated_room(&self, session_id: SessionId) -> Result<&Room, ActionError> {
        self.watchers
            .room_of(session_id)
            .and_then(|room_id| self.rooms.get(&room_id))
            .ok_or(ActionError::NotInRoom)
    }

    fn list_rooms(&self) -> ActionResponse {
        ActionResponse::RoomList {
            rooms: self
                .rooms
                .values()
                .filter(|room| room.is_listed())
                .map(Room::snapshot)
                .collect_vec(),
        }
    }

    fn create_room(
        &mut self,
        session_id: SessionId,
        request: &CreateRoom,
    ) -> Result<ActionResponse, ActionError> {
        if self.watchers.room_of(session_id).is_some() {
            return Err(ActionError::AlreadySeated);
        }
        if self.rooms.len() >= self.options.max_rooms {
            return Err(ActionError::ServerFull);
        }
        request
            .validate()
            .map_err(|report| ActionError::InvalidRequest(report.to_string()))?;
        let room_name = names::room_name(&request.room_name)?;
        let player_name = names::player_name(&request.player_name, session_id)?;

        let room_id = RoomId::from(self.next_room);
        self.next_room += 1;
        let room = Room::new(
            room_id,
            room_name,
            Player::new(session_id, player_name),
            request.max_rounds,
            self.options.max_players_per_room,
            self.options.round_duration,
        );
        let snapshot = room.snapshot();
        self.rooms.insert(room_id, room);
        self.watchers.seat(session_id, room_id);
        info!(room = %room_id, host = %session_id, max_rounds = snapshot.max_rounds, "room created");

        Ok(ActionResponse::RoomCreated { room: snapshot })
    }

    fn join_room<T: Tunnel, F: Fn(SessionId) -> Option<T>>(
        &mut self,
        session_id: SessionId,
        request: &JoinRoom,
        tunnel_finder: &F,
    ) -> Result<ActionResponse, ActionError> {
        if self.watchers.room_of(session_id).is_some() {
            return Err(ActionError::AlreadySeated);
        }
        if request.room_id.get() == 0 {
            return Err(ActionError::InvalidRoomId);
        }
        request
            .validate()
            .map_err(|report| ActionError::InvalidRequest(report.to_string()))?;
        let room = self
            .rooms
            .get_mut(&request.room_id)
            .ok_or(ActionError::RoomNotFound)?;
        let player_name = names::player_name(&request.player_name, session_id)?;
        room.join(Player::new(session_id, player_name))?;
        let snapshot = room.snapshot();

        self.watchers.seat(session_id, request.room_id);
        info!(room = %request.room_id, session = %session_id, players = snapshot.player_count, "player joined");
        self.watchers.announce_room(
            request.room_id,
            &Event::PlayerJoined(RoomUpdate {
                room: snapshot.clone(),
            })
            .into(),
            tunnel_finder,
        );

        Ok(ActionResponse::RoomJoined { room: snapshot })
    }

    /// Removes a seated session from its room
    ///
    /// # Returns
    ///
    /// `true` if the room was deleted because it became empty
    fn unseat<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: SessionId,
        schedule_message: &mut S,
        tunnel_finder: &F,
    ) -> bool
    where
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(room_id) = self.watchers.room_of(session_id) else {
            return false;
        };
        self.watchers.unseat(session_id);
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        room.leave(session_id);

        if room.is_empty() {
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room deleted");
            return true;
        }

        info!(room = %room_id, session = %session_id, host = %room.host(), "player left");
        let snapshot = room.snapshot();
        let barrier_met = room.round_complete();
        self.watchers.announce_room(
            room_id,
            &Event::PlayerLeft(RoomUpdate { room: snapshot }).into(),
            tunnel_finder,
        );
        if barrier_met {
            self.close_round(room_id, schedule_message, tunnel_finder);
        }
        false
    }

    fn start_game<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: SessionId,
        schedule_message: &mut S,
        tunnel_finder: &F,
    ) -> Result<ActionResponse, ActionError>
    where
        S: FnMut(AlarmMessage, Duration),
    {
        let room_id = self
            .watchers
            .room_of(session_id)
            .ok_or(ActionError::NotInRoom)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(ActionError::NotInRoom)?;
        let deadline = self.options.deadline();
        room.start(session_id, &self.catalog, &mut self.rng, deadline)?;
        let Some(round_start) = room.round_start() else {
            return Err(room::Error::NoActiveGame.into());
        };

        info!(room = %room_id, players = round_start.room.player_count, "game started");
        schedule_message(
            AlarmMessage::RoundDeadline {
                room_id,
                round: round_start.round,
            },
            deadline,
        );
        self.watchers.announce_room(
            room_id,
            &Event::GameStarted(round_start.clone()).into(),
            tunnel_finder,
        );

        Ok(ActionResponse::GameStarted(round_start))
    }

    fn submit_answer<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        session_id: SessionId,
        request: SubmitAnswer,
        schedule_message: &mut S,
        tunnel_finder: &F,
    ) -> Result<ActionResponse, ActionError>
    where
        S: FnMut(AlarmMessage, Duration),
    {
        let room_id = self
            .watchers
            .room_of(session_id)
            .ok_or(ActionError::NotInRoom)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(ActionError::NotInRoom)?;
        let outcome = room.answer(session_id, request)?;
        debug!(
            room = %room_id,
            session = %session_id,
            round = outcome.round,
            correct = outcome.correct,
            waiting_for = outcome.waiting_for,
            "answer recorded"
        );

        let snapshot = room.snapshot();
        let barrier_met = room.round_complete();
        self.watchers.announce_room(
            room_id,
            &Event::PlayerUpdate(RoomUpdate { room: snapshot }).into(),
            tunnel_finder,
        );
        if barrier_met {
            self.close_round(room_id, schedule_message, tunnel_finder);
        }

        Ok(ActionResponse::ChoiceResult(outcome))
    }

    /// Resolves the current round of a room and broadcasts its results
    ///
    /// Does nothing if the round was already resolved.
    fn close_round<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        room_id: RoomId,
        schedule_message: &mut S,
        tunnel_finder: &F,
    ) where
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(results) = self
            .rooms
            .get_mut(&room_id)
            .and_then(Room::resolve_round)
        else {
            return;
        };

        info!(
            room = %room_id,
            round = results.round,
            correct = results.results.iter().filter(|r| r.correct).count(),
            timed_out = results.results.iter().filter(|r| r.timed_out).count(),
            "round resolved"
        );
        let round = results.round;
        self.watchers.announce_room(
            room_id,
            &Event::RoundResults(results).into(),
            tunnel_finder,
        );

        if self.options.results_display.is_zero() {
            self.advance_room(room_id, schedule_message, tunnel_finder);
        } else {
            schedule_message(
                AlarmMessage::NextRound { room_id, round },
                self.options.results_display,
            );
        }
    }

    fn advance_room<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        room_id: RoomId,
        schedule_message: &mut S,
        tunnel_finder: &F,
    ) where
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let deadline = self.options.deadline();
        match room.advance(&self.catalog, &mut self.rng, deadline) {
            Advance::NextRound => {
                let Some(round_start) = room.round_start() else {
                    return;
                };
                debug!(room = %room_id, round = round_start.round, "round started");
                schedule_message(
                    AlarmMessage::RoundDeadline {
                        room_id,
                        round: round_start.round,
                    },
                    deadline,
                );
                self.watchers.announce_room(
                    room_id,
                    &Event::NewRound(round_start).into(),
                    tunnel_finder,
                );
            }
            Advance::Finished => {
                info!(room = %room_id, "game finished");
                let frame: Frame = Event::GameFinished(RoomUpdate {
                    room: room.snapshot(),
                })
                .into();
                self.watchers.announce_room(room_id, &frame, tunnel_finder);
            }
            Advance::NotReady => (),
        }
    }

    /// Handles an alarm previously handed to the scheduler
    ///
    /// Alarms naming a room that no longer exists, or a round other than the
    /// room's current one, are stale and ignored.
    pub fn receive_alarm<T: Tunnel, F: Fn(SessionId) -> Option<T>, S>(
        &mut self,
        message: &AlarmMessage,
        mut schedule_message: S,
        tunnel_finder: F,
    ) where
        S: FnMut(AlarmMessage, Duration),
    {
        let (room_id, round, phase) = match *message {
            AlarmMessage::RoundDeadline { room_id, round } => (room_id, round, Phase::Open),
            AlarmMessage::NextRound { room_id, round } => (room_id, round, Phase::Resolved),
        };
        let current = self.rooms.get(&room_id).filter(|room| {
            room.status() == RoomStatus::Playing
                && room
                    .round()
                    .is_some_and(|r| r.index() == round && r.phase() == phase)
        });
        if current.is_none() {
            debug!(room = %room_id, round, "ignoring stale alarm");
            return;
        }

        match message {
            AlarmMessage::RoundDeadline { .. } => {
                debug!(room = %room_id, round, "round deadline reached");
                self.close_round(room_id, &mut schedule_message, &tunnel_finder);
            }
            AlarmMessage::NextRound { .. } => {
                self.advance_room(room_id, &mut schedule_message, &tunnel_finder);
            }
        }
    }
}
