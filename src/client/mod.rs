//! Participant-side reconciliation engine
//!
//! [`Client`] keeps one participant's view of its room and round consistent
//! with the lobby. Push frames, action responses and countdown alarms all
//! mutate the same stores, one at a time, through the reducers in
//! [`room_store`] and [`game_store`]. The screen follows from what those
//! inputs report.
//!
//! The client never sleeps or spawns: arming a round countdown hands a
//! [`timer::TimerAlarm`] to the caller's scheduler, and the caller feeds it
//! back through [`Client::expire`].

pub mod action;
pub mod channel;
pub mod game_store;
pub mod room_store;
pub mod screen;
pub mod timer;

use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

use crate::{
    config::ClientOptions,
    leaderboard::Leaderboard,
    names,
    protocol::{
        AnswerOutcome, Choice, CreateRoom, Event, JoinRoom, RoomId, RoomSnapshot, RoomStatus,
        RoundStart, SubmitAnswer,
    },
    session::{IdentityStore, Session, SessionId},
};

use self::{
    action::{ActionClient, ClientError, Transport},
    channel::{Inbound, PushChannel},
    game_store::GameState,
    room_store::{Applied, RoomStore},
    screen::{Screen, ScreenEvent},
    timer::{RoundKey, RoundTimer, TimerAlarm},
};

/// One participant
#[derive(Debug)]
pub struct Client<T, S: IdentityStore> {
    options: ClientOptions,
    session: Session<S>,
    channel: PushChannel,
    actions: ActionClient<T>,
    rooms: RoomStore,
    game: GameState,
    timer: RoundTimer,
    screen: Screen,
    player_name: Option<String>,
}

impl<T: Transport, S: IdentityStore> Client<T, S> {
    /// Creates a client on the name entry screen
    ///
    /// # Arguments
    ///
    /// * `options` - Validated client options
    /// * `transport` - Carrier of action calls
    /// * `store` - Durable slot for the session identifier
    pub fn new(options: ClientOptions, transport: T, store: S) -> Self {
        Self {
            options,
            session: Session::new(store),
            channel: PushChannel::default(),
            actions: ActionClient::new(transport),
            rooms: RoomStore::default(),
            game: GameState::default(),
            timer: RoundTimer::new(options.round_duration),
            screen: Screen::default(),
            player_name: None,
        }
    }

    /// Current session identifier
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.id()
    }

    /// Whether the push stream is up
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Active screen
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Display name chosen on the name entry screen
    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    /// Cached room the participant sits in
    pub fn room(&self) -> Option<&RoomSnapshot> {
        self.rooms.current()
    }

    /// Rooms from the last listing
    pub fn rooms(&self) -> &[RoomSnapshot] {
        self.rooms.listing()
    }

    /// Local game state
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Round countdown
    pub fn timer(&self) -> &RoundTimer {
        &self.timer
    }

    /// Action client, for calls outside the participant flow
    pub fn actions(&self) -> &ActionClient<T> {
        &self.actions
    }

    /// Whether the participant hosts its room
    pub fn is_host(&self) -> bool {
        self.session_id().is_some_and(|id| self.rooms.is_host(id))
    }

    /// Final standings, once the game is over
    pub fn leaderboard(&self) -> Option<Leaderboard> {
        self.room()
            .filter(|_| self.screen == Screen::GameOver)
            .map(|room| Leaderboard::from_players(&room.players))
    }

    /// Marks the push stream as (re)established
    pub fn connect(&mut self) {
        self.channel.open();
    }

    /// Marks the push stream as lost
    ///
    /// No state is discarded; a later handshake decides what survives.
    pub fn disconnect(&mut self) {
        if self.channel.is_connected() {
            warn!(session = ?self.session_id(), "push channel closed");
        }
        self.channel.close();
    }

    /// Feeds a chunk of the push stream
    ///
    /// # Arguments
    ///
    /// * `chunk` - Raw `text/event-stream` text
    /// * `now` - Current time
    /// * `schedule_alarm` - Function to schedule round countdown alarms
    pub fn receive_chunk<F>(&mut self, chunk: &str, now: Instant, mut schedule_alarm: F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        for inbound in self.channel.feed(chunk) {
            self.dispatch(inbound, now, &mut schedule_alarm);
        }
    }

    /// Feeds one frame body of the push stream
    pub fn receive_frame<F>(&mut self, text: &str, now: Instant, mut schedule_alarm: F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        if let Some(inbound) = self.channel.receive_frame(text) {
            self.dispatch(inbound, now, &mut schedule_alarm);
        }
    }

    fn dispatch<F>(&mut self, inbound: Inbound, now: Instant, schedule_alarm: &mut F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        match inbound {
            Inbound::Handshake(session_id) => {
                let had_session = self.session.id().is_some();
                if self.session.capture(session_id) && had_session {
                    info!(session = %session_id, "new session issued, returning to lobby");
                    self.return_to_lobby(ScreenEvent::SessionReset);
                } else {
                    info!(session = %session_id, "session established");
                }
            }
            Inbound::Event(event) => self.apply_event(event, now, schedule_alarm),
        }
    }

    fn apply_event<F>(&mut self, event: Event, now: Instant, schedule_alarm: &mut F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        let room_id = event.room_id();
        if self.rooms.current_id() != Some(room_id) {
            debug!(room = %room_id, "dropping event of a room this client is not in");
            return;
        }
        if let Some(room) = event.room() {
            if !self.session_id().is_some_and(|id| room.contains(id)) {
                debug!(room = %room_id, "dropping event of a room without this session");
                return;
            }
            self.apply_room(room.clone());
        }

        match event {
            Event::PlayerJoined(_) | Event::PlayerLeft(_) | Event::PlayerUpdate(_) => (),
            Event::GameStarted(start) | Event::NewRound(start) => {
                self.begin_round(&start, now, schedule_alarm);
            }
            Event::RoundResults(results) => {
                self.game = std::mem::take(&mut self.game).apply_round_results(&results);
                if self.game.is_current(results.room_id, results.round) {
                    self.timer.mark_submitted(RoundKey {
                        room_id: results.room_id,
                        round: results.round,
                    });
                }
            }
            Event::GameFinished(_) => {
                self.game = std::mem::take(&mut self.game).finish();
                self.timer.cancel();
                self.screen = self.screen.next(ScreenEvent::GameFinished);
            }
        }
    }

    fn apply_room(&mut self, room: RoomSnapshot) {
        let me = self.session_id().and_then(|id| room.player(id).cloned());
        let (rooms, applied) = std::mem::take(&mut self.rooms).apply_snapshot(room);
        self.rooms = rooms;
        if applied == Applied::Stale {
            return;
        }
        if let Some(me) = me {
            self.game = std::mem::take(&mut self.game).apply_standing(&me);
        }
    }

    fn begin_round<F>(&mut self, start: &RoundStart, now: Instant, schedule_alarm: &mut F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        self.game = std::mem::take(&mut self.game).apply_round_start(start);
        if !self.game.is_current(start.room.id, start.round) {
            return;
        }
        let key = RoundKey {
            room_id: start.room.id,
            round: start.round,
        };
        if let Some(alarm) = self.timer.arm(key, now) {
            debug!(room = %key.room_id, round = key.round, "round countdown armed");
            schedule_alarm(alarm, self.timer.duration());
        }
        self.screen = self.screen.next(ScreenEvent::GameStarted);
    }

    fn return_to_lobby(&mut self, event: ScreenEvent) {
        self.rooms = std::mem::take(&mut self.rooms).leave();
        self.game = std::mem::take(&mut self.game).reset();
        self.timer.cancel();
        self.screen = self.screen.next(event);
    }

    /// Sets the display name and moves on to the lobby
    ///
    /// # Errors
    ///
    /// Returns the reason the name was refused; the screen does not change.
    pub fn submit_name(&mut self, name: &str) -> Result<(), names::Error> {
        let name = names::entry_name(name)?;
        self.player_name = Some(name);
        self.screen = self.screen.next(ScreenEvent::NameSubmitted);
        Ok(())
    }

    /// Refreshes the room listing
    ///
    /// Failures are logged and leave the previous listing in place.
    pub async fn refresh_rooms(&mut self) {
        match self.actions.list_rooms(self.session_id()).await {
            Ok(listing) => {
                self.rooms = std::mem::take(&mut self.rooms).with_listing(listing);
            }
            Err(error) => warn!(%error, "room listing failed"),
        }
    }

    /// Creates a room and takes its first seat
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the call; state is left unchanged.
    pub async fn create_room(
        &mut self,
        room_name: &str,
        max_rounds: u32,
    ) -> Result<(), ClientError> {
        let request = CreateRoom {
            room_name: room_name.trim().to_owned(),
            player_name: self.player_name.clone().unwrap_or_default(),
            max_rounds,
        };
        let room = self.actions.create_room(self.session_id(), request).await?;
        self.enter_room(room);
        Ok(())
    }

    /// Takes a seat in a waiting room
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the call; state is left unchanged.
    pub async fn join_room(&mut self, room_id: RoomId) -> Result<(), ClientError> {
        let request = JoinRoom {
            room_id,
            player_name: self.player_name.clone().unwrap_or_default(),
        };
        let room = self.actions.join_room(self.session_id(), request).await?;
        self.enter_room(room);
        Ok(())
    }

    fn enter_room(&mut self, room: RoomSnapshot) {
        info!(room = %room.id, players = room.player_count, "entered room");
        self.game = std::mem::take(&mut self.game).reset();
        self.timer.cancel();
        self.apply_room(room);
        self.screen = self.screen.next(ScreenEvent::RoomEntered);
    }

    /// Gives up the current seat and returns to the lobby
    ///
    /// Frames still in flight for the room are discarded once the cached
    /// room is gone, and the room listing is refreshed.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the call; state is left unchanged.
    pub async fn leave_room(&mut self) -> Result<(), ClientError> {
        let room_id = self.rooms.current_id();
        let message = self.actions.leave_room(self.session_id()).await?;
        info!(room = ?room_id, reply = %message, "left room");
        self.return_to_lobby(ScreenEvent::RoomLeft);
        self.refresh_rooms().await;
        Ok(())
    }

    /// Starts the game; only the host may
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the call; state is left unchanged.
    pub async fn start_game<F>(
        &mut self,
        now: Instant,
        mut schedule_alarm: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(TimerAlarm, Duration),
    {
        let start = self.actions.start_game(self.session_id()).await?;
        self.apply_room(start.room.clone());
        self.begin_round(&start, now, &mut schedule_alarm);
        Ok(())
    }

    /// Answers the current round
    ///
    /// The response time is measured from the start of the local countdown.
    ///
    /// # Returns
    ///
    /// The server's feedback, or `None` if there is no open round to answer
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the call. The round counts as answered
    /// even if the call fails; nothing is resubmitted.
    pub async fn answer(
        &mut self,
        choice: Choice,
        now: Instant,
    ) -> Result<Option<AnswerOutcome>, ClientError> {
        let Some(key) = self.open_round() else {
            return Ok(None);
        };
        let elapsed = self.timer.elapsed(now).unwrap_or_default();
        if !self.timer.mark_submitted(key) {
            return Ok(None);
        }
        self.submit(key, choice, elapsed).await.map(Some)
    }

    /// Handles a fired countdown alarm
    ///
    /// The first alarm of an unanswered round submits the configured forced
    /// choice with the full round duration as response time; every other
    /// alarm is ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the forced submission.
    pub async fn expire(
        &mut self,
        alarm: TimerAlarm,
    ) -> Result<Option<AnswerOutcome>, ClientError> {
        if self.open_round() != Some(alarm.key) {
            return Ok(None);
        }
        let Some(key) = self.timer.expire(&alarm) else {
            return Ok(None);
        };
        info!(room = %key.room_id, round = key.round, "countdown ran out, forcing answer");
        self.submit(key, self.options.forced_choice, self.options.round_duration)
            .await
            .map(Some)
    }

    fn open_round(&self) -> Option<RoundKey> {
        let room_id = self.game.room_id?;
        let open = self.screen == Screen::Playing
            && self.game.round > 0
            && !self.game.has_answered
            && !self.game.game_over;
        open.then_some(RoundKey {
            room_id,
            round: self.game.round,
        })
    }

    async fn submit(
        &mut self,
        key: RoundKey,
        choice: Choice,
        response_time: Duration,
    ) -> Result<AnswerOutcome, ClientError> {
        let request = SubmitAnswer {
            choice,
            response_time_ms: response_time.as_millis() as u64,
        };
        let result = self
            .actions
            .submit_answer(self.session_id(), request)
            .await;
        match &result {
            Ok(outcome) if self.game.is_current(key.room_id, outcome.round) => {
                debug!(round = outcome.round, correct = outcome.correct, "answer confirmed");
                self.game = std::mem::take(&mut self.game).apply_own_answer(outcome);
            }
            Ok(_) => debug!(room = %key.room_id, "answer confirmed for a round already left"),
            Err(error) => warn!(%error, round = key.round, "answer failed"),
        }
        result
    }

    /// Resynchronizes room and round state with the lobby
    ///
    /// A round the client had not seen yet gets a fresh countdown, started
    /// at `now`, and the screen catches up with the room's status. Views of
    /// a room other than the cached one are ignored. Failures are logged and
    /// leave the current state in place.
    ///
    /// # Arguments
    ///
    /// * `now` - Current time
    /// * `schedule_alarm` - Function to schedule round countdown alarms
    pub async fn sync_state<F>(&mut self, now: Instant, mut schedule_alarm: F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        let view = match self.actions.query_state(self.session_id()).await {
            Ok(view) => view,
            Err(error) => {
                warn!(%error, "state query failed");
                return;
            }
        };
        let Some(room) = view.room.clone().filter(|_| view.in_room) else {
            return;
        };
        if self.rooms.current_id() != Some(room.id) {
            debug!(room = %room.id, "ignoring state of a room this client is not in");
            return;
        }
        let status = room.status;
        self.apply_room(room);
        self.game = std::mem::take(&mut self.game).apply_state_view(&view);

        match status {
            RoomStatus::Playing => self.resume_round(now, &mut schedule_alarm),
            RoomStatus::Finished => {
                self.game = std::mem::take(&mut self.game).finish();
                self.timer.cancel();
                self.screen = self.screen.next(ScreenEvent::GameFinished);
            }
            RoomStatus::Waiting => (),
        }
    }

    fn resume_round<F>(&mut self, now: Instant, schedule_alarm: &mut F)
    where
        F: FnMut(TimerAlarm, Duration),
    {
        let Some(room_id) = self.game.room_id.filter(|_| self.game.round > 0) else {
            return;
        };
        let key = RoundKey {
            room_id,
            round: self.game.round,
        };
        if let Some(alarm) = self.timer.arm(key, now) {
            debug!(room = %room_id, round = key.round, "round countdown armed on resync");
            schedule_alarm(alarm, self.timer.duration());
        }
        if self.game.has_answered {
            self.timer.mark_submitted(key);
        }
        self.screen = self.screen.next(ScreenEvent::GameStarted);
    }
}
