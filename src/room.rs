//! Authoritative room state
//!
//! A room owns its roster, its lifecycle status and its current round. Every
//! mutation bumps the room's version so that clients can order the snapshots
//! they receive.

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use web_time::Duration;

use crate::{
    catalog::Catalog,
    constants,
    protocol::{
        AnswerOutcome, PlayerSnapshot, RoomId, RoomSnapshot, RoomStatus, RoundResult,
        RoundResults, RoundStart, StateView, SubmitAnswer,
    },
    round::{self, Phase, Round},
    session::SessionId,
};

/// Errors raised by room operations
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Joining a room that already started
    #[error("Room is not accepting players (game in progress)")]
    NotAcceptingPlayers,
    /// Joining a room with no free seat
    #[error("Room is full")]
    Full,
    /// A non-host tried to start the game
    #[error("Only the host can start the game")]
    NotHost,
    /// Starting a game twice
    #[error("Game has already started")]
    AlreadyStarted,
    /// Answering outside a running game
    #[error("No active game found")]
    NoActiveGame,
    /// The caller holds no seat here
    #[error("You are not in any room")]
    NotSeated,
    /// The answer was refused by the round
    #[error(transparent)]
    Round(#[from] round::Error),
}

/// Normalizes a requested game length
///
/// Requests below the minimum fall back to the default length; requests
/// above the maximum are capped.
pub fn clamp_rounds(requested: u32) -> u32 {
    if requested < constants::game::MIN_ROUNDS {
        constants::game::DEFAULT_ROUNDS
    } else {
        requested.min(constants::game::MAX_ROUNDS)
    }
}

/// A seated player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Identifier of the player's session
    pub session_id: SessionId,
    /// Display name
    pub name: String,
    /// Total score in the current game
    pub score: u64,
    /// Consecutive correct answers
    pub streak: u32,
}

impl Player {
    /// A player with no points yet
    pub fn new(session_id: SessionId, name: String) -> Self {
        Self {
            session_id,
            name,
            score: 0,
            streak: 0,
        }
    }

    fn apply(&mut self, answer: &round::Answer) {
        if answer.correct {
            self.score += answer.points;
            self.streak += 1;
        } else {
            self.streak = 0;
        }
    }
}

/// What happened when a resolved round was advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A new round began
    NextRound,
    /// The final round was played
    Finished,
    /// The current round is still open, or there is no game
    NotReady,
}

/// A game room
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    name: String,
    host: SessionId,
    players: Vec<Player>,
    max_players: usize,
    max_rounds: u32,
    status: RoomStatus,
    round: Option<Round>,
    round_duration: Duration,
    version: u64,
}

impl Room {
    /// Opens a room with its creator seated as host
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier of the new room
    /// * `name` - Display name, already validated
    /// * `host` - The creator
    /// * `max_rounds` - Requested game length, clamped with [`clamp_rounds`]
    /// * `max_players` - Seat limit
    /// * `round_duration` - Answer time per round
    pub fn new(
        id: RoomId,
        name: String,
        host: Player,
        max_rounds: u32,
        max_players: usize,
        round_duration: Duration,
    ) -> Self {
        Self {
            id,
            name,
            host: host.session_id,
            players: vec![host],
            max_players,
            max_rounds: clamp_rounds(max_rounds),
            status: RoomStatus::Waiting,
            round: None,
            round_duration,
            version: 1,
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Room identifier
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Lifecycle status
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Session of the host
    pub fn host(&self) -> SessionId {
        self.host
    }

    /// Version stamp of the latest mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current round, once a game has started
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Seated players in join order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Whether nobody is seated
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Whether the session holds a seat
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.players.iter().any(|p| p.session_id == session_id)
    }

    /// Whether the room shows up in room listings
    pub fn is_listed(&self) -> bool {
        self.status != RoomStatus::Finished
    }

    fn seated(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.players.iter().map(|p| p.session_id)
    }

    /// Seats a new player
    ///
    /// # Errors
    ///
    /// * `Error::NotAcceptingPlayers` - The game already started
    /// * `Error::Full` - No free seat
    pub fn join(&mut self, player: Player) -> Result<(), Error> {
        if self.status != RoomStatus::Waiting {
            return Err(Error::NotAcceptingPlayers);
        }
        if self.players.len() >= self.max_players {
            return Err(Error::Full);
        }
        if !self.contains(player.session_id) {
            self.players.push(player);
            self.touch();
        }
        Ok(())
    }

    /// Removes a player, handing the host role to the earliest remaining
    /// player if needed
    ///
    /// # Returns
    ///
    /// The removed player, if they were seated
    pub fn leave(&mut self, session_id: SessionId) -> Option<Player> {
        let (index, _) = self
            .players
            .iter()
            .find_position(|p| p.session_id == session_id)?;
        let player = self.players.remove(index);
        if self.host == session_id {
            if let Some(next) = self.players.first() {
                self.host = next.session_id;
            }
        }
        self.touch();
        Some(player)
    }

    /// Starts the game
    ///
    /// Scores and streaks reset and round 1 is drawn.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Caller, must be the host
    /// * `catalog` - Item pool
    /// * `rng` - Random source
    /// * `deadline` - Time until the first round must close
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - Caller is not the host
    /// * `Error::AlreadyStarted` - The room is not waiting
    pub fn start(
        &mut self,
        session_id: SessionId,
        catalog: &Catalog,
        rng: &mut fastrand::Rng,
        deadline: Duration,
    ) -> Result<(), Error> {
        if self.host != session_id {
            return Err(Error::NotHost);
        }
        if self.status != RoomStatus::Waiting {
            return Err(Error::AlreadyStarted);
        }
        for player in &mut self.players {
            player.score = 0;
            player.streak = 0;
        }
        self.status = RoomStatus::Playing;
        self.round = Some(Round::first(catalog, rng, deadline));
        self.touch();
        Ok(())
    }

    /// Records and scores a player's answer to the current round
    ///
    /// # Errors
    ///
    /// * `Error::NoActiveGame` - No game is running
    /// * `Error::NotSeated` - Caller holds no seat
    /// * `Error::Round` - The round refused the answer
    pub fn answer(
        &mut self,
        session_id: SessionId,
        submission: SubmitAnswer,
    ) -> Result<AnswerOutcome, Error> {
        let round_duration = self.round_duration;
        let playing = self.status == RoomStatus::Playing;
        let Some(round) = self.round.as_mut().filter(|_| playing) else {
            return Err(Error::NoActiveGame);
        };
        let Some(player) = self
            .players
            .iter_mut()
            .find(|p| p.session_id == session_id)
        else {
            return Err(Error::NotSeated);
        };

        let answer = round.record(
            session_id,
            submission.choice,
            Duration::from_millis(submission.response_time_ms),
            round_duration,
        )?;
        player.apply(&answer);

        let value_b = round.item_b().value;
        let verdict = if answer.correct {
            "Correct!"
        } else if answer.timed_out {
            "Time's up!"
        } else {
            "Wrong!"
        };
        let message = format!("{}: ${value_b} - {verdict}", round.item_b().label);
        let outcome = AnswerOutcome {
            round: round.index(),
            correct: answer.correct,
            score: player.score,
            streak: player.streak,
            message,
            value_b,
            waiting_for: 0,
            response_time_ms: answer.response_time.as_millis() as u64,
            game_over: round.index() >= self.max_rounds,
        };
        self.touch();
        Ok(AnswerOutcome {
            waiting_for: self.waiting_for(),
            ..outcome
        })
    }

    /// Number of seated players that have not answered the current round
    pub fn waiting_for(&self) -> usize {
        self.round
            .as_ref()
            .map_or(0, |round| round.missing(self.seated()))
    }

    /// Whether the current round is open and every seated player answered
    pub fn round_complete(&self) -> bool {
        self.round
            .as_ref()
            .is_some_and(|round| round.phase() == Phase::Open && self.waiting_for() == 0)
    }

    /// Closes the current round
    ///
    /// Only the first call for a round does anything: seated players without
    /// an answer are recorded as timed out and the results are returned.
    /// Later calls return `None`.
    pub fn resolve_round(&mut self) -> Option<RoundResults> {
        let round_duration = self.round_duration;
        let round = self.round.as_mut()?;
        if self.status != RoomStatus::Playing || !round.change_phase(Phase::Open, Phase::Resolved)
        {
            return None;
        }

        let mut results = Vec::with_capacity(self.players.len());
        for player in &mut self.players {
            let answer = match round.answer(player.session_id) {
                Some(answer) => *answer,
                None => {
                    let answer = round.record_timeout(player.session_id, round_duration);
                    player.apply(&answer);
                    answer
                }
            };
            results.push(RoundResult {
                session_id: player.session_id,
                name: player.name.clone(),
                correct: answer.correct,
                timed_out: answer.timed_out,
                response_time_ms: answer.response_time.as_millis() as u64,
                score_delta: answer.points,
                score: player.score,
                streak: player.streak,
            });
        }

        let results = RoundResults {
            room_id: self.id,
            round: round.index(),
            value_b: round.item_b().value,
            label_b: round.item_b().label.clone(),
            results,
        };
        self.touch();
        Some(results)
    }

    /// Moves past a resolved round
    ///
    /// Draws the next round, or finishes the game after the last one.
    pub fn advance(
        &mut self,
        catalog: &Catalog,
        rng: &mut fastrand::Rng,
        deadline: Duration,
    ) -> Advance {
        let Some(round) = self.round.as_ref() else {
            return Advance::NotReady;
        };
        if self.status != RoomStatus::Playing || round.phase() != Phase::Resolved {
            return Advance::NotReady;
        }
        if round.index() >= self.max_rounds {
            self.status = RoomStatus::Finished;
            self.touch();
            Advance::Finished
        } else {
            self.round = Some(round.next(catalog, rng, deadline));
            self.touch();
            Advance::NextRound
        }
    }

    /// Full snapshot of the room
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id,
            name: self.name.clone(),
            host_session_id: self.host,
            player_count: self.players.len(),
            max_players: self.max_players,
            max_rounds: self.max_rounds,
            status: self.status,
            current_round: self.round.as_ref().map_or(0, Round::index),
            version: self.version,
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    session_id: p.session_id,
                    name: p.name.clone(),
                    score: p.score,
                    streak: p.streak,
                    has_answered: self
                        .round
                        .as_ref()
                        .is_some_and(|round| round.has_answered(p.session_id)),
                    is_host: p.session_id == self.host,
                })
                .collect_vec(),
        }
    }

    /// Announcement of the current round
    pub fn round_start(&self) -> Option<RoundStart> {
        let round = self.round.as_ref()?;
        Some(RoundStart {
            room: self.snapshot(),
            round: round.index(),
            label_a: round.item_a().label.clone(),
            value_a: round.item_a().value,
            label_b: round.item_b().label.clone(),
            image_a: round.item_a().image_url.clone(),
            image_b: round.item_b().image_url.clone(),
        })
    }

    /// The room, round and own progress as seen by one player
    pub fn state_view(&self, session_id: SessionId) -> StateView {
        let Some(player) = self.players.iter().find(|p| p.session_id == session_id) else {
            return StateView::default();
        };
        let round = self
            .round
            .as_ref()
            .filter(|_| self.status == RoomStatus::Playing);
        StateView {
            in_room: true,
            is_host: self.host == session_id,
            room: Some(self.snapshot()),
            round: round.map(Round::index),
            my_score: player.score,
            my_streak: player.streak,
            my_game_over: self.status == RoomStatus::Finished,
            has_answered: round.is_some_and(|round| round.has_answered(session_id)),
            label_a: round.map(|round| round.item_a().label.clone()),
            value_a: round.map(|round| round.item_a().value),
            label_b: round.map(|round| round.item_b().label.clone()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{catalog::Item, protocol::Choice};

    const ROUND: Duration = Duration::from_secs(15);
    const DEADLINE: Duration = Duration::from_secs(17);

    fn id(n: u64) -> SessionId {
        SessionId::from(n)
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Item {
                label: "Low".to_owned(),
                value: 100,
                image_url: None,
            },
            Item {
                label: "High".to_owned(),
                value: 200,
                image_url: None,
            },
        ])
        .unwrap()
    }

    fn room_with(count: u64, max_rounds: u32) -> Room {
        let mut room = Room::new(
            RoomId::from(1),
            "Game Room".to_owned(),
            Player::new(id(1), "A".to_owned()),
            max_rounds,
            3,
            ROUND,
        );
        for n in 2..=count {
            room.join(Player::new(id(n), format!("P{n}"))).unwrap();
        }
        room
    }

    fn started(count: u64, max_rounds: u32) -> Room {
        let mut room = room_with(count, max_rounds);
        room.start(id(1), &catalog(), &mut fastrand::Rng::with_seed(3), DEADLINE)
            .unwrap();
        room
    }

    fn right_choice(room: &Room) -> Choice {
        let round = room.round().unwrap();
        if round.item_b().value >= round.item_a().value {
            Choice::Higher
        } else {
            Choice::Lower
        }
    }

    fn submit(choice: Choice, ms: u64) -> SubmitAnswer {
        SubmitAnswer {
            choice,
            response_time_ms: ms,
        }
    }

    #[test]
    fn test_clamp_rounds() {
        assert_eq!(clamp_rounds(0), 10);
        assert_eq!(clamp_rounds(4), 10);
        assert_eq!(clamp_rounds(5), 5);
        assert_eq!(clamp_rounds(50), 50);
        assert_eq!(clamp_rounds(51), 50);
    }

    #[test]
    fn test_new_room_snapshot() {
        let snapshot = room_with(1, 5).snapshot();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.player_count, 1);
        assert_eq!(snapshot.host_session_id, id(1));
        assert!(snapshot.players[0].is_host);
        assert_eq!(snapshot.status, RoomStatus::Waiting);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_join_bumps_version_and_respects_capacity() {
        let mut room = room_with(3, 5);
        assert_eq!(room.version(), 3);
        assert_eq!(
            room.join(Player::new(id(4), "D".to_owned())),
            Err(Error::Full)
        );
        assert_eq!(room.version(), 3);
    }

    #[test]
    fn test_join_after_start_is_refused() {
        let mut room = started(2, 5);
        assert_eq!(
            room.join(Player::new(id(3), "C".to_owned())),
            Err(Error::NotAcceptingPlayers)
        );
    }

    #[test]
    fn test_leave_hands_over_host() {
        let mut room = room_with(3, 5);
        let version = room.version();
        assert_eq!(room.leave(id(1)).unwrap().name, "A");
        assert_eq!(room.host(), id(2));
        assert!(room.version() > version);
        assert!(room.snapshot().is_consistent());
        assert!(room.leave(id(1)).is_none());
    }

    #[test]
    fn test_leave_last_player_empties_room() {
        let mut room = room_with(1, 5);
        room.leave(id(1));
        assert!(room.is_empty());
    }

    #[test]
    fn test_start_requires_host_and_waiting() {
        let mut room = room_with(2, 5);
        let catalog = catalog();
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(
            room.start(id(2), &catalog, &mut rng, DEADLINE),
            Err(Error::NotHost)
        );
        room.start(id(1), &catalog, &mut rng, DEADLINE).unwrap();
        assert_eq!(room.status(), RoomStatus::Playing);
        assert_eq!(room.snapshot().current_round, 1);
        assert_eq!(
            room.start(id(1), &catalog, &mut rng, DEADLINE),
            Err(Error::AlreadyStarted)
        );
    }

    #[test]
    fn test_answer_before_start() {
        let mut room = room_with(2, 5);
        assert_eq!(
            room.answer(id(1), submit(Choice::Higher, 1000)),
            Err(Error::NoActiveGame)
        );
    }

    #[test]
    fn test_answer_outcome() {
        let mut room = started(2, 5);
        let choice = right_choice(&room);
        let outcome = room.answer(id(1), submit(choice, 2000)).unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.streak, 1);
        assert_eq!(outcome.score, round::calculate_score(ROUND, Duration::from_secs(2)));
        assert_eq!(outcome.waiting_for, 1);
        assert_eq!(outcome.response_time_ms, 2000);
        assert!(!outcome.game_over);
        assert!(room.snapshot().players[0].has_answered);
        assert!(!room.round_complete());
    }

    #[test]
    fn test_second_answer_does_not_change_score() {
        let mut room = started(2, 5);
        let choice = right_choice(&room);
        let first = room.answer(id(1), submit(choice, 2000)).unwrap();
        assert_eq!(
            room.answer(id(1), submit(choice, 100)),
            Err(Error::Round(round::Error::AlreadyAnswered))
        );
        assert_eq!(room.players()[0].score, first.score);
        assert_eq!(room.players()[0].streak, first.streak);
    }

    #[test]
    fn test_resolve_exactly_once() {
        let mut room = started(2, 5);
        let choice = right_choice(&room);
        room.answer(id(1), submit(choice, 2000)).unwrap();
        room.answer(id(2), submit(choice, 9000)).unwrap();
        assert!(room.round_complete());

        let results = room.resolve_round().unwrap();
        assert_eq!(results.results.len(), 2);
        let score = room.players()[0].score;
        assert!(room.resolve_round().is_none());
        assert_eq!(room.players()[0].score, score);
        assert!(!room.round_complete());
    }

    #[test]
    fn test_resolve_times_out_missing_players() {
        let mut room = started(3, 5);
        let choice = right_choice(&room);
        room.answer(id(1), submit(choice, 1000)).unwrap();
        room.answer(id(2), submit(choice, 1000)).unwrap();
        room.players[2].streak = 4;

        let results = room.resolve_round().unwrap();
        let missing = &results.results[2];
        assert!(missing.timed_out);
        assert!(!missing.correct);
        assert_eq!(missing.score_delta, 0);
        assert_eq!(missing.streak, 0);
        assert_eq!(missing.response_time_ms, 15_000);
        assert_eq!(
            results.value_b,
            room.round().unwrap().item_b().value
        );
    }

    #[test]
    fn test_answer_after_resolution() {
        let mut room = started(2, 5);
        room.resolve_round().unwrap();
        assert_eq!(
            room.answer(id(2), submit(Choice::Higher, 1000)),
            Err(Error::Round(round::Error::RoundClosed))
        );
    }

    #[test]
    fn test_advance_through_game() {
        let mut room = started(1, 5);
        let catalog = catalog();
        let mut rng = fastrand::Rng::with_seed(9);
        assert_eq!(room.advance(&catalog, &mut rng, DEADLINE), Advance::NotReady);

        for expected in 2..=5 {
            room.resolve_round().unwrap();
            assert_eq!(room.advance(&catalog, &mut rng, DEADLINE), Advance::NextRound);
            assert_eq!(room.round().unwrap().index(), expected);
        }
        room.resolve_round().unwrap();
        assert_eq!(room.advance(&catalog, &mut rng, DEADLINE), Advance::Finished);
        assert_eq!(room.status(), RoomStatus::Finished);
        assert!(!room.is_listed());
        assert!(room.resolve_round().is_none());
    }

    #[test]
    fn test_final_answer_reports_game_over() {
        let mut room = started(1, 5);
        let catalog = catalog();
        let mut rng = fastrand::Rng::with_seed(9);
        for _ in 1..5 {
            room.resolve_round().unwrap();
            room.advance(&catalog, &mut rng, DEADLINE);
        }
        let outcome = room.answer(id(1), submit(Choice::Higher, 10)).unwrap();
        assert!(outcome.game_over);
    }

    #[test]
    fn test_version_strictly_increases() {
        let mut room = room_with(1, 5);
        let mut versions = vec![room.version()];
        room.join(Player::new(id(2), "B".to_owned())).unwrap();
        versions.push(room.version());
        room.start(id(1), &catalog(), &mut fastrand::Rng::with_seed(1), DEADLINE)
            .unwrap();
        versions.push(room.version());
        room.answer(id(2), submit(Choice::Lower, 500)).unwrap();
        versions.push(room.version());
        room.resolve_round().unwrap();
        versions.push(room.version());
        room.leave(id(2));
        versions.push(room.version());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_state_view() {
        let mut room = started(2, 5);
        room.answer(id(2), submit(Choice::Lower, 500)).unwrap();
        let view = room.state_view(id(2));
        assert!(view.in_room);
        assert!(!view.is_host);
        assert!(view.has_answered);
        assert_eq!(view.round, Some(1));
        assert_eq!(view.value_a, Some(room.round().unwrap().item_a().value));

        assert!(!room.state_view(id(9)).in_room);
    }
}
