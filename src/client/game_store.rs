//! Round and game reconciliation
//!
//! Tracks the local participant's view of the running game: the current pair
//! of items, whether this participant answered, its own score and streak, and
//! the results of the last closed round. Each operation is a reducer taking
//! the previous state by value; events that do not belong to the current room
//! and round leave the state untouched.
//!
//! The store keeps one invariant at all times: round results are only held
//! while the local participant counts as having answered. "Waiting for other
//! players" is therefore `has_answered && round_results.is_none()`.

use crate::protocol::{
    AnswerOutcome, PlayerSnapshot, RoomId, RoundResult, RoundResults, RoundStart, StateView,
};

/// Local view of the running game
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    /// Room the game belongs to
    pub room_id: Option<RoomId>,
    /// Current round, 1-based; 0 before the first round
    pub round: u32,
    /// Label of the known item
    pub label_a: String,
    /// Value of the known item
    pub value_a: i64,
    /// Label of the hidden item
    pub label_b: String,
    /// Picture of the known item
    pub image_a: Option<String>,
    /// Picture of the hidden item
    pub image_b: Option<String>,
    /// Value of the hidden item once revealed
    pub value_b: Option<i64>,
    /// Own total score
    pub score: u64,
    /// Own streak
    pub streak: u32,
    /// Whether this participant answered the current round
    pub has_answered: bool,
    /// Whether the game is over for this participant
    pub game_over: bool,
    /// Players still to answer, as of the last own answer
    pub waiting_for: usize,
    /// Verdict of the last own answer
    pub message: String,
    /// Results of the current round once it closed
    pub round_results: Option<RoundResults>,
}

impl GameState {
    /// Whether this state tracks the given round of the given room
    pub fn is_current(&self, room_id: RoomId, round: u32) -> bool {
        self.room_id == Some(room_id) && self.round == round
    }

    /// Whether this participant answered and the round is still open
    pub fn waiting_for_others(&self) -> bool {
        self.has_answered && self.round_results.is_none()
    }

    /// Entry of one player in the current round's results
    pub fn result_of(&self, name: &str) -> Option<&RoundResult> {
        self.round_results
            .as_ref()
            .and_then(|results| results.results.iter().find(|r| r.name == name))
    }

    /// Installs a new round
    ///
    /// Accepted only when no game is tracked yet, the round belongs to another
    /// room, or it is later than the current round. Round 1 starts a fresh
    /// game, clearing score and streak.
    #[must_use]
    pub fn apply_round_start(self, start: &RoundStart) -> Self {
        let same_room = self.room_id == Some(start.room.id);
        if same_room && start.round <= self.round {
            return self;
        }
        let fresh_game = !same_room || start.round == 1;
        Self {
            room_id: Some(start.room.id),
            round: start.round,
            label_a: start.label_a.clone(),
            value_a: start.value_a,
            label_b: start.label_b.clone(),
            image_a: start.image_a.clone(),
            image_b: start.image_b.clone(),
            value_b: None,
            has_answered: false,
            game_over: false,
            waiting_for: 0,
            message: String::new(),
            round_results: None,
            score: if fresh_game { 0 } else { self.score },
            streak: if fresh_game { 0 } else { self.streak },
        }
    }

    /// Records the server's feedback on this participant's own answer
    #[must_use]
    pub fn apply_own_answer(self, outcome: &AnswerOutcome) -> Self {
        if self.room_id.is_none() || outcome.round != self.round {
            return self;
        }
        Self {
            score: outcome.score,
            streak: outcome.streak,
            game_over: outcome.game_over,
            waiting_for: outcome.waiting_for,
            value_b: Some(outcome.value_b),
            message: outcome.message.clone(),
            has_answered: true,
            ..self
        }
    }

    /// Installs the results of the current round
    ///
    /// Results close the round for this participant even if its own answer
    /// has not been confirmed yet. Score and streak are left alone.
    #[must_use]
    pub fn apply_round_results(self, results: &RoundResults) -> Self {
        if !self.is_current(results.room_id, results.round) {
            return self;
        }
        Self {
            value_b: Some(results.value_b),
            has_answered: true,
            round_results: Some(results.clone()),
            ..self
        }
    }

    /// Takes score and streak from an authoritative roster entry
    #[must_use]
    pub fn apply_standing(self, player: &PlayerSnapshot) -> Self {
        if self.room_id.is_none() {
            return self;
        }
        Self {
            score: player.score,
            streak: player.streak,
            ..self
        }
    }

    /// Resynchronizes from a state query
    ///
    /// The server's view replaces the local one, except that a round whose
    /// results are already held stays answered.
    #[must_use]
    pub fn apply_state_view(self, view: &StateView) -> Self {
        let Some(room) = view.room.as_ref().filter(|_| view.in_room) else {
            return self;
        };
        if self.room_id.is_some_and(|id| id != room.id) {
            return self;
        }
        let Some(round) = view.round.filter(|round| *round >= self.round) else {
            return Self {
                room_id: Some(room.id),
                score: view.my_score,
                streak: view.my_streak,
                game_over: view.my_game_over || self.game_over,
                ..self
            };
        };

        let base = if round == self.round {
            self
        } else {
            Self {
                round,
                value_b: None,
                message: String::new(),
                round_results: None,
                waiting_for: 0,
                ..self
            }
        };
        Self {
            room_id: Some(room.id),
            label_a: view.label_a.clone().unwrap_or(base.label_a),
            value_a: view.value_a.unwrap_or(base.value_a),
            label_b: view.label_b.clone().unwrap_or(base.label_b),
            score: view.my_score,
            streak: view.my_streak,
            game_over: view.my_game_over,
            has_answered: view.has_answered || base.round_results.is_some(),
            ..base
        }
    }

    /// Marks the game as over
    #[must_use]
    pub fn finish(self) -> Self {
        Self {
            game_over: true,
            ..self
        }
    }

    /// Returns to the initial empty state
    #[must_use]
    pub fn reset(self) -> Self {
        Self::default()
    }
}
