//! A single higher/lower round on the server
//!
//! A round pairs a known item A with a hidden item B, collects at most one
//! answer per player and closes exactly once, either when the last seated
//! player answers or when its deadline alarm fires. The close is a guarded
//! phase transition so that whichever trigger comes second is a no-op.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use web_time::{Duration, SystemTime};

use crate::{
    catalog::{Catalog, Item},
    protocol::Choice,
    session::SessionId,
};

/// Phase of a round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Accepting answers
    #[default]
    Open,
    /// Closed; results have been computed
    Resolved,
}

/// Reasons an answer is refused
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The player already answered this round
    #[error("Already answered. Waiting for other players.")]
    AlreadyAnswered,
    /// The round was resolved or its deadline passed
    #[error("Round is closed")]
    RoundClosed,
}

/// A recorded answer and how it was judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    /// The guess, `None` if the player never answered
    pub choice: Option<Choice>,
    /// Time taken, capped at the round duration
    pub response_time: Duration,
    /// Whether the answer was right
    pub correct: bool,
    /// Whether the player ran out of time
    pub timed_out: bool,
    /// Points earned
    pub points: u64,
}

impl Answer {
    /// Judges a submitted answer
    ///
    /// Answers taking the whole round duration or longer count as timeouts
    /// and are never correct, whatever the choice.
    pub fn judge(
        choice: Choice,
        reported: Duration,
        round_duration: Duration,
        value_a: i64,
        value_b: i64,
    ) -> Self {
        let timed_out = reported >= round_duration;
        let response_time = reported.min(round_duration);
        let correct = !timed_out && choice.is_correct(value_a, value_b);
        Self {
            choice: Some(choice),
            response_time,
            correct,
            timed_out,
            points: if correct {
                calculate_score(round_duration, response_time)
            } else {
                0
            },
        }
    }

    /// The answer recorded for a player the deadline caught without one
    pub fn timeout(round_duration: Duration) -> Self {
        Self {
            choice: None,
            response_time: round_duration,
            correct: false,
            timed_out: true,
            points: 0,
        }
    }
}

/// Points for a correct answer given after `taken_duration`
///
/// Decreases linearly from the full award for an instant answer to half of
/// it at the end of the round.
pub fn calculate_score(full_duration: Duration, taken_duration: Duration) -> u64 {
    let full_points_awarded = crate::constants::scoring::POINTS_AWARDED;
    if full_duration.is_zero() {
        return full_points_awarded;
    }
    let taken = taken_duration.min(full_duration);
    (full_points_awarded as f64
        * (1. - (taken.as_secs_f64() / full_duration.as_secs_f64() / 2.))) as u64
}

/// The current round of a room
#[derive(Debug, Clone)]
pub struct Round {
    index: u32,
    index_a: usize,
    item_a: Item,
    index_b: usize,
    item_b: Item,
    deadline: SystemTime,
    answers: HashMap<SessionId, Answer>,
    phase: Phase,
}

impl Round {
    /// Draws the first round of a game
    ///
    /// # Arguments
    ///
    /// * `catalog` - Item pool to draw from
    /// * `rng` - Random source
    /// * `deadline` - Time from now until the round must close
    pub fn first(catalog: &Catalog, rng: &mut fastrand::Rng, deadline: Duration) -> Self {
        let (index_a, item_a) = catalog.draw(None, rng);
        let (index_b, item_b) = catalog.draw(Some(index_a), rng);
        Self::new(1, (index_a, item_a), (index_b, item_b), deadline)
    }

    fn new(index: u32, a: (usize, Item), b: (usize, Item), deadline: Duration) -> Self {
        Self {
            index,
            index_a: a.0,
            item_a: a.1,
            index_b: b.0,
            item_b: b.1,
            deadline: SystemTime::now() + deadline,
            answers: HashMap::new(),
            phase: Phase::Open,
        }
    }

    /// Draws the following round: item B becomes the new item A
    pub fn next(&self, catalog: &Catalog, rng: &mut fastrand::Rng, deadline: Duration) -> Self {
        let (index_b, item_b) = catalog.draw(Some(self.index_b), rng);
        Self::new(
            self.index + 1,
            (self.index_b, self.item_b.clone()),
            (index_b, item_b),
            deadline,
        )
    }

    /// Round index, 1-based
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The known item
    pub fn item_a(&self) -> &Item {
        &self.item_a
    }

    /// The hidden item
    pub fn item_b(&self) -> &Item {
        &self.item_b
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the player answered this round
    pub fn has_answered(&self, session_id: SessionId) -> bool {
        self.answers.contains_key(&session_id)
    }

    /// The player's recorded answer
    pub fn answer(&self, session_id: SessionId) -> Option<&Answer> {
        self.answers.get(&session_id)
    }

    /// Records a player's answer
    ///
    /// # Errors
    ///
    /// * `Error::RoundClosed` - The round is resolved or past its deadline
    /// * `Error::AlreadyAnswered` - The player already answered
    pub fn record(
        &mut self,
        session_id: SessionId,
        choice: Choice,
        reported: Duration,
        round_duration: Duration,
    ) -> Result<Answer, Error> {
        if self.phase != Phase::Open || SystemTime::now() > self.deadline {
            return Err(Error::RoundClosed);
        }
        if self.answers.contains_key(&session_id) {
            return Err(Error::AlreadyAnswered);
        }
        let answer = Answer::judge(
            choice,
            reported,
            round_duration,
            self.item_a.value,
            self.item_b.value,
        );
        self.answers.insert(session_id, answer);
        Ok(answer)
    }

    /// Records a timeout for a player who never answered
    pub fn record_timeout(&mut self, session_id: SessionId, round_duration: Duration) -> Answer {
        *self
            .answers
            .entry(session_id)
            .or_insert_with(|| Answer::timeout(round_duration))
    }

    /// Number of the given players still missing an answer
    pub fn missing<I: IntoIterator<Item = SessionId>>(&self, seated: I) -> usize {
        seated
            .into_iter()
            .filter(|id| !self.answers.contains_key(id))
            .count()
    }

    /// Attempts to transition from one phase to another
    ///
    /// # Returns
    ///
    /// `true` if the transition was successful, `false` if the current phase
    /// didn't match `before`
    pub fn change_phase(&mut self, before: Phase, after: Phase) -> bool {
        if self.phase == before {
            self.phase = after;

            true
        } else {
            false
        }
    }
}
