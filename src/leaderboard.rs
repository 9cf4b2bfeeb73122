//! Final standings
//!
//! Builds the ranking shown once a game is over from the last room snapshot.
//! Players are ordered by score, highest first; players with equal scores
//! share a position and keep their join order.

use itertools::Itertools;
use serde::Serialize;

use crate::{protocol::PlayerSnapshot, session::SessionId};

/// One row of the final standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// Position in the ranking (1-indexed, shared on ties)
    pub position: usize,
    /// Identifier of the player's session
    pub session_id: SessionId,
    /// Display name
    pub name: String,
    /// Final score
    pub score: u64,
    /// Streak at the end of the game
    pub streak: u32,
}

/// Ranking of the players of a finished game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    standings: Vec<Standing>,
}

impl Leaderboard {
    /// Ranks the given players
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hilo::leaderboard::Leaderboard;
    ///
    /// let leaderboard = Leaderboard::from_players(&[]);
    /// assert!(leaderboard.standings().is_empty());
    /// ```
    pub fn from_players(players: &[PlayerSnapshot]) -> Self {
        let sorted = players
            .iter()
            .sorted_by(|a, b| b.score.cmp(&a.score))
            .collect_vec();

        let mut standings = Vec::with_capacity(sorted.len());
        let mut previous: Option<(u64, usize)> = None;
        for (index, player) in sorted.into_iter().enumerate() {
            let position = match previous {
                Some((score, position)) if score == player.score => position,
                _ => index + 1,
            };
            previous = Some((player.score, position));
            standings.push(Standing {
                position,
                session_id: player.session_id,
                name: player.name.clone(),
                score: player.score,
                streak: player.streak,
            });
        }

        Self { standings }
    }

    /// All rows, best first
    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    /// Players sharing first place
    pub fn winners(&self) -> impl Iterator<Item = &Standing> {
        self.standings.iter().take_while(|s| s.position == 1)
    }

    /// Position of a player, if ranked
    pub fn position(&self, session_id: SessionId) -> Option<usize> {
        self.standings
            .iter()
            .find(|s| s.session_id == session_id)
            .map(|s| s.position)
    }
}
