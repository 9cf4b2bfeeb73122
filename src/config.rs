//! Runtime options for the lobby and for clients
//!
//! Both option sets deserialize from JSON with every field optional, fall back
//! to the values in [`crate::constants`], and are checked with `garde` before
//! use.

use garde::Validate;
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::{constants, protocol::Choice};

/// Validation result type for duration validation
type ValidationResult = garde::Result;

/// Validates that a duration falls within the inclusive bounds given in seconds
///
/// # Arguments
///
/// * `field` - Name of the field being validated (for error messages)
/// * `val` - The duration value to validate
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is outside the specified bounds.
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

fn validate_round_duration(val: &Duration) -> ValidationResult {
    validate_duration::<
        { constants::round::MIN_DURATION },
        { constants::round::MAX_DURATION },
    >("round_duration", val)
}

fn validate_deadline_grace(val: &Duration) -> ValidationResult {
    validate_duration::<0, { constants::round::MAX_DEADLINE_GRACE }>("deadline_grace", val)
}

fn validate_results_display(val: &Duration) -> ValidationResult {
    validate_duration::<0, { constants::round::MAX_RESULTS_DISPLAY }>("results_display", val)
}

/// Options of the authoritative lobby
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LobbyOptions {
    /// Time participants have to answer a round
    #[garde(custom(|v, _| validate_round_duration(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub round_duration: Duration,
    /// Extra time past `round_duration` before the server closes a round
    #[garde(custom(|v, _| validate_deadline_grace(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub deadline_grace: Duration,
    /// Pause between a round's results and the next round; zero advances at once
    #[garde(custom(|v, _| validate_results_display(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub results_display: Duration,
    /// Maximum number of rooms open at once
    #[garde(range(min = 1, max = constants::room::MAX_ROOMS))]
    pub max_rooms: usize,
    /// Seats per room
    #[garde(range(min = 1, max = constants::room::MAX_PLAYERS))]
    pub max_players_per_room: usize,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(constants::round::DEFAULT_DURATION),
            deadline_grace: Duration::from_secs(constants::round::DEFAULT_DEADLINE_GRACE),
            results_display: Duration::from_secs(constants::round::DEFAULT_RESULTS_DISPLAY),
            max_rooms: constants::room::MAX_ROOMS,
            max_players_per_room: constants::room::MAX_PLAYERS,
        }
    }
}

impl LobbyOptions {
    /// Time from a round's start until the server resolves it regardless of
    /// missing answers
    pub fn deadline(&self) -> Duration {
        self.round_duration + self.deadline_grace
    }
}

/// Options of a client
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientOptions {
    /// Countdown length; must match the lobby's `round_duration`
    #[garde(custom(|v, _| validate_round_duration(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub round_duration: Duration,
    /// Choice submitted on the participant's behalf when the countdown runs out
    #[garde(skip)]
    pub forced_choice: Choice,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(constants::round::DEFAULT_DURATION),
            forced_choice: Choice::Higher,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_lobby_options_are_valid() {
        let options = LobbyOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.deadline(), Duration::from_secs(17));
    }

    #[test]
    fn test_lobby_options_partial_json() {
        let options: LobbyOptions =
            serde_json::from_str(r#"{"round_duration": 20000, "results_display": 0}"#).unwrap();
        assert_eq!(options.round_duration, Duration::from_secs(20));
        assert_eq!(options.results_display, Duration::ZERO);
        assert_eq!(options.max_rooms, constants::room::MAX_ROOMS);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_lobby_options_round_duration_too_short() {
        let options = LobbyOptions {
            round_duration: Duration::from_secs(constants::round::MIN_DURATION - 1),
            ..LobbyOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_lobby_options_room_cap_out_of_range() {
        let options = LobbyOptions {
            max_rooms: 0,
            ..LobbyOptions::default()
        };
        assert!(options.validate().is_err());

        let options = LobbyOptions {
            max_players_per_room: constants::room::MAX_PLAYERS + 1,
            ..LobbyOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_default_client_options() {
        let options = ClientOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.forced_choice, Choice::Higher);
        assert_eq!(options.round_duration, Duration::from_secs(15));
    }
}
