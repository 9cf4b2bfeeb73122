//! Player and room name validation
//!
//! Names are trimmed, length-checked and run through a profanity filter
//! before anyone else gets to see them. Blank names fall back to defaults on
//! the server side.

use rustrict::CensorStr;
use serde::Serialize;
use thiserror::Error;

use crate::{constants, session::SessionId};

/// Errors that can occur during name validation
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

/// Cleans a non-empty display name
///
/// # Errors
///
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::TooLong` - Name exceeds `max_length` characters
/// * `Error::Sinful` - Name contains inappropriate content
fn clean(name: &str, max_length: usize) -> Result<String, Error> {
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.chars().count() > max_length {
        return Err(Error::TooLong);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    Ok(name.to_owned())
}

/// Validates the name a participant types before entering the lobby
///
/// # Errors
///
/// Same as the server-side checks, plus `Error::Empty` for a blank name.
pub fn entry_name(name: &str) -> Result<String, Error> {
    clean(name, constants::player::MAX_NAME_LENGTH)
}

/// Resolves the name a player is seated under
///
/// A blank request becomes `Player_<session>`.
///
/// # Errors
///
/// * `Error::TooLong` - Name exceeds the player name limit
/// * `Error::Sinful` - Name contains inappropriate content
pub fn player_name(requested: &str, session_id: SessionId) -> Result<String, Error> {
    match clean(requested, constants::player::MAX_NAME_LENGTH) {
        Err(Error::Empty) => Ok(format!(
            "{}{session_id}",
            constants::player::DEFAULT_NAME_PREFIX
        )),
        other => other,
    }
}

/// Resolves the name a room is created under
///
/// A blank request becomes the default room name.
///
/// # Errors
///
/// * `Error::TooLong` - Name exceeds the room name limit
/// * `Error::Sinful` - Name contains inappropriate content
pub fn room_name(requested: &str) -> Result<String, Error> {
    match clean(requested, constants::room::MAX_NAME_LENGTH) {
        Err(Error::Empty) => Ok(constants::room::DEFAULT_NAME.to_owned()),
        other => other,
    }
}
