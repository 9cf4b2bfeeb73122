//! Round countdown
//!
//! One countdown per round, keyed by the room and round it belongs to. The
//! timer itself never sleeps: arming it yields a [`TimerAlarm`] that the
//! caller schedules, and the alarm is handed back through
//! [`RoundTimer::expire`] when it fires. Expiry asks for a forced answer at
//! most once per round, however many times the alarm is delivered.

use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

use crate::protocol::RoomId;

/// Identifies the round a countdown belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundKey {
    /// Room of the round
    pub room_id: RoomId,
    /// Round index, 1-based
    pub round: u32,
}

/// Alarm to deliver back to the timer once the countdown runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerAlarm {
    /// Round the countdown was armed for
    pub key: RoundKey,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    key: RoundKey,
    started: Instant,
    submitted: bool,
}

/// Countdown of the current round
#[derive(Debug, Clone)]
pub struct RoundTimer {
    duration: Duration,
    countdown: Option<Countdown>,
}

impl RoundTimer {
    /// Creates an idle timer with the given countdown length
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            countdown: None,
        }
    }

    /// Countdown length
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Round currently counted down
    pub fn key(&self) -> Option<RoundKey> {
        self.countdown.map(|c| c.key)
    }

    /// Starts the countdown for a round
    ///
    /// Arming the round that is already counted down changes nothing.
    ///
    /// # Returns
    ///
    /// The alarm to schedule after [`RoundTimer::duration`], or `None` if the
    /// round was already armed
    pub fn arm(&mut self, key: RoundKey, now: Instant) -> Option<TimerAlarm> {
        if self.key() == Some(key) {
            return None;
        }
        self.countdown = Some(Countdown {
            key,
            started: now,
            submitted: false,
        });
        Some(TimerAlarm { key })
    }

    /// Stops the countdown; pending alarms become no-ops
    pub fn cancel(&mut self) {
        self.countdown = None;
    }

    /// Records that an answer was sent for the round
    ///
    /// # Returns
    ///
    /// `true` if the round was counted down and no answer had been sent yet
    pub fn mark_submitted(&mut self, key: RoundKey) -> bool {
        match self.countdown.as_mut() {
            Some(countdown) if countdown.key == key && !countdown.submitted => {
                countdown.submitted = true;
                true
            }
            _ => false,
        }
    }

    /// Whether an answer was sent for the counted-down round
    pub fn is_submitted(&self) -> bool {
        self.countdown.is_some_and(|c| c.submitted)
    }

    /// Handles a fired alarm
    ///
    /// # Returns
    ///
    /// The round to submit a forced answer for, only the first time the alarm
    /// of the current round fires and only if nothing was submitted yet
    pub fn expire(&mut self, alarm: &TimerAlarm) -> Option<RoundKey> {
        self.mark_submitted(alarm.key).then_some(alarm.key)
    }

    /// Time since the countdown started, capped at the countdown length
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.countdown
            .map(|c| now.saturating_duration_since(c.started).min(self.duration))
    }

    /// Time left before the countdown runs out
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.elapsed(now).map(|elapsed| self.duration - elapsed)
    }
}
