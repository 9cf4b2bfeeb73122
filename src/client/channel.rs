//! Push channel adapter
//!
//! Turns the raw server-sent event stream into decoded [`Inbound`] records.
//! The adapter tracks whether the stream is up, accepts exactly one handshake
//! per connection as its first frame, and silently drops anything that fails
//! to decode.

use tracing::trace;

use crate::{
    protocol::{Event, Frame},
    session::SessionId,
};

/// A decoded record from the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The connection's handshake
    Handshake(SessionId),
    /// A room event
    Event(Event),
}

/// Client end of the push channel
#[derive(Debug, Default)]
pub struct PushChannel {
    connected: bool,
    awaiting_handshake: bool,
    buffer: String,
}

impl PushChannel {
    /// Whether the stream is up
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Marks a new connection as established
    ///
    /// The next handshake frame is accepted.
    pub fn open(&mut self) {
        self.connected = true;
        self.awaiting_handshake = true;
        self.buffer.clear();
    }

    /// Marks the stream as closed
    ///
    /// Connectivity stays down until [`PushChannel::open`] is called again.
    pub fn close(&mut self) {
        self.connected = false;
        self.buffer.clear();
    }

    /// Decodes one frame body
    ///
    /// Returns `None` for frames that fail to decode, for a second handshake
    /// on the same connection, for events arriving before the handshake, and
    /// for anything received while closed.
    pub fn receive_frame(&mut self, text: &str) -> Option<Inbound> {
        if !self.connected {
            trace!("dropping frame received while disconnected");
            return None;
        }
        match Frame::decode(text) {
            Ok(Frame::Handshake(handshake)) => {
                if self.awaiting_handshake {
                    self.awaiting_handshake = false;
                    Some(Inbound::Handshake(handshake.session_id))
                } else {
                    trace!(session = %handshake.session_id, "dropping repeated handshake");
                    None
                }
            }
            Ok(Frame::Event(_)) if self.awaiting_handshake => {
                trace!("dropping event received before the handshake");
                None
            }
            Ok(Frame::Event(event)) => Some(Inbound::Event(event)),
            Err(error) => {
                trace!(%error, "dropping malformed frame");
                None
            }
        }
    }

    /// Feeds a chunk of the `text/event-stream` body
    ///
    /// Chunks may split messages anywhere; incomplete messages are kept until
    /// their terminating blank line arrives. The `data:` lines of each message
    /// form one frame; other fields are ignored.
    pub fn feed(&mut self, chunk: &str) -> Vec<Inbound> {
        if !self.connected {
            return Vec::new();
        }
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));

        let mut inbound = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let message: String = self.buffer.drain(..end + 2).collect();
            let data = message
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|data| data.strip_prefix(' ').unwrap_or(data))
                .collect::<Vec<_>>()
                .join("\n");
            if data.is_empty() {
                continue;
            }
            inbound.extend(self.receive_frame(&data));
        }
        inbound
    }
}
