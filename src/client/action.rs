//! Action client
//!
//! Issues the request/response calls of the action endpoints. Every call is
//! tagged with the session identifier; without one the call fails with
//! [`ClientError::NotConnected`] before anything is sent. Calls are never
//! retried.

use std::future::Future;

use thiserror::Error;
use tracing::debug;

use crate::{
    protocol::{
        ActionRequest, ActionResponse, AnswerOutcome, CreateRoom, ErrorBody, JoinRoom, Method,
        RoomSnapshot, RoundStart, StateView, SubmitAnswer,
    },
    session::SessionId,
};

/// Failure of the underlying transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Reasons an action call fails
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No session identifier has been issued yet
    #[error("not connected to the server")]
    NotConnected,
    /// The server refused the action
    #[error("{0}")]
    ActionRejected(String),
    /// The request could not complete
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The server answered with something unexpected
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        Self::TransportFailure(error.0)
    }
}

/// Sends one action call to the server
///
/// Implementations attach `session_id` under
/// [`crate::protocol::SESSION_HEADER`] and return the response body whatever
/// its status code; error bodies are recognized by their `error` field.
pub trait Transport {
    /// Performs one call
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the call could not complete.
    fn send(
        &self,
        session_id: SessionId,
        method: Method,
        path: &'static str,
        body: Option<String>,
    ) -> impl Future<Output = Result<String, TransportError>>;
}

/// Typed client of the action endpoints
#[derive(Debug)]
pub struct ActionClient<T> {
    transport: T,
}

fn unexpected(response: &ActionResponse) -> ClientError {
    ClientError::MalformedResponse(format!("unexpected response {response:?}"))
}

/// Interprets a response body
fn decode_reply(body: &str) -> Result<ActionResponse, ClientError> {
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        return Err(ClientError::ActionRejected(error));
    }
    serde_json::from_str(body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

impl<T: Transport> ActionClient<T> {
    /// Wraps a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs one action call
    ///
    /// # Errors
    ///
    /// * `ClientError::NotConnected` - `session_id` is `None`; nothing is sent
    /// * `ClientError::TransportFailure` - The call could not complete
    /// * `ClientError::ActionRejected` - The server refused the action
    /// * `ClientError::MalformedResponse` - The reply could not be decoded
    pub async fn execute(
        &self,
        session_id: Option<SessionId>,
        request: ActionRequest,
    ) -> Result<ActionResponse, ClientError> {
        let session_id = session_id.ok_or(ClientError::NotConnected)?;
        let (method, path) = request.endpoint();
        debug!(session = %session_id, %method, path, "action call");
        let body = self
            .transport
            .send(session_id, method, path, request.body())
            .await?;
        decode_reply(&body)
    }

    /// Lists open rooms
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn list_rooms(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<Vec<RoomSnapshot>, ClientError> {
        match self.execute(session_id, ActionRequest::ListRooms).await? {
            ActionResponse::RoomList { rooms } => Ok(rooms),
            other => Err(unexpected(&other)),
        }
    }

    /// Creates a room with the caller as host
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn create_room(
        &self,
        session_id: Option<SessionId>,
        request: CreateRoom,
    ) -> Result<RoomSnapshot, ClientError> {
        match self
            .execute(session_id, ActionRequest::CreateRoom(request))
            .await?
        {
            ActionResponse::RoomCreated { room } => Ok(room),
            other => Err(unexpected(&other)),
        }
    }

    /// Takes a seat in a waiting room
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn join_room(
        &self,
        session_id: Option<SessionId>,
        request: JoinRoom,
    ) -> Result<RoomSnapshot, ClientError> {
        match self
            .execute(session_id, ActionRequest::JoinRoom(request))
            .await?
        {
            ActionResponse::RoomJoined { room } => Ok(room),
            other => Err(unexpected(&other)),
        }
    }

    /// Gives up the current seat
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn leave_room(&self, session_id: Option<SessionId>) -> Result<String, ClientError> {
        match self.execute(session_id, ActionRequest::LeaveRoom).await? {
            ActionResponse::RoomLeft { message } => Ok(message),
            other => Err(unexpected(&other)),
        }
    }

    /// Starts the game; only the host may
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn start_game(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<RoundStart, ClientError> {
        match self.execute(session_id, ActionRequest::StartGame).await? {
            ActionResponse::GameStarted(start) => Ok(start),
            other => Err(unexpected(&other)),
        }
    }

    /// Answers the current round
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn submit_answer(
        &self,
        session_id: Option<SessionId>,
        request: SubmitAnswer,
    ) -> Result<AnswerOutcome, ClientError> {
        match self
            .execute(session_id, ActionRequest::SubmitAnswer(request))
            .await?
        {
            ActionResponse::ChoiceResult(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches the room, round and own progress
    ///
    /// # Errors
    ///
    /// See [`ActionClient::execute`].
    pub async fn query_state(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<StateView, ClientError> {
        match self.execute(session_id, ActionRequest::QueryState).await? {
            ActionResponse::RoomInfo(view) => Ok(view),
            other => Err(unexpected(&other)),
        }
    }
}
