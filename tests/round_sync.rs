//! End-to-end round synchronization between real clients and a real lobby,
//! connected through an in-process transport and push stream.

use std::{cell::RefCell, collections::HashMap, future::Future, rc::Rc};

use hilo::{
    AlarmMessage,
    catalog::Catalog,
    client::{
        Client,
        action::{ClientError, Transport, TransportError},
        screen::Screen,
        timer::TimerAlarm,
    },
    config::{ClientOptions, LobbyOptions},
    lobby::Lobby,
    protocol::{Choice, Frame, Method, RoomId, RoomStatus},
    session::{MemoryIdentityStore, SessionId, Tunnel},
};
use web_time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
struct Outbox {
    stream: Rc<RefCell<String>>,
}

impl Tunnel for Outbox {
    fn send_frame(&self, frame: &Frame) {
        self.stream
            .borrow_mut()
            .push_str(&format!("data: {}\n\n", frame.to_message()));
    }

    fn close(self) {}
}

struct Server {
    lobby: RefCell<Lobby>,
    outboxes: RefCell<HashMap<SessionId, Outbox>>,
    alarms: RefCell<Vec<AlarmMessage>>,
}

impl Server {
    fn new(options: LobbyOptions) -> Rc<Self> {
        Rc::new(Self {
            lobby: RefCell::new(Lobby::with_rng(
                options,
                Catalog::default(),
                fastrand::Rng::with_seed(2024),
            )),
            outboxes: RefCell::default(),
            alarms: RefCell::default(),
        })
    }

    fn connect(&self) -> (SessionId, Outbox) {
        let handshake = self.lobby.borrow_mut().connect().unwrap();
        let outbox = Outbox::default();
        outbox.send_frame(&Frame::from(handshake.clone()));
        self.outboxes
            .borrow_mut()
            .insert(handshake.session_id, outbox.clone());
        (handshake.session_id, outbox)
    }

    fn disconnect(&self, session_id: SessionId) {
        self.lobby.borrow_mut().disconnect(
            session_id,
            |alarm, _| self.alarms.borrow_mut().push(alarm),
            |id| self.outboxes.borrow().get(&id).cloned(),
        );
        self.outboxes.borrow_mut().remove(&session_id);
    }

    fn fire(&self, alarm: AlarmMessage) {
        self.lobby.borrow_mut().receive_alarm(
            &alarm,
            |alarm, _| self.alarms.borrow_mut().push(alarm),
            |id| self.outboxes.borrow().get(&id).cloned(),
        );
    }

    fn right_choice(&self, room_id: RoomId) -> Choice {
        let lobby = self.lobby.borrow();
        let round = lobby.room(room_id).unwrap().round().unwrap();
        if round.item_b().value >= round.item_a().value {
            Choice::Higher
        } else {
            Choice::Lower
        }
    }
}

struct LocalTransport(Rc<Server>);

impl Transport for LocalTransport {
    fn send(
        &self,
        session_id: SessionId,
        method: Method,
        path: &'static str,
        body: Option<String>,
    ) -> impl Future<Output = Result<String, TransportError>> {
        let server = &self.0;
        let reply = server.lobby.borrow_mut().handle_endpoint(
            Some(session_id),
            method,
            path,
            body.as_deref().unwrap_or_default(),
            |alarm, _| server.alarms.borrow_mut().push(alarm),
            |id| server.outboxes.borrow().get(&id).cloned(),
        );
        std::future::ready(Ok(reply))
    }
}

struct Participant {
    client: Client<LocalTransport, MemoryIdentityStore>,
    outbox: Outbox,
    alarms: Vec<TimerAlarm>,
}

impl Participant {
    fn connect(server: &Rc<Server>, name: &str) -> Self {
        let (_, outbox) = server.connect();
        let mut client = Client::new(
            ClientOptions::default(),
            LocalTransport(Rc::clone(server)),
            MemoryIdentityStore::default(),
        );
        client.connect();
        let mut participant = Self {
            client,
            outbox,
            alarms: Vec::new(),
        };
        participant.pump();
        participant.client.submit_name(name).unwrap();
        participant
    }

    fn pump(&mut self) {
        let chunk = std::mem::take(&mut *self.outbox.stream.borrow_mut());
        let alarms = &mut self.alarms;
        self.client
            .receive_chunk(&chunk, Instant::now(), |alarm, _| alarms.push(alarm));
    }

    fn id(&self) -> SessionId {
        self.client.session_id().unwrap()
    }

    fn room_id(&self) -> RoomId {
        self.client.room().unwrap().id
    }

    async fn start(&mut self) -> Result<(), ClientError> {
        let alarms = &mut self.alarms;
        self.client
            .start_game(Instant::now(), |alarm, _| alarms.push(alarm))
            .await
    }

    async fn sync(&mut self) {
        let alarms = &mut self.alarms;
        self.client
            .sync_state(Instant::now(), |alarm, _| alarms.push(alarm))
            .await;
    }
}

fn no_pause() -> LobbyOptions {
    LobbyOptions {
        results_display: Duration::ZERO,
        ..LobbyOptions::default()
    }
}

fn flip(choice: Choice) -> Choice {
    match choice {
        Choice::Higher => Choice::Lower,
        Choice::Lower => Choice::Higher,
    }
}

/// Host and guest seated in a started game
async fn started(server: &Rc<Server>, max_rounds: u32) -> (Participant, Participant) {
    let mut a = Participant::connect(server, "Ada");
    let mut b = Participant::connect(server, "Bob");
    a.client.create_room("Friday", max_rounds).await.unwrap();
    b.client.join_room(a.room_id()).await.unwrap();
    a.pump();
    a.start().await.unwrap();
    a.pump();
    b.pump();
    (a, b)
}

#[tokio::test]
async fn test_two_players_first_round() {
    let server = Server::new(LobbyOptions::default());
    let mut a = Participant::connect(&server, "Ada");
    let mut b = Participant::connect(&server, "Bob");
    assert_eq!(a.id(), SessionId::from(1));
    assert_eq!(b.id(), SessionId::from(2));
    assert_eq!(a.client.screen(), Screen::Lobby);

    a.client.create_room("Friday", 5).await.unwrap();
    assert_eq!(a.client.screen(), Screen::WaitingRoom);
    b.client.join_room(a.room_id()).await.unwrap();
    a.pump();
    b.pump();
    for participant in [&a, &b] {
        let room = participant.client.room().unwrap();
        assert_eq!(room.player_count, 2);
        assert_eq!(room.max_rounds, 5);
        assert_eq!(participant.client.screen(), Screen::WaitingRoom);
    }
    assert!(a.client.is_host());
    assert!(!b.client.is_host());

    a.start().await.unwrap();
    a.pump();
    b.pump();
    for participant in [&a, &b] {
        assert_eq!(participant.client.screen(), Screen::Playing);
        assert_eq!(participant.client.game().round, 1);
        assert!(!participant.client.game().has_answered);
        assert_eq!(participant.alarms.len(), 1);
    }

    let room_id = a.room_id();
    let right = server.right_choice(room_id);
    let outcome = a
        .client
        .answer(right, Instant::now() + Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.waiting_for, 1);
    assert!(a.client.game().waiting_for_others());

    b.pump();
    b.client
        .answer(flip(right), Instant::now() + Duration::from_secs(9))
        .await
        .unwrap()
        .unwrap();
    a.pump();
    b.pump();

    for participant in [&a, &b] {
        let game = participant.client.game();
        assert!(game.has_answered);
        assert!(!game.waiting_for_others());
        let results = game.round_results.as_ref().unwrap();
        assert_eq!(results.results.len(), 2);
        let ada = game.result_of("Ada").unwrap();
        let bob = game.result_of("Bob").unwrap();
        assert!(ada.correct);
        assert!(ada.score_delta > 0);
        assert_eq!(ada.streak, 1);
        assert!(!bob.correct);
        assert_eq!(bob.streak, 0);
    }
    assert_eq!(a.client.game().score, outcome.score);
    assert_eq!(b.client.game().score, 0);

    let next = server.alarms.borrow().last().copied().unwrap();
    assert_eq!(next, AlarmMessage::NextRound { room_id, round: 1 });
    server.fire(next);
    a.pump();
    b.pump();
    for participant in [&a, &b] {
        assert_eq!(participant.client.game().round, 2);
        assert!(!participant.client.game().has_answered);
        assert!(participant.client.game().round_results.is_none());
        assert_eq!(participant.alarms.len(), 2);
    }
}

#[tokio::test]
async fn test_second_answer_is_not_sent() {
    let server = Server::new(LobbyOptions::default());
    let (mut a, _b) = started(&server, 5).await;
    let right = server.right_choice(a.room_id());

    let first = a.client.answer(right, Instant::now()).await.unwrap().unwrap();
    let second = a.client.answer(flip(right), Instant::now()).await.unwrap();
    assert_eq!(second, None);
    assert_eq!(a.client.game().score, first.score);
    assert_eq!(a.client.game().streak, first.streak);
}

#[tokio::test]
async fn test_countdown_forces_exactly_one_answer() {
    let server = Server::new(LobbyOptions::default());
    let (mut a, mut b) = started(&server, 5).await;
    let room_id = a.room_id();
    a.client
        .answer(server.right_choice(room_id), Instant::now())
        .await
        .unwrap();

    let alarm = b.alarms[0];
    let forced = b.client.expire(alarm).await.unwrap().unwrap();
    assert!(!forced.correct);
    assert_eq!(forced.response_time_ms, 15_000);
    assert_eq!(b.client.expire(alarm).await.unwrap(), None);
    assert_eq!(a.client.expire(a.alarms[0]).await.unwrap(), None);

    a.pump();
    b.pump();
    let game = b.client.game();
    let bob = game.result_of("Bob").unwrap();
    assert!(bob.timed_out);
    assert_eq!(bob.response_time_ms, 15_000);
    assert_eq!(bob.score_delta, 0);
    assert_eq!(
        server
            .lobby
            .borrow()
            .room(room_id)
            .unwrap()
            .round()
            .unwrap()
            .answer(b.id())
            .unwrap()
            .response_time,
        Duration::from_secs(15)
    );
}

#[tokio::test]
async fn test_deadline_resolves_without_answers() {
    let server = Server::new(LobbyOptions::default());
    let (mut a, mut b) = started(&server, 5).await;
    let room_id = a.room_id();

    let deadline = server.alarms.borrow()[0];
    assert_eq!(deadline, AlarmMessage::RoundDeadline { room_id, round: 1 });
    server.fire(deadline);
    server.fire(deadline);
    a.pump();
    b.pump();

    let results = a.client.game().round_results.clone().unwrap();
    assert!(results.results.iter().all(|r| r.timed_out));
    assert!(a.client.game().has_answered);
    assert_eq!(a.client.expire(a.alarms[0]).await.unwrap(), None);
    assert_eq!(
        b.client.answer(Choice::Higher, Instant::now()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_leaving_mid_round_resolves_on_remaining() {
    let server = Server::new(LobbyOptions::default());
    let mut a = Participant::connect(&server, "Ada");
    let mut b = Participant::connect(&server, "Bob");
    let mut c = Participant::connect(&server, "Cy");
    a.client.create_room("Friday", 5).await.unwrap();
    let room_id = a.room_id();
    b.client.join_room(room_id).await.unwrap();
    c.client.join_room(room_id).await.unwrap();
    a.start().await.unwrap();
    for participant in [&mut a, &mut b, &mut c] {
        participant.pump();
    }

    let right = server.right_choice(room_id);
    a.client.answer(right, Instant::now()).await.unwrap();
    b.client.answer(right, Instant::now()).await.unwrap();
    c.client.leave_room().await.unwrap();
    assert_eq!(c.client.screen(), Screen::Lobby);
    assert!(c.client.room().is_none());
    assert_eq!(c.client.timer().key(), None);
    assert_eq!(c.client.rooms().len(), 1);

    // frames of the old room still queued behind the new room's
    c.client.create_room("Solo", 5).await.unwrap();
    a.pump();
    b.pump();
    c.pump();
    let results = a.client.game().round_results.clone().unwrap();
    assert_eq!(results.results.len(), 2);
    assert!(a.client.game().result_of("Cy").is_none());
    assert_eq!(a.client.room().unwrap().player_count, 2);
    let solo = c.client.room().unwrap();
    assert_eq!(solo.name, "Solo");
    assert_eq!(solo.player_count, 1);
    assert_eq!(c.client.screen(), Screen::WaitingRoom);
    assert_eq!(c.client.game().round, 0);
    assert!(c.client.game().round_results.is_none());
}

#[tokio::test]
async fn test_full_game_reaches_game_over() {
    let server = Server::new(no_pause());
    let (mut a, mut b) = started(&server, 5).await;
    let room_id = a.room_id();

    for round in 1..=5 {
        assert_eq!(a.client.game().round, round);
        assert_eq!(b.client.game().round, round);
        let right = server.right_choice(room_id);
        a.client.answer(right, Instant::now()).await.unwrap();
        b.client.answer(flip(right), Instant::now()).await.unwrap();
        a.pump();
        b.pump();
    }

    for participant in [&a, &b] {
        assert_eq!(participant.client.screen(), Screen::GameOver);
        assert!(participant.client.game().game_over);
        assert_eq!(participant.client.timer().key(), None);
        assert_eq!(
            participant.client.room().unwrap().status,
            RoomStatus::Finished
        );
        let leaderboard = participant.client.leaderboard().unwrap();
        let winners = leaderboard.winners().collect::<Vec<_>>();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].name, "Ada");
        assert_eq!(winners[0].streak, 5);
    }

    a.client.leave_room().await.unwrap();
    assert_eq!(a.client.screen(), Screen::Lobby);
    assert!(a.client.rooms().is_empty());
    assert!(a.client.leaderboard().is_none());
    b.pump();
    assert_eq!(b.client.room().unwrap().player_count, 1);
    assert_eq!(b.client.screen(), Screen::GameOver);
}

#[tokio::test]
async fn test_rejections_leave_screen_alone() {
    let server = Server::new(LobbyOptions::default());
    let mut a = Participant::connect(&server, "Ada");
    let mut b = Participant::connect(&server, "Bob");
    a.client.create_room("", 0).await.unwrap();
    assert_eq!(a.client.room().unwrap().name, "Game Room");
    assert_eq!(a.client.room().unwrap().max_rounds, 10);

    assert_eq!(
        b.client.join_room(RoomId::from(77)).await,
        Err(ClientError::ActionRejected("Room not found".to_owned()))
    );
    assert_eq!(b.client.screen(), Screen::Lobby);

    b.client.join_room(a.room_id()).await.unwrap();
    assert_eq!(
        b.start().await,
        Err(ClientError::ActionRejected(
            "Only the host can start the game".to_owned()
        ))
    );
    assert_eq!(b.client.screen(), Screen::WaitingRoom);
}

#[tokio::test]
async fn test_not_connected_fails_fast() {
    let server = Server::new(LobbyOptions::default());
    let mut client = Client::new(
        ClientOptions::default(),
        LocalTransport(Rc::clone(&server)),
        MemoryIdentityStore::default(),
    );
    client.submit_name("Ada").unwrap();
    assert_eq!(
        client.create_room("Friday", 5).await,
        Err(ClientError::NotConnected)
    );
    assert_eq!(client.screen(), Screen::Lobby);
    assert_eq!(server.lobby.borrow().room_count(), 0);
}

#[tokio::test]
async fn test_reconnect_starts_over_in_lobby() {
    let server = Server::new(LobbyOptions::default());
    let (mut a, mut b) = started(&server, 5).await;
    let old_id = b.id();

    server.disconnect(old_id);
    b.client.disconnect();
    assert!(!b.client.is_connected());
    assert_eq!(b.client.screen(), Screen::Playing);

    a.pump();
    assert_eq!(a.client.room().unwrap().player_count, 1);

    let (_, outbox) = server.connect();
    b.outbox = outbox;
    b.client.connect();
    b.pump();
    assert!(b.client.is_connected());
    assert_ne!(b.id(), old_id);
    assert_eq!(b.client.screen(), Screen::Lobby);
    assert!(b.client.room().is_none());
    assert_eq!(b.client.game().round, 0);
}

#[tokio::test]
async fn test_sync_state_recovers_round() {
    let server = Server::new(LobbyOptions::default());
    let (mut a, mut b) = started(&server, 5).await;
    let right = server.right_choice(a.room_id());
    b.client.answer(right, Instant::now()).await.unwrap();

    a.sync().await;
    let game = a.client.game();
    assert_eq!(game.round, 1);
    assert!(!game.has_answered);
    assert!(a.client.room().unwrap().player(b.id()).unwrap().has_answered);

    b.sync().await;
    assert!(b.client.game().waiting_for_others());
}

#[tokio::test]
async fn test_resync_catches_up_on_missed_round() {
    let server = Server::new(no_pause());
    let (mut a, mut b) = started(&server, 5).await;
    let room_id = a.room_id();
    b.client.disconnect();

    let right = server.right_choice(room_id);
    a.client.answer(right, Instant::now()).await.unwrap();
    b.client.answer(right, Instant::now()).await.unwrap();
    b.pump();
    assert_eq!(b.client.game().round, 1);
    assert_eq!(b.alarms.len(), 1);

    b.sync().await;
    let game = b.client.game();
    assert_eq!(game.round, 2);
    assert!(!game.has_answered);
    assert_eq!(b.client.screen(), Screen::Playing);
    assert_eq!(b.alarms.len(), 2);
    assert_eq!(b.alarms[1].key.round, 2);

    let outcome = b
        .client
        .answer(server.right_choice(room_id), Instant::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.round, 2);
    assert!(outcome.correct);
    assert_eq!(b.client.expire(b.alarms[1]).await.unwrap(), None);
}
