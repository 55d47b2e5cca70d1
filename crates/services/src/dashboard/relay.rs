//! Room-scoped relay between learner sessions and teacher consoles.
//!
//! `RelayState` holds the rosters and is driven by whole frames, so it can be
//! exercised without sockets. `RelayServer` wires it to websocket connections.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use practice_core::Clock;
use practice_core::model::RoomId;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::dashboard::protocol::{Role, ServerMessage};

pub type ConnId = u64;
pub type Outbox = mpsc::UnboundedSender<String>;

//
// ─── INBOUND FRAMES ────────────────────────────────────────────────────────────
//

/// Inbound frames, read leniently: every field is optional and unknown types are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Hello {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        room: Option<Value>,
        #[serde(default, rename = "studentId")]
        student_id: Option<Value>,
        #[serde(default, rename = "displayName")]
        display_name: Option<Value>,
    },
    Status {
        #[serde(default)]
        room: Option<Value>,
        #[serde(default)]
        payload: Option<Map<String, Value>>,
        #[serde(default, rename = "studentId")]
        student_id: Option<Value>,
    },
    SnapshotRequest,
    #[serde(other)]
    Other,
}

/// Text of a loosely typed field; blank, null and missing read as `None`.
fn text_of(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn room_of(value: Option<&Value>) -> RoomId {
    text_of(value).map(RoomId::new).unwrap_or_default()
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Default)]
struct Room {
    students: BTreeMap<String, Map<String, Value>>,
    teachers: HashMap<ConnId, Outbox>,
}

#[derive(Debug, Clone)]
struct Peer {
    role: Role,
    room: RoomId,
    student_key: Option<String>,
}

/// Rosters and teacher subscriptions of every room.
#[derive(Debug, Default)]
pub struct RelayState {
    rooms: HashMap<RoomId, Room>,
    peers: HashMap<ConnId, Peer>,
}

fn send(outbox: &Outbox, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            let _ = outbox.send(text);
        }
        Err(err) => warn!(error = %err, "failed to encode relay frame"),
    }
}

impl RelayState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current roster of `room`, ordered by student key.
    #[must_use]
    pub fn roster(&self, room: &RoomId) -> Vec<Map<String, Value>> {
        self.rooms
            .get(room)
            .map(|room| room.students.values().cloned().collect())
            .unwrap_or_default()
    }

    fn room_mut(&mut self, room: &RoomId) -> &mut Room {
        self.rooms.entry(room.clone()).or_default()
    }

    /// Sends `message` to every teacher of `room`, dropping closed outboxes.
    fn broadcast(&mut self, room: &RoomId, message: &ServerMessage) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(room) {
            room.teachers.retain(|_, outbox| outbox.send(text.clone()).is_ok());
        }
    }

    fn snapshot(&self, room: &RoomId) -> ServerMessage {
        ServerMessage::Snapshot {
            room: room.clone(),
            items: self.roster(room),
        }
    }

    fn broadcast_entry(&mut self, room: &RoomId, student_key: &str) {
        let Some(payload) = self
            .rooms
            .get(room)
            .and_then(|r| r.students.get(student_key))
            .cloned()
        else {
            return;
        };
        self.broadcast(
            room,
            &ServerMessage::Status {
                room: room.clone(),
                student_key: student_key.to_string(),
                payload,
            },
        );
    }

    /// Applies one text frame from connection `conn`. Malformed frames are ignored.
    pub fn handle(&mut self, conn: ConnId, outbox: &Outbox, text: &str, now_ms: i64) {
        let inbound = match serde_json::from_str::<Inbound>(text) {
            Ok(inbound) => inbound,
            Err(err) => {
                debug!(conn, error = %err, "ignoring malformed frame");
                return;
            }
        };
        match inbound {
            Inbound::Hello {
                role,
                room,
                student_id,
                display_name,
            } => {
                let room = room_of(room.as_ref());
                if role.as_deref() == Some("teacher") {
                    self.join_teacher(conn, outbox, room);
                } else {
                    let sid = text_of(student_id.as_ref()).unwrap_or_else(|| "unknown".into());
                    let name = text_of(display_name.as_ref()).unwrap_or_else(|| sid.clone());
                    self.join_student(conn, outbox, room, sid, name, now_ms);
                }
            }
            Inbound::Status {
                room,
                payload,
                student_id,
            } => {
                if self.peers.get(&conn).is_some_and(|peer| peer.role == Role::Teacher) {
                    return;
                }
                self.update_student(conn, room.as_ref(), payload.unwrap_or_default(), student_id.as_ref(), now_ms);
            }
            Inbound::SnapshotRequest => {
                if let Some(peer) = self.peers.get(&conn).filter(|peer| peer.role == Role::Teacher) {
                    send(outbox, &self.snapshot(&peer.room));
                }
            }
            Inbound::Other => {}
        }
    }

    /// Drops the teacher subscription `conn` holds in a room other than `next`.
    fn leave_previous_room(&mut self, conn: ConnId, next: &RoomId) {
        let Some(previous) = self
            .peers
            .get(&conn)
            .filter(|peer| peer.role == Role::Teacher && &peer.room != next)
            .map(|peer| peer.room.clone())
        else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&previous) {
            room.teachers.remove(&conn);
            if room.teachers.is_empty() && room.students.is_empty() {
                self.rooms.remove(&previous);
            }
        }
        debug!(conn, from = %previous, to = %next, "teacher switched rooms");
    }

    fn join_teacher(&mut self, conn: ConnId, outbox: &Outbox, room: RoomId) {
        self.leave_previous_room(conn, &room);
        info!(conn, room = %room, "teacher joined");
        self.room_mut(&room).teachers.insert(conn, outbox.clone());
        send(
            outbox,
            &ServerMessage::HelloAck {
                role: Role::Teacher,
                room: room.clone(),
                student_key: None,
            },
        );
        send(outbox, &self.snapshot(&room));
        self.peers.insert(
            conn,
            Peer {
                role: Role::Teacher,
                room,
                student_key: None,
            },
        );
    }

    fn join_student(
        &mut self,
        conn: ConnId,
        outbox: &Outbox,
        room: RoomId,
        sid: String,
        display_name: String,
        now_ms: i64,
    ) {
        let student_key = format!("{room}:{sid}");
        info!(conn, room = %room, student_key = %student_key, "student joined");
        send(
            outbox,
            &ServerMessage::HelloAck {
                role: Role::Student,
                room: room.clone(),
                student_key: Some(student_key.clone()),
            },
        );

        let mut entry = Map::new();
        entry.insert("studentKey".into(), Value::from(student_key.clone()));
        entry.insert("room".into(), Value::from(room.as_str()));
        entry.insert("studentId".into(), Value::from(sid));
        entry.insert("displayName".into(), Value::from(display_name));
        entry.insert("lastSeenAt".into(), Value::from(now_ms));
        self.room_mut(&room).students.insert(student_key.clone(), entry);
        self.broadcast_entry(&room, &student_key);

        self.peers.insert(
            conn,
            Peer {
                role: Role::Student,
                room,
                student_key: Some(student_key),
            },
        );
    }

    fn update_student(
        &mut self,
        conn: ConnId,
        room: Option<&Value>,
        mut payload: Map<String, Value>,
        student_id: Option<&Value>,
        now_ms: i64,
    ) {
        let peer = self.peers.entry(conn).or_insert_with(|| Peer {
            role: Role::Student,
            room: room_of(room),
            student_key: None,
        });
        let room = peer.room.clone();
        let sid = text_of(payload.get("studentId"))
            .or_else(|| text_of(student_id))
            .unwrap_or_else(|| "unknown".into());
        let student_key = peer
            .student_key
            .get_or_insert_with(|| format!("{room}:{sid}"))
            .clone();
        let display_name = text_of(payload.get("displayName")).unwrap_or_else(|| sid.clone());

        payload.insert("studentKey".into(), Value::from(student_key.clone()));
        payload.insert("room".into(), Value::from(room.as_str()));
        payload.insert("studentId".into(), Value::from(sid));
        payload.insert("displayName".into(), Value::from(display_name));
        payload.insert("lastSeenAt".into(), Value::from(now_ms));
        self.room_mut(&room).students.insert(student_key.clone(), payload);
        self.broadcast_entry(&room, &student_key);
    }

    /// Connection `conn` closed. A student stays listed, marked disconnected, until swept.
    pub fn disconnect(&mut self, conn: ConnId, now_ms: i64) {
        let Some(peer) = self.peers.remove(&conn) else {
            return;
        };
        match (peer.role, peer.student_key) {
            (Role::Teacher, _) => {
                if let Some(room) = self.rooms.get_mut(&peer.room) {
                    room.teachers.remove(&conn);
                }
                debug!(conn, room = %peer.room, "teacher left");
            }
            (Role::Student, Some(student_key)) => {
                let Some(entry) = self
                    .rooms
                    .get_mut(&peer.room)
                    .and_then(|room| room.students.get_mut(&student_key))
                else {
                    return;
                };
                entry.insert("lastSeenAt".into(), Value::from(now_ms));
                entry.insert("disconnected".into(), Value::Bool(true));
                debug!(conn, student_key = %student_key, "student disconnected");
                self.broadcast_entry(&peer.room, &student_key);
            }
            (Role::Student, None) => {}
        }
    }

    /// Drops students silent for longer than `expire_after_ms` and tells the teachers.
    pub fn sweep(&mut self, now_ms: i64, expire_after_ms: i64) -> usize {
        let mut expired: Vec<(RoomId, String)> = Vec::new();
        for (room_id, room) in &mut self.rooms {
            room.students.retain(|key, entry| {
                let last_seen = entry.get("lastSeenAt").and_then(Value::as_i64).unwrap_or(0);
                let keep = now_ms - last_seen <= expire_after_ms;
                if !keep {
                    expired.push((room_id.clone(), key.clone()));
                }
                keep
            });
        }
        for (room, student_key) in &expired {
            info!(room = %room, student_key = %student_key, "student expired");
            self.broadcast(
                room,
                &ServerMessage::Bye {
                    room: room.clone(),
                    student_key: student_key.clone(),
                },
            );
        }
        self.rooms
            .retain(|_, room| !room.students.is_empty() || !room.teachers.is_empty());
        expired.len()
    }
}

//
// ─── SERVER ────────────────────────────────────────────────────────────────────
//

/// Websocket front of a shared `RelayState`.
#[derive(Clone)]
pub struct RelayServer {
    state: Arc<Mutex<RelayState>>,
    config: RelayConfig,
    clock: Clock,
    next_conn: Arc<AtomicU64>,
}

impl RelayServer {
    #[must_use]
    pub fn new(config: RelayConfig, clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState::new())),
            config,
            clock,
            next_conn: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn state(&self) -> Arc<Mutex<RelayState>> {
        self.state.clone()
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Accepts connections on `listener` until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the listener's error if accepting fails.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "relay listening");
        }
        let sweeper = tokio::spawn(self.clone().sweep_loop(cancel.clone()));
        let result = loop {
            tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
                        debug!(conn, %peer, "relay connection accepted");
                        tokio::spawn(self.clone().connection(conn, stream, cancel.clone()));
                    }
                    Err(err) => break Err(err),
                },
            }
        };
        cancel.cancel();
        let _ = sweeper.await;
        result
    }

    async fn sweep_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.sweep_interval_ms));
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let now_ms = self.now_ms();
                    self.state.lock().await.sweep(now_ms, self.config.expire_after_ms);
                }
            }
        }
    }

    async fn connection(self, conn: ConnId, stream: TcpStream, cancel: CancellationToken) {
        let socket = match tokio_tungstenite::accept_async(stream).await {
            Ok(socket) => socket,
            Err(err) => {
                debug!(conn, error = %err, "websocket handshake failed");
                return;
            }
        };
        let (mut write, mut read) = socket.split();
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();
        let mut heartbeat = tokio::time::interval(Duration::from_millis(self.config.heartbeat_ms));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Some(text) = outbox_rx.recv() => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        debug!(conn, error = %err, "relay send failed");
                        break;
                    }
                }
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let now_ms = self.now_ms();
                        self.state.lock().await.handle(conn, &outbox, &text, now_ms);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(conn, error = %err, "relay read failed");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let now_ms = self.now_ms();
        self.state.lock().await.disconnect(conn, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Endpoint {
        tx: Outbox,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Endpoint {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self { tx, rx }
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            frames
        }
    }

    fn frame(value: Value) -> String {
        value.to_string()
    }

    #[test]
    fn student_hello_reaches_teacher() {
        let mut relay = RelayState::new();
        let mut teacher = Endpoint::new();
        let mut student = Endpoint::new();

        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        let frames = teacher.drain();
        assert_eq!(frames[0], json!({"type": "hello_ack", "role": "teacher", "room": "A"}));
        assert_eq!(frames[1], json!({"type": "snapshot", "room": "A", "items": []}));

        relay.handle(
            2,
            &student.tx,
            &frame(json!({"type": "hello", "role": "student", "room": "A", "studentId": " 7 "})),
            1_000,
        );
        assert_eq!(
            student.drain(),
            vec![json!({"type": "hello_ack", "role": "student", "room": "A", "studentKey": "A:7"})]
        );
        let frames = teacher.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "status");
        assert_eq!(frames[0]["payload"]["displayName"], "7");
        assert_eq!(frames[0]["payload"]["lastSeenAt"], 1_000);
    }

    #[test]
    fn status_is_stamped_and_snapshotted() {
        let mut relay = RelayState::new();
        let mut teacher = Endpoint::new();
        let student = Endpoint::new();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        relay.handle(2, &student.tx, &frame(json!({"type": "hello", "room": "A", "studentId": "7"})), 0);
        relay.handle(
            2,
            &student.tx,
            &frame(json!({"type": "status", "room": "A", "payload": {"studentId": "7", "progress": {"answered": 2}}})),
            5_000,
        );
        teacher.drain();

        relay.handle(1, &teacher.tx, &frame(json!({"type": "snapshot_request"})), 6_000);
        let frames = teacher.drain();
        let items = frames[0]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["studentKey"], "A:7");
        assert_eq!(items[0]["progress"]["answered"], 2);
        assert_eq!(items[0]["lastSeenAt"], 5_000);
    }

    #[test]
    fn teacher_status_and_garbage_are_ignored() {
        let mut relay = RelayState::new();
        let mut teacher = Endpoint::new();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        teacher.drain();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "status", "payload": {"studentId": "x"}})), 0);
        relay.handle(1, &teacher.tx, "not json", 0);
        relay.handle(1, &teacher.tx, &frame(json!({"type": "dance"})), 0);
        assert!(teacher.drain().is_empty());
        assert!(relay.roster(&RoomId::new("A")).is_empty());
    }

    #[test]
    fn disconnect_marks_then_sweep_expires() {
        let mut relay = RelayState::new();
        let mut teacher = Endpoint::new();
        let student = Endpoint::new();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        relay.handle(2, &student.tx, &frame(json!({"type": "hello", "room": "A", "studentId": "7"})), 0);
        teacher.drain();

        relay.disconnect(2, 10_000);
        let frames = teacher.drain();
        assert_eq!(frames[0]["payload"]["disconnected"], true);

        assert_eq!(relay.sweep(190_000, 180_000), 0);
        assert_eq!(relay.sweep(190_001, 180_000), 1);
        assert_eq!(
            teacher.drain(),
            vec![json!({"type": "bye", "room": "A", "studentKey": "A:7"})]
        );
        assert!(relay.roster(&RoomId::new("A")).is_empty());
    }

    #[test]
    fn teacher_switching_rooms_stops_hearing_the_old_one() {
        let mut relay = RelayState::new();
        let mut teacher = Endpoint::new();
        let student = Endpoint::new();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "B"})), 0);
        assert!(!relay.rooms.contains_key(&RoomId::new("A")));
        teacher.drain();

        relay.handle(2, &student.tx, &frame(json!({"type": "hello", "room": "A", "studentId": "7"})), 0);
        assert!(teacher.drain().is_empty());
        assert!(relay.rooms[&RoomId::new("A")].teachers.is_empty());
        assert!(relay.rooms[&RoomId::new("B")].teachers.contains_key(&1));
    }

    #[test]
    fn closed_teacher_outbox_is_pruned() {
        let mut relay = RelayState::new();
        let teacher = Endpoint::new();
        let student = Endpoint::new();
        relay.handle(1, &teacher.tx, &frame(json!({"type": "hello", "role": "teacher", "room": "A"})), 0);
        drop(teacher);
        relay.handle(2, &student.tx, &frame(json!({"type": "hello", "room": "A", "studentId": "7"})), 0);
        assert!(relay.rooms[&RoomId::new("A")].teachers.is_empty());
    }
}
