//! Chat room registry
//!
//! Every room sits behind its own mutex; all membership changes and
//! broadcasts for one room are serialized on it while different rooms proceed
//! in parallel. Sends only enqueue onto per-connection channels, so a
//! broadcast under the lock is atomic and never blocks.
//!
//! Lock order: a room lock may be held while touching the expiry scheduler,
//! never while touching the lobby registry or a map shard.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::core::config::RoomConfig;
use crate::core::error::{Error, Result};
use crate::core::types::RoomId;
use crate::lobby::ConnectionRegistry;
use crate::protocol::{ChatMessage, LobbyEvent, RoomSummary};
use crate::rooms::expiry::ExpiryScheduler;
use crate::system::metrics::Metrics;

struct Member {
    conn: ConnectionHandle,
    name: String,
}

/// Mutable part of a room, guarded by the room mutex
struct RoomState {
    members: Vec<Member>,
    log: VecDeque<ChatMessage>,
    /// Set once the room is being removed; joins must fail from then on
    closed: bool,
}

struct ChatRoom {
    id: RoomId,
    title: String,
    seq: u64,
    state: Mutex<RoomState>,
}

impl ChatRoom {
    fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

impl RoomState {
    /// Record `message` and deliver it to every member in join order
    fn broadcast(&mut self, room_id: &RoomId, message: ChatMessage, history_limit: usize) -> usize {
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode chat message for room {}: {}", room_id, e);
                return 0;
            }
        };

        if history_limit > 0 {
            if self.log.len() >= history_limit {
                self.log.pop_front();
            }
            self.log.push_back(message);
        }

        let metrics = Metrics::global();
        let mut delivered = 0;
        for member in &self.members {
            match member.conn.send_text(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    metrics.connections.send_failures.inc();
                    warn!("Delivery to {} in room {} failed: {}", member.name, room_id, e);
                }
            }
        }
        metrics.rooms.messages.inc();
        metrics.rooms.fanout.observe(self.members.len() as f64);
        delivered
    }
}

/// Owns all chat rooms and their members
pub struct RoomStore {
    rooms: DashMap<RoomId, Arc<ChatRoom>>,
    /// Title reservations; the entry API makes title uniqueness atomic
    titles: DashMap<String, RoomId>,
    next_seq: AtomicU64,
    lobby: Arc<ConnectionRegistry>,
    expiry: ExpiryScheduler,
    settings: RoomConfig,
    this: Weak<RoomStore>,
}

impl RoomStore {
    /// Create a store that notifies `lobby` about room lifecycle changes
    pub fn new(settings: RoomConfig, lobby: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            rooms: DashMap::new(),
            titles: DashMap::new(),
            next_seq: AtomicU64::new(0),
            lobby,
            expiry: ExpiryScheduler::new(),
            settings,
            this: this.clone(),
        })
    }

    /// All rooms in creation order
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<(u64, RoomSummary)> = self
            .rooms
            .iter()
            .map(|entry| (entry.seq, entry.summary()))
            .collect();
        rooms.sort_by_key(|(seq, _)| *seq);
        rooms.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Create a room with a unique title and announce it to the lobby
    pub fn create_room(&self, title: &str) -> Result<RoomSummary> {
        let summary = match self.titles.entry(title.to_string()) {
            Entry::Occupied(_) => return Err(Error::DuplicateTitle),
            Entry::Vacant(slot) => {
                let id = loop {
                    let id = RoomId::random();
                    if !self.rooms.contains_key(&id) {
                        break id;
                    }
                };
                let room = Arc::new(ChatRoom {
                    id: id.clone(),
                    title: title.to_string(),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    state: Mutex::new(RoomState {
                        members: Vec::new(),
                        log: VecDeque::new(),
                        closed: false,
                    }),
                });
                let summary = room.summary();
                self.rooms.insert(id.clone(), room);
                slot.insert(id);
                summary
            }
        };

        let metrics = Metrics::global();
        metrics.rooms.created.inc();
        metrics.rooms.open.inc();
        info!("Room {} created with title {:?}", summary.id, summary.title);

        self.lobby.broadcast(&LobbyEvent::created(&summary));
        Ok(summary)
    }

    /// Add `conn` to a room under display name `name`
    pub fn join(&self, room_id: &RoomId, conn: &ConnectionHandle, name: &str) -> Result<()> {
        let room = self.room(room_id).ok_or(Error::RoomNotFound)?;
        let mut state = room.state.lock();

        if state.closed {
            return Err(Error::RoomNotFound);
        }
        if name.is_empty() {
            return Err(Error::NameRequired);
        }
        if state.members.iter().any(|member| member.name == name) {
            return Err(Error::NameTaken);
        }

        state.members.push(Member {
            conn: conn.clone(),
            name: name.to_string(),
        });
        self.expiry.cancel(room_id);
        info!("{} joined room {} ({} members)", name, room_id, state.members.len());

        state.broadcast(
            room_id,
            ChatMessage::system(format!("{} joined the room", name)),
            self.settings.history_limit,
        );
        Ok(())
    }

    /// Broadcast a chat line from `conn` to everyone in the room
    ///
    /// Returns the number of deliveries; zero when the room is gone or the
    /// sender is not a member.
    pub fn send_message(&self, room_id: &RoomId, conn: &ConnectionHandle, text: &str) -> usize {
        let Some(room) = self.room(room_id) else {
            debug!("Dropping message for missing room {}", room_id);
            return 0;
        };
        let mut state = room.state.lock();
        if state.closed {
            return 0;
        }

        let Some(sender) = state
            .members
            .iter()
            .find(|member| member.conn.id() == conn.id())
            .map(|member| member.name.clone())
        else {
            debug!("Dropping message from non-member {} in room {}", conn.id(), room_id);
            return 0;
        };

        state.broadcast(room_id, ChatMessage::from_user(sender, text), self.settings.history_limit)
    }

    /// Remove `conn` from a room; arms the expiry timer when the room empties
    ///
    /// Returns whether the connection was a member.
    pub fn leave(&self, room_id: &RoomId, conn: &ConnectionHandle) -> bool {
        let Some(room) = self.room(room_id) else {
            return false;
        };
        let mut state = room.state.lock();

        let Some(index) = state.members.iter().position(|member| member.conn.id() == conn.id()) else {
            return false;
        };
        let member = state.members.remove(index);
        info!("{} left room {} ({} members)", member.name, room_id, state.members.len());

        state.broadcast(
            room_id,
            ChatMessage::system(format!("{} left the room", member.name)),
            self.settings.history_limit,
        );

        if state.members.is_empty() && !state.closed {
            self.schedule_expiry(room_id);
        }
        true
    }

    /// Delete the room if it is still empty; called when its timer fires
    pub fn expire(&self, room_id: &RoomId) -> bool {
        let Some(room) = self.room(room_id) else {
            return false;
        };
        {
            let mut state = room.state.lock();
            if state.closed || !state.members.is_empty() {
                return false;
            }
            // A timer armed after this one fired owns the deletion now
            if self.expiry.is_pending(room_id) {
                debug!("Stale expiry for room {} ignored", room_id);
                return false;
            }
            state.closed = true;
            state.log.clear();
        }

        self.rooms.remove_if(room_id, |_, current| Arc::ptr_eq(current, &room));
        self.titles.remove_if(&room.title, |_, owner| owner == room_id);

        let metrics = Metrics::global();
        metrics.rooms.expired.inc();
        metrics.rooms.open.dec();
        info!("Room {} ({:?}) deleted after sitting empty", room_id, room.title);

        self.lobby.broadcast(&LobbyEvent::deleted(room_id));
        true
    }

    /// Recent chat messages of an open room, oldest first
    pub fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>> {
        let room = self.room(room_id).ok_or(Error::RoomNotFound)?;
        let state = room.state.lock();
        if state.closed {
            return Err(Error::RoomNotFound);
        }
        Ok(state.log.iter().cloned().collect())
    }

    /// Display names of the room's members in join order
    pub fn member_names(&self, room_id: &RoomId) -> Result<Vec<String>> {
        let room = self.room(room_id).ok_or(Error::RoomNotFound)?;
        let state = room.state.lock();
        Ok(state.members.iter().map(|member| member.name.clone()).collect())
    }

    /// Whether a room with this id is registered
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Whether the room has an armed expiry timer
    pub fn is_expiry_pending(&self, room_id: &RoomId) -> bool {
        self.expiry.is_pending(room_id)
    }

    /// Number of registered rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are registered
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn room(&self, room_id: &RoomId) -> Option<Arc<ChatRoom>> {
        // Clone out of the shard so the guard is released before locking the room
        self.rooms.get(room_id).map(|entry| Arc::clone(entry.value()))
    }

    fn schedule_expiry(&self, room_id: &RoomId) {
        let store = self.this.clone();
        let expired_room = room_id.clone();
        self.expiry.schedule(room_id.clone(), self.settings.expiry_grace, move || {
            if let Some(store) = store.upgrade() {
                store.expire(&expired_room);
            }
        });
        debug!("Room {} empty; expires in {:?}", room_id, self.settings.expiry_grace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use crate::protocol::LobbyAction;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn store() -> (Arc<RoomStore>, Arc<ConnectionRegistry>) {
        let lobby = Arc::new(ConnectionRegistry::new());
        let store = RoomStore::new(RoomConfig::default(), Arc::clone(&lobby));
        (store, lobby)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn chat_lines(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ChatMessage> {
        drain(rx)
            .into_iter()
            .filter_map(|frame| match frame {
                Outbound::Text(text) => serde_json::from_str(&text).ok(),
                Outbound::Close => None,
            })
            .collect()
    }

    fn lobby_events(rx: &mut UnboundedReceiver<Outbound>) -> Vec<LobbyEvent> {
        drain(rx)
            .into_iter()
            .filter_map(|frame| match frame {
                Outbound::Text(text) => serde_json::from_str(&text).ok(),
                Outbound::Close => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_title() {
        let (store, _) = store();
        store.create_room("general").unwrap();
        assert!(matches!(store.create_room("general"), Err(Error::DuplicateTitle)));
        // Titles are case-sensitive
        assert!(store.create_room("General").is_ok());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_list_preserves_creation_order() {
        let (store, _) = store();
        for title in ["alpha", "beta", "gamma", "delta"] {
            store.create_room(title).unwrap();
        }
        let titles: Vec<String> = store.list_rooms().into_iter().map(|room| room.title).collect();
        assert_eq!(titles, vec!["alpha", "beta", "gamma", "delta"]);
    }

    #[tokio::test]
    async fn test_create_notifies_lobby() {
        let (store, lobby) = store();
        let (watcher, mut rx) = ConnectionHandle::channel();
        lobby.register(watcher).unwrap();
        let _ = drain(&mut rx);

        let room = store.create_room("general").unwrap();
        let events = lobby_events(&mut rx);
        assert_eq!(events, vec![LobbyEvent::created(&room)]);
        assert!(!store.is_expiry_pending(&room.id));
    }

    #[tokio::test]
    async fn test_join_validation() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        let (impostor, _i) = ConnectionHandle::channel();
        let (nameless, _n) = ConnectionHandle::channel();

        assert!(matches!(store.join(&RoomId::from("nope"), &alice, "alice"), Err(Error::RoomNotFound)));
        assert!(matches!(store.join(&room.id, &nameless, ""), Err(Error::NameRequired)));
        store.join(&room.id, &alice, "alice").unwrap();
        assert!(matches!(store.join(&room.id, &impostor, "alice"), Err(Error::NameTaken)));
        // Names are case-sensitive
        store.join(&room.id, &impostor, "Alice").unwrap();

        assert_eq!(store.member_names(&room.id).unwrap(), vec!["alice", "Alice"]);
    }

    #[tokio::test]
    async fn test_join_announces_to_everyone_including_joiner() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, mut alice_rx) = ConnectionHandle::channel();
        let (bob, mut bob_rx) = ConnectionHandle::channel();

        store.join(&room.id, &alice, "alice").unwrap();
        store.join(&room.id, &bob, "bob").unwrap();

        let alice_lines: Vec<String> = chat_lines(&mut alice_rx).into_iter().map(|m| m.message).collect();
        assert_eq!(alice_lines, vec!["alice joined the room", "bob joined the room"]);

        let bob_lines = chat_lines(&mut bob_rx);
        assert_eq!(bob_lines.len(), 1);
        assert_eq!(bob_lines[0].user, "System");
        assert_eq!(bob_lines[0].message, "bob joined the room");
    }

    #[tokio::test]
    async fn test_message_reaches_all_members_once() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let mut receivers = Vec::new();
        let mut conns = Vec::new();
        for name in ["a", "b", "c"] {
            let (conn, rx) = ConnectionHandle::channel();
            store.join(&room.id, &conn, name).unwrap();
            conns.push(conn);
            receivers.push(rx);
        }
        for rx in receivers.iter_mut() {
            let _ = drain(rx);
        }

        assert_eq!(store.send_message(&room.id, &conns[1], "hello"), 3);
        for rx in receivers.iter_mut() {
            let lines = chat_lines(rx);
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].user, "b");
            assert_eq!(lines[0].message, "hello");
        }
    }

    #[tokio::test]
    async fn test_message_from_outsider_or_missing_room_is_dropped() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (member, mut member_rx) = ConnectionHandle::channel();
        let (outsider, _o) = ConnectionHandle::channel();
        store.join(&room.id, &member, "member").unwrap();
        let _ = drain(&mut member_rx);

        assert_eq!(store.send_message(&room.id, &outsider, "psst"), 0);
        assert_eq!(store.send_message(&RoomId::from("gone"), &member, "hi"), 0);
        assert!(drain(&mut member_rx).is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_does_not_abort_broadcast() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, mut alice_rx) = ConnectionHandle::channel();
        let (ghost, ghost_rx) = ConnectionHandle::channel();
        let (bob, mut bob_rx) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        store.join(&room.id, &ghost, "ghost").unwrap();
        store.join(&room.id, &bob, "bob").unwrap();
        drop(ghost_rx);
        let _ = drain(&mut alice_rx);
        let _ = drain(&mut bob_rx);

        assert_eq!(store.send_message(&room.id, &alice, "still here?"), 2);
        assert_eq!(chat_lines(&mut alice_rx).len(), 1);
        assert_eq!(chat_lines(&mut bob_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_leave_announces_to_remaining_members() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, mut alice_rx) = ConnectionHandle::channel();
        let (bob, mut bob_rx) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        store.join(&room.id, &bob, "bob").unwrap();
        let _ = drain(&mut alice_rx);
        let _ = drain(&mut bob_rx);

        assert!(store.leave(&room.id, &bob));
        assert!(!store.leave(&room.id, &bob));

        let lines = chat_lines(&mut alice_rx);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "bob left the room");
        assert!(chat_lines(&mut bob_rx).is_empty());
        assert!(!store.is_expiry_pending(&room.id));

        // The name is free again
        let (bob_again, _b) = ConnectionHandle::channel();
        store.join(&room.id, &bob_again, "bob").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_room_expires_after_grace_period() {
        let (store, lobby) = store();
        let (watcher, mut watcher_rx) = ConnectionHandle::channel();
        lobby.register(watcher).unwrap();

        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        store.leave(&room.id, &alice);
        assert!(store.is_expiry_pending(&room.id));
        let _ = drain(&mut watcher_rx);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(store.contains(&room.id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!store.contains(&room.id));
        assert!(store.list_rooms().is_empty());

        let events = lobby_events(&mut watcher_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, LobbyAction::Deleted);
        assert_eq!(events[0].room.id, room.id);
        assert_eq!(events[0].room.title, None);

        // The title can be reused once the room is gone
        assert!(store.create_room("general").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_cancels_expiry() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        store.leave(&room.id, &alice);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let (bob, _b) = ConnectionHandle::channel();
        store.join(&room.id, &bob, "bob").unwrap();
        assert!(!store.is_expiry_pending(&room.id));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(store.contains(&room.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_does_not_cut_new_grace_period_short() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        store.leave(&room.id, &alice);

        // First timer has claimed its slot and is about to run
        assert!(store.expiry.cancel(&room.id));

        let (bob, _b) = ConnectionHandle::channel();
        store.join(&room.id, &bob, "bob").unwrap();
        store.leave(&room.id, &bob);
        assert!(store.is_expiry_pending(&room.id));

        // The late fire from the first timer lands now
        assert!(!store.expire(&room.id));
        assert!(store.contains(&room.id));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(store.contains(&room.id));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!store.contains(&room.id));
    }

    #[tokio::test]
    async fn test_expire_refuses_occupied_room_and_blocks_late_joins() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        assert!(!store.expire(&room.id));

        store.leave(&room.id, &alice);
        // The armed timer owns the deletion until it claims its slot
        assert!(!store.expire(&room.id));
        store.expiry.cancel(&room.id);
        assert!(store.expire(&room.id));
        assert!(!store.expire(&room.id));

        let (late, _l) = ConnectionHandle::channel();
        assert!(matches!(store.join(&room.id, &late, "late"), Err(Error::RoomNotFound)));
        assert!(!store.leave(&room.id, &alice));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let lobby = Arc::new(ConnectionRegistry::new());
        let settings = RoomConfig { history_limit: 3, ..RoomConfig::default() };
        let store = RoomStore::new(settings, lobby);
        let room = store.create_room("general").unwrap();
        let (alice, _a) = ConnectionHandle::channel();
        store.join(&room.id, &alice, "alice").unwrap();
        for i in 0..5 {
            store.send_message(&room.id, &alice, &format!("msg {}", i));
        }

        let history: Vec<String> = store.history(&room.id).unwrap().into_iter().map(|m| m.message).collect();
        assert_eq!(history, vec!["msg 2", "msg 3", "msg 4"]);
        assert!(matches!(store.history(&RoomId::from("nope")), Err(Error::RoomNotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_with_same_title_have_one_winner() {
        let (store, _) = store();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move { store.create_room("race").is_ok() }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_with_same_name_have_one_winner() {
        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let id = room.id.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, _rx) = ConnectionHandle::channel();
                store.join(&id, &conn, "same").is_ok()
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.member_names(&room.id).unwrap(), vec!["same"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_broadcasts_reach_exactly_the_present_members() {
        const MESSAGES: usize = 200;
        const CHURNERS: usize = 6;

        let (store, _) = store();
        let room = store.create_room("general").unwrap();
        let (sender, sender_rx) = ConnectionHandle::channel();
        let (steady, steady_rx) = ConnectionHandle::channel();
        store.join(&room.id, &sender, "sender").unwrap();
        store.join(&room.id, &steady, "steady").unwrap();

        let mut churners = Vec::new();
        for i in 0..CHURNERS {
            let store = Arc::clone(&store);
            let id = room.id.clone();
            churners.push(tokio::spawn(async move {
                let (conn, rx) = ConnectionHandle::channel();
                let name = format!("churner{}", i);
                for _ in 0..50 {
                    store.join(&id, &conn, &name).unwrap();
                    tokio::task::yield_now().await;
                    assert!(store.leave(&id, &conn));
                    tokio::task::yield_now().await;
                }
                rx
            }));
        }

        let broadcaster = {
            let store = Arc::clone(&store);
            let id = room.id.clone();
            tokio::spawn(async move {
                let mut delivered = Vec::with_capacity(MESSAGES);
                for n in 0..MESSAGES {
                    delivered.push(store.send_message(&id, &sender, &format!("msg-{}", n)));
                    tokio::task::yield_now().await;
                }
                delivered
            })
        };

        let delivered = broadcaster.await.unwrap();
        let mut receivers = vec![sender_rx, steady_rx];
        for churner in churners {
            receivers.push(churner.await.unwrap());
        }

        let mut received = vec![0usize; MESSAGES];
        for (index, rx) in receivers.iter_mut().enumerate() {
            let seen: Vec<usize> = chat_lines(rx)
                .into_iter()
                .filter(|line| line.user == "sender")
                .map(|line| line.message.trim_start_matches("msg-").parse().unwrap())
                .collect();
            // In order, never twice
            assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
            for n in &seen {
                received[*n] += 1;
            }
            if index < 2 {
                assert_eq!(seen.len(), MESSAGES);
            }
        }

        // Each reported count matches the members that actually got the line
        assert_eq!(delivered, received);
        assert!(delivered.iter().all(|count| (2..=2 + CHURNERS).contains(count)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn member_names_stay_distinct(
                ops in proptest::collection::vec((any::<bool>(), 0usize..6), 1..60)
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                let _guard = runtime.enter();

                let (store, _) = store();
                let room = store.create_room("prop").unwrap();
                let names = ["ann", "ben", "cat", "dan", "eve", ""];
                let mut joined: Vec<ConnectionHandle> = Vec::new();

                for (is_join, pick) in ops {
                    if is_join {
                        let (conn, _rx) = ConnectionHandle::channel();
                        if store.join(&room.id, &conn, names[pick]).is_ok() {
                            joined.push(conn);
                        }
                    } else if !joined.is_empty() {
                        let conn = joined.remove(pick % joined.len());
                        prop_assert!(store.leave(&room.id, &conn));
                    }

                    let members = store.member_names(&room.id).unwrap();
                    let mut deduped = members.clone();
                    deduped.sort();
                    deduped.dedup();
                    prop_assert_eq!(deduped.len(), members.len());
                    prop_assert!(!members.iter().any(|name| name.is_empty()));
                    prop_assert_eq!(members.len(), joined.len());
                }
            }
        }
    }
}
