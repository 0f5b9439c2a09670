//! Broker loop: the room directory and the guest set.

use std::collections::{HashMap, hash_map::Entry};

use tokio::sync::{mpsc, oneshot};

use crate::domain::{HubError, RoomName, SessionId};

use super::{JoinRequest, Mailbox, Room, RoomHandle, RoomRef};

/// Events processed by the Broker loop.
#[derive(Debug)]
pub enum BrokerEvent {
    /// Add a connected session to the guest set. Idempotent.
    RegisterGuest(Mailbox),
    /// Remove a guest and close its mailbox. No-op once the session has
    /// moved into a room.
    UnregisterGuest(SessionId),
    /// Move a guest into the named room, creating the room if needed.
    Enter(JoinRequest),
    /// Teardown notice from a room whose membership reached zero.
    NotifyRoomClosed(RoomRef),
}

/// Cloneable address of the Broker loop.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    events: mpsc::UnboundedSender<BrokerEvent>,
}

impl BrokerHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<BrokerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }

    pub fn register_guest(&self, mailbox: Mailbox) -> Result<(), HubError> {
        self.send(BrokerEvent::RegisterGuest(mailbox))
    }

    pub fn unregister_guest(&self, session: SessionId) -> Result<(), HubError> {
        self.send(BrokerEvent::UnregisterGuest(session))
    }

    pub fn enter(&self, request: JoinRequest) -> Result<(), HubError> {
        self.send(BrokerEvent::Enter(request))
    }

    pub fn notify_room_closed(&self, room: RoomRef) -> Result<(), HubError> {
        self.send(BrokerEvent::NotifyRoomClosed(room))
    }

    fn send(&self, event: BrokerEvent) -> Result<(), HubError> {
        self.events
            .send(event)
            .map_err(|_| HubError::BrokerUnavailable)
    }
}

/// Directory entry for a live room.
struct RoomEntry {
    handle: RoomHandle,
    shutdown: oneshot::Sender<()>,
}

/// State owned by the Broker loop.
///
/// Only [`Broker::handle`] mutates the directory and the guest set, so no
/// locking is needed.
pub struct Broker {
    /// Own address, handed to the rooms it creates. Weak so the loop still
    /// ends once every outside handle is dropped.
    events: mpsc::WeakUnboundedSender<BrokerEvent>,
    rooms: HashMap<RoomName, RoomEntry>,
    guests: HashMap<SessionId, Mailbox>,
}

impl Broker {
    pub fn new(handle: &BrokerHandle) -> Self {
        Self {
            events: handle.events.downgrade(),
            rooms: HashMap::new(),
            guests: HashMap::new(),
        }
    }

    /// Start the Broker loop on the runtime and return its handle.
    pub fn spawn() -> BrokerHandle {
        let (handle, events) = BrokerHandle::channel();
        let broker = Self::new(&handle);
        tokio::spawn(broker.run(events));
        handle
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<BrokerEvent>) {
        tracing::info!("Broker started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        tracing::info!(
            "Broker stopped ({} room(s), {} guest(s) dropped)",
            self.rooms.len(),
            self.guests.len()
        );
    }

    pub fn handle(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::RegisterGuest(mailbox) => self.register_guest(mailbox),
            BrokerEvent::UnregisterGuest(session) => self.unregister_guest(session),
            BrokerEvent::Enter(request) => self.enter(request),
            BrokerEvent::NotifyRoomClosed(room) => self.close_room(room),
        }
    }

    fn register_guest(&mut self, mailbox: Mailbox) {
        match self.guests.entry(mailbox.owner()) {
            Entry::Vacant(entry) => {
                tracing::info!("Guest '{}' registered", mailbox.owner());
                entry.insert(mailbox);
            }
            Entry::Occupied(entry) => {
                tracing::debug!("Guest '{}' is already registered", entry.key());
            }
        }
    }

    fn unregister_guest(&mut self, session: SessionId) {
        match self.guests.remove(&session) {
            Some(mailbox) => {
                tracing::info!("Guest '{}' unregistered", session);
                drop(mailbox);
            }
            None => tracing::debug!("Session '{}' is not a guest; ignoring unregister", session),
        }
    }

    fn enter(&mut self, request: JoinRequest) {
        let JoinRequest {
            room: name,
            session,
            admission,
        } = request;

        let Some(member) = self.guests.remove(&session) else {
            tracing::warn!(
                "Session '{}' is not a guest; dropping its request to enter '{}'",
                session,
                name
            );
            return;
        };

        let room = match self.rooms.get(&name) {
            Some(entry) => entry.handle.clone(),
            None => match self.open_room(&name) {
                Some(handle) => handle,
                None => {
                    tracing::warn!("Cannot open room '{}': broker is shutting down", name);
                    return;
                }
            },
        };

        tracing::debug!("Routing session '{}' to room '{}' ({})", session, name, room.id());
        if let Err(e) = room.register(member, admission) {
            tracing::warn!("Failed to hand session '{}' to room: {}", session, e);
        }
    }

    /// Create and start a room, record it in the directory and return the
    /// handle of that same instance.
    fn open_room(&mut self, name: &RoomName) -> Option<RoomHandle> {
        let broker = BrokerHandle {
            events: self.events.upgrade()?,
        };
        let (handle, shutdown) = Room::spawn(name.clone(), broker);
        tracing::info!("Room '{}' ({}) created", name, handle.id());
        self.rooms.insert(
            name.clone(),
            RoomEntry {
                handle: handle.clone(),
                shutdown,
            },
        );
        Some(handle)
    }

    fn close_room(&mut self, room: RoomRef) {
        match self.rooms.entry(room.name) {
            Entry::Occupied(entry) if entry.get().handle.id() == room.id => {
                let (name, entry) = entry.remove_entry();
                // The room may already be gone; nothing to signal then.
                let _ = entry.shutdown.send(());
                tracing::info!("Room '{}' ({}) closed", name, room.id);
            }
            Entry::Occupied(entry) => tracing::debug!(
                "Ignoring stale teardown notice for room '{}' ({})",
                entry.key(),
                room.id
            ),
            Entry::Vacant(entry) => tracing::debug!(
                "Ignoring teardown notice for unknown room '{}' ({})",
                entry.key(),
                room.id
            ),
        }
    }

    #[cfg(test)]
    fn room_id(&self, name: &str) -> Option<crate::domain::RoomId> {
        let name = RoomName::new(name).ok()?;
        self.rooms.get(&name).map(|entry| entry.handle.id())
    }

    #[cfg(test)]
    fn is_guest(&self, session: SessionId) -> bool {
        self.guests.contains_key(&session)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::hub::Inbox;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - Broker の 4 種類のイベント（RegisterGuest / UnregisterGuest / Enter / NotifyRoomClosed）
    // - ルームの遅延生成と、同名ルームが同時に 2 つ存在しないこと
    // - 空になったルームの撤去と、同名での再生成が新しいインスタンスになること
    // - Closing 中のルームに届いた参加要求が新しいルームに回されること
    //
    // 【どのようなシナリオをテストするか】
    // 1. RegisterGuest の冪等性
    // 2. UnregisterGuest でメールボックスが閉じる / 二度目は何もしない
    // 3. 未知のルーム名への Enter でルームが作られ、ゲストから外れる
    // 4. 同じ新規ルームへの 2 つの Enter が同じインスタンスに入る
    // 5. ゲストでないセッションの Enter は破棄され、admission が閉じる
    // 6. 古い / 重複した teardown 通知は何もしない
    // 7. 退出 → teardown → 再参加で新しいインスタンスになる
    // ========================================

    const WAIT: Duration = Duration::from_secs(1);

    fn create_test_broker() -> (Broker, BrokerHandle, mpsc::UnboundedReceiver<BrokerEvent>) {
        let (handle, events) = BrokerHandle::channel();
        let broker = Broker::new(&handle);
        (broker, handle, events)
    }

    fn create_guest(broker: &mut Broker) -> (SessionId, Inbox) {
        let session = SessionId::generate();
        let (mailbox, receiver) = Mailbox::new(session, 8);
        broker.handle(BrokerEvent::RegisterGuest(mailbox));
        (session, receiver)
    }

    fn enter(
        broker: &mut Broker,
        session: SessionId,
        room: &str,
    ) -> oneshot::Receiver<RoomHandle> {
        let (request, admitted) = JoinRequest::new(RoomName::new(room).unwrap(), session);
        broker.handle(BrokerEvent::Enter(request));
        admitted
    }

    async fn admitted(receiver: oneshot::Receiver<RoomHandle>) -> RoomHandle {
        timeout(WAIT, receiver)
            .await
            .expect("admission timed out")
            .expect("join request was dropped")
    }

    #[tokio::test]
    async fn test_register_guest_is_idempotent() {
        // テスト項目: 同じセッションを二度 RegisterGuest しても最初のメールボックスが残る
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (session, mut first_rx) = create_guest(&mut broker);
        let (duplicate, mut duplicate_rx) = Mailbox::new(session, 8);

        // when (操作):
        broker.handle(BrokerEvent::RegisterGuest(duplicate));

        // then (期待する結果):
        assert!(broker.is_guest(session));
        assert_eq!(broker.guests.len(), 1);
        assert!(matches!(
            first_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
        assert_eq!(duplicate_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_guest_closes_mailbox_once() {
        // テスト項目: UnregisterGuest でメールボックスが閉じ、二度目は何もしない
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (session, mut receiver) = create_guest(&mut broker);

        // when (操作):
        broker.handle(BrokerEvent::UnregisterGuest(session));
        broker.handle(BrokerEvent::UnregisterGuest(session));

        // then (期待する結果):
        assert!(!broker.is_guest(session));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_enter_creates_room_lazily_and_clears_guest() {
        // テスト項目: 未知のルーム名への Enter でルームが生成され、ゲスト集合から外れる
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (session, _receiver) = create_guest(&mut broker);
        assert!(broker.room_id("lobby").is_none());

        // when (操作):
        let room = admitted(enter(&mut broker, session, "lobby")).await;

        // then (期待する結果):
        assert_eq!(broker.room_id("lobby"), Some(room.id()));
        assert!(!broker.is_guest(session));
    }

    #[tokio::test]
    async fn test_unregister_guest_after_enter_is_noop() {
        // テスト項目: ルームに移ったセッションへの UnregisterGuest はメールボックスを閉じない
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (session, mut receiver) = create_guest(&mut broker);
        let _room = admitted(enter(&mut broker, session, "lobby")).await;

        // when (操作):
        broker.handle(BrokerEvent::UnregisterGuest(session));

        // then (期待する結果):
        assert!(matches!(
            receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_two_first_joins_share_one_room() {
        // テスト項目: 新しいルーム "x" への 2 つの Enter は同じインスタンスに入る
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (alice, _alice_rx) = create_guest(&mut broker);
        let (bob, _bob_rx) = create_guest(&mut broker);

        // when (操作):
        let alice_admission = enter(&mut broker, alice, "x");
        let bob_admission = enter(&mut broker, bob, "x");

        // then (期待する結果):
        let alice_room = admitted(alice_admission).await;
        let bob_room = admitted(bob_admission).await;
        assert_eq!(alice_room.id(), bob_room.id());
        assert_eq!(broker.rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_enter_without_guest_drops_request() {
        // テスト項目: ゲストでないセッションの Enter は破棄され、admission が閉じる
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let stranger = SessionId::generate();

        // when (操作):
        let admission = enter(&mut broker, stranger, "lobby");

        // then (期待する結果):
        assert!(admission.await.is_err());
        assert!(broker.room_id("lobby").is_none());
    }

    #[tokio::test]
    async fn test_stale_and_duplicate_teardown_notices_are_ignored() {
        // テスト項目: 別インスタンス宛て・重複した teardown 通知は何もしない
        // given (前提条件):
        let (mut broker, _handle, _events) = create_test_broker();
        let (session, _receiver) = create_guest(&mut broker);
        let room = admitted(enter(&mut broker, session, "lobby")).await;
        let stale = RoomRef {
            id: crate::domain::RoomId::generate(),
            name: room.name().clone(),
        };

        // when (操作):
        broker.handle(BrokerEvent::NotifyRoomClosed(stale));

        // then (期待する結果):
        assert_eq!(broker.room_id("lobby"), Some(room.id()));

        // when (操作): 正しい通知を二度送る
        broker.handle(BrokerEvent::NotifyRoomClosed(room.room_ref()));
        broker.handle(BrokerEvent::NotifyRoomClosed(room.room_ref()));

        // then (期待する結果):
        assert!(broker.room_id("lobby").is_none());
    }

    #[tokio::test]
    async fn test_rejoin_after_teardown_creates_new_instance() {
        // テスト項目: 最後のメンバーが抜けたルームは撤去され、同名での再参加は新しいインスタンスになる
        // given (前提条件):
        let (mut broker, _handle, mut events) = create_test_broker();
        let (alice, _alice_rx) = create_guest(&mut broker);
        let first = admitted(enter(&mut broker, alice, "lobby")).await;

        // when (操作):
        first.unregister(alice).unwrap();
        let notice = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        broker.handle(notice);
        let (bob, _bob_rx) = create_guest(&mut broker);
        let second = admitted(enter(&mut broker, bob, "lobby")).await;

        // then (期待する結果):
        assert_ne!(first.id(), second.id());
        assert_eq!(broker.room_id("lobby"), Some(second.id()));
    }

    #[tokio::test]
    async fn test_join_racing_teardown_lands_in_fresh_room() {
        // テスト項目: teardown 通知の処理前に Closing 中のルームへ回された参加要求は、新しいルームに入る
        // given (前提条件):
        let (mut broker, _handle, mut events) = create_test_broker();
        let (alice, _alice_rx) = create_guest(&mut broker);
        let dying = admitted(enter(&mut broker, alice, "lobby")).await;
        dying.unregister(alice).unwrap();
        let notice = timeout(WAIT, events.recv()).await.unwrap().unwrap();

        // when (操作): 通知を処理する前に bob が同じルームへ参加する
        let (bob, _bob_rx) = create_guest(&mut broker);
        let bob_admission = enter(&mut broker, bob, "lobby");
        broker.handle(notice);
        let register_again = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(register_again, BrokerEvent::RegisterGuest(_)));
        broker.handle(register_again);
        let enter_again = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(enter_again, BrokerEvent::Enter(_)));
        broker.handle(enter_again);

        // then (期待する結果):
        let fresh = admitted(bob_admission).await;
        assert_ne!(fresh.id(), dying.id());
        assert_eq!(broker.room_id("lobby"), Some(fresh.id()));
        assert!(!broker.is_guest(bob));
    }

    #[tokio::test]
    async fn test_spawned_broker_admits_concurrent_joiners_to_one_room() {
        // テスト項目: 起動した Broker に並行して参加した 2 セッションが同じルームに入る
        // given (前提条件):
        let handle = Broker::spawn();

        // when (操作):
        let joins = (0..2).map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move {
                let session = SessionId::generate();
                let (mailbox, receiver) = Mailbox::new(session, 8);
                handle.register_guest(mailbox).unwrap();
                let (request, admission) = JoinRequest::new(RoomName::new("x").unwrap(), session);
                handle.enter(request).unwrap();
                (admitted(admission).await, session, receiver)
            })
        });
        let mut rooms = Vec::new();
        for join in joins.collect::<Vec<_>>() {
            rooms.push(join.await.unwrap());
        }

        // then (期待する結果):
        assert_eq!(rooms[0].0.id(), rooms[1].0.id());
        rooms[0].0.broadcast(rooms[0].1, "both".to_string()).unwrap();
        for (_, _, receiver) in rooms.iter_mut() {
            let payload = timeout(WAIT, receiver.recv()).await.unwrap();
            assert_eq!(payload, Some("both".to_string()));
        }
    }
}
