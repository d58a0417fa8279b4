// Include tests
#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use uuid::Uuid;

    use crate::config::SecurityConfig;
    use crate::connection::{ConnectionId, ConnectionManager};
    use crate::directory::{Directory, MemoryIdentity, MemoryStore, Principal, RealmRecord};
    use crate::dispatch::{self, JoinGate, ServerContext};
    use crate::protocol::TerminationCode;
    use crate::registry::UserRegistry;
    use crate::security::SecurityManager;
    use crate::session::SessionManager;
    use crate::types::{PlayerId, RealmId};

    fn pid(n: u128) -> PlayerId {
        PlayerId(Uuid::from_u128(n))
    }

    fn rid(n: u128) -> RealmId {
        RealmId(Uuid::from_u128(n))
    }

    /// Dispatcher-level test harness: real context, fake sockets whose
    /// outbound queues we inspect directly.
    struct Harness {
        ctx: ServerContext,
        store: Arc<MemoryStore>,
    }

    /// One fake connected client.
    struct Client {
        socket: ConnectionId,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        /// Drains pending outbound messages into parsed envelopes. Close
        /// frames are represented as `{"event": "__close"}`.
        fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                match message {
                    Message::Text(text) => {
                        out.push(serde_json::from_str(&text).expect("invalid envelope"))
                    }
                    Message::Close(_) => out.push(json!({"event": "__close"})),
                    _ => {}
                }
            }
            out
        }

        fn events_named(&mut self, name: &str) -> Vec<Value> {
            self.drain()
                .into_iter()
                .filter(|v| v["event"] == name)
                .collect()
        }
    }

    impl Harness {
        async fn new() -> Self {
            let identity = Arc::new(MemoryIdentity::new());
            let store = Arc::new(MemoryStore::new());
            let ctx = ServerContext {
                sessions: Arc::new(SessionManager::new()),
                connections: Arc::new(ConnectionManager::new()),
                registry: Arc::new(UserRegistry::new()),
                security: Arc::new(SecurityManager::new(SecurityConfig::default())),
                directory: Directory {
                    identity: identity.clone(),
                    store: store.clone(),
                },
                join_gate: JoinGate::new(),
            };
            Self { ctx, store }
        }

        /// Seeds a realm with a two-room map and the given access control.
        async fn seed_realm(&self, realm: RealmId, owner: PlayerId, share_id: Option<Uuid>) {
            self.store
                .put_realm(RealmRecord {
                    id: realm,
                    owner_id: owner,
                    share_id,
                    map_data: json!({
                        "rooms": [
                            {"spawn": {"x": 100.0, "y": 100.0}},
                            {"spawn": {"x": 0.0, "y": 0.0}}
                        ]
                    }),
                })
                .await;
        }

        /// Registers an authenticated fake connection for the user.
        async fn connect(&self, user: PlayerId, name: &str) -> Client {
            let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            let socket = self.ctx.connections.register(addr, tx).await;
            self.ctx.connections.bind_user(socket, user).await;
            self.ctx
                .registry
                .insert(
                    user,
                    Principal {
                        username: name.to_string(),
                    },
                    socket,
                )
                .await;
            self.store.put_profile(user, "default-skin").await;
            Client { socket, rx }
        }

        async fn send(&self, client: &Client, user: PlayerId, event: &str, data: Value) {
            let frame = json!({"event": event, "data": data}).to_string();
            dispatch::handle_frame(&self.ctx, client.socket, user, &frame).await;
        }

        async fn join(&self, client: &Client, user: PlayerId, realm: RealmId) {
            self.send(
                client,
                user,
                "joinRealm",
                json!({"realmId": realm.to_string()}),
            )
            .await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn solo_join_to_public_realm() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let user = pid(1);
        let mut client = harness.connect(user, "ada").await;
        harness.join(&client, user, realm).await;

        let events = client.drain();
        assert_eq!(events.len(), 1, "only joinedRoom expected: {events:?}");
        assert_eq!(events[0]["event"], "joinedRoom");
        assert_eq!(events[0]["data"]["roomIndex"], 0);
        assert_eq!(events[0]["data"]["player"]["uid"], user.to_string());
        assert_eq!(events[0]["data"]["player"]["proximityId"], "none");
        assert_eq!(events[0]["data"]["realm"]["roomCount"], 2);

        let session = harness.ctx.sessions.session_of(user).await.unwrap();
        assert_eq!(session.player_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_player_inside_proximity() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        client_a.drain();

        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;

        // A learns about B and gets pulled into a group with it.
        let a_events = client_a.drain();
        let joined: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "playerJoinedRoom")
            .collect();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["data"]["uid"], b.to_string());
        let group: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0]["data"]["proximityId"], a.to_string());

        // B gets the join ack, the description of A, and its own update.
        let b_events = client_b.drain();
        assert_eq!(b_events[0]["event"], "joinedRoom");
        let described: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "playerJoinedRoom")
            .collect();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0]["data"]["uid"], a.to_string());
        let group: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(group[0]["data"]["proximityId"], a.to_string());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn move_out_of_proximity() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        client_a.drain();
        client_b.drain();

        // Distance 300 > 150: the pair dissolves.
        harness
            .send(&client_b, b, "movePlayer", json!({"x": 400.0, "y": 100.0}))
            .await;

        let a_events = client_a.drain();
        let moved: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "playerMoved")
            .collect();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0]["data"]["uid"], b.to_string());
        assert_eq!(moved[0]["data"]["x"], 400.0);
        let updates: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates[0]["data"]["proximityId"], "none");

        let b_events = client_b.drain();
        // The mover never receives its own playerMoved echo.
        assert!(b_events.iter().all(|v| v["event"] != "playerMoved"));
        let updates: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates[0]["data"]["proximityId"], "none");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn teleport_across_rooms() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        client_a.drain();
        client_b.drain();

        harness
            .send(
                &client_a,
                a,
                "teleport",
                json!({"x": 0.0, "y": 0.0, "roomIndex": 1}),
            )
            .await;

        // B sees the departure from room 0 and becomes solo.
        let b_events = client_b.drain();
        let teleported: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "playerTeleported")
            .collect();
        assert_eq!(teleported.len(), 1);
        assert_eq!(teleported[0]["data"]["uid"], a.to_string());
        assert_eq!(teleported[0]["data"]["roomIndex"], 1);
        let updates: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates[0]["data"]["proximityId"], "none");

        // A is alone in room 1: solo update, no teleport echo.
        let a_events = client_a.drain();
        assert!(a_events.iter().all(|v| v["event"] != "playerTeleported"));
        let updates: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates[0]["data"]["proximityId"], "none");

        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        assert_eq!(session.player(a).await.unwrap().room_index, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn teleport_within_the_same_room_sends_one_event() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        client_a.drain();
        client_b.drain();

        // Teleport into the room A is already in, out of proximity range.
        harness
            .send(
                &client_a,
                a,
                "teleport",
                json!({"x": 400.0, "y": 100.0, "roomIndex": 0}),
            )
            .await;

        // B hears about it exactly once, and becomes solo exactly once.
        let b_events = client_b.drain();
        let teleported: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "playerTeleported")
            .collect();
        assert_eq!(teleported.len(), 1);
        assert_eq!(teleported[0]["data"]["roomIndex"], 0);
        let updates: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["data"]["proximityId"], "none");

        let a_events = client_a.drain();
        assert!(a_events.iter().all(|v| v["event"] != "playerTeleported"));
        let updates: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["data"]["proximityId"], "none");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn teleport_to_unknown_room_is_dropped() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        client_a.drain();

        harness
            .send(
                &client_a,
                a,
                "teleport",
                json!({"x": 0.0, "y": 0.0, "roomIndex": 9}),
            )
            .await;
        assert!(client_a.drain().is_empty());

        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        assert_eq!(session.player(a).await.unwrap().room_index, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_login_kicks_the_old_socket() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let mut first = harness.connect(a, "ada").await;
        harness.join(&first, a, realm).await;
        first.drain();

        let mut second = harness.connect(a, "ada").await;
        harness.join(&second, a, realm).await;

        // The superseded socket receives the terminal kick and a close.
        let first_events = first.drain();
        let kicked: Vec<_> = first_events
            .iter()
            .filter(|v| v["event"] == "kicked")
            .collect();
        assert_eq!(kicked.len(), 1);
        assert_eq!(
            kicked[0]["data"],
            "You have logged in from another location."
        );
        assert!(first_events.iter().any(|v| v["event"] == "__close"));

        // The new socket joined cleanly, with no self playerJoinedRoom.
        let second_events = second.drain();
        assert!(second_events.iter().any(|v| v["event"] == "joinedRoom"));
        assert!(second_events
            .iter()
            .all(|v| v["event"] != "playerJoinedRoom"));

        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        assert_eq!(
            session.player(a).await.unwrap().socket_id,
            second.socket
        );
        assert_eq!(session.player_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejoin_on_the_same_connection_does_not_kick_it() {
        let harness = Harness::new().await;
        let realm_one = rid(100);
        let realm_two = rid(200);
        harness.seed_realm(realm_one, pid(99), None).await;
        harness.seed_realm(realm_two, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm_one).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm_one).await;
        client_a.drain();
        client_b.drain();

        // Joining the same realm again on the same connection re-seats the
        // player without a kick; the socket stays open and receives the
        // fresh join handshake.
        harness.join(&client_a, a, realm_one).await;
        let a_events = client_a.drain();
        assert!(a_events.iter().all(|v| v["event"] != "kicked"));
        assert!(a_events.iter().all(|v| v["event"] != "__close"));
        assert!(a_events.iter().any(|v| v["event"] == "joinedRoom"));
        let described: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "playerJoinedRoom")
            .collect();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0]["data"]["uid"], b.to_string());

        // The roommate sees the leave-then-rejoin pair.
        let b_events = client_b.drain();
        assert!(b_events.iter().any(|v| v["event"] == "playerLeftRoom"));
        assert!(b_events.iter().any(|v| v["event"] == "playerJoinedRoom"));

        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        assert_eq!(session.player(a).await.unwrap().socket_id, client_a.socket);
        assert_eq!(session.player_count().await, 2);

        // Switching realms over the same connection leaves realm one and
        // enters realm two, again with no kick.
        harness.join(&client_a, a, realm_two).await;
        let a_events = client_a.drain();
        assert!(a_events.iter().all(|v| v["event"] != "kicked"));
        assert!(a_events.iter().all(|v| v["event"] != "__close"));
        assert!(a_events.iter().any(|v| v["event"] == "joinedRoom"));

        let left = client_b.events_named("playerLeftRoom");
        assert_eq!(left[0]["data"], a.to_string());

        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        assert_eq!(session.realm().id, realm_two);
        let old_session = harness.ctx.sessions.session(realm_one).await.unwrap();
        assert!(old_session.contains(b).await);
        assert!(!old_session.contains(a).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn share_link_protection() {
        let harness = Harness::new().await;
        let realm = rid(100);
        let owner = pid(99);
        let share = Uuid::from_u128(7777);
        harness.seed_realm(realm, owner, Some(share)).await;

        let user = pid(1);
        let mut client = harness.connect(user, "ada").await;

        // No share link supplied.
        harness.join(&client, user, realm).await;
        let events = client.events_named("joinFailed");
        assert_eq!(events[0]["data"], "This realm requires a share link.");

        // Wrong share link.
        harness
            .send(
                &client,
                user,
                "joinRealm",
                json!({"realmId": realm.to_string(), "shareId": Uuid::from_u128(8888).to_string()}),
            )
            .await;
        let events = client.events_named("joinFailed");
        assert_eq!(events[0]["data"], "The share link has been changed.");

        // Correct share link.
        harness
            .send(
                &client,
                user,
                "joinRealm",
                json!({"realmId": realm.to_string(), "shareId": share.to_string()}),
            )
            .await;
        assert_eq!(client.events_named("joinedRoom").len(), 1);

        // The owner never needs one.
        let mut owner_client = harness.connect(owner, "olive").await;
        harness.join(&owner_client, owner, realm).await;
        assert_eq!(owner_client.events_named("joinedRoom").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn join_failures_for_missing_records() {
        let harness = Harness::new().await;
        let user = pid(1);
        let mut client = harness.connect(user, "ada").await;

        // Unknown realm.
        harness.join(&client, user, rid(404)).await;
        let events = client.events_named("joinFailed");
        assert_eq!(events[0]["data"], "Space not found");

        // Known realm but no profile.
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;
        let ghost = pid(2);
        // connect() seeds a profile; register this connection by hand to
        // leave the profile missing.
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = harness.ctx.connections.register(addr, tx).await;
        harness.ctx.connections.bind_user(socket, ghost).await;
        harness
            .ctx
            .registry
            .insert(
                ghost,
                Principal {
                    username: "ghost".into(),
                },
                socket,
            )
            .await;
        let mut ghost_client = Client { socket, rx };
        harness.join(&ghost_client, ghost, realm).await;
        let events = ghost_client.events_named("joinFailed");
        assert_eq!(events[0]["data"], "Failed to get profile");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn chat_and_skin_stay_inside_the_room() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let c = pid(3);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        let mut client_c = harness.connect(c, "cyn").await;
        harness.join(&client_c, c, realm).await;

        // Move C to room 1, then drain everything.
        harness
            .send(
                &client_c,
                c,
                "teleport",
                json!({"x": 0.0, "y": 0.0, "roomIndex": 1}),
            )
            .await;
        client_a.drain();
        client_b.drain();
        client_c.drain();

        harness
            .send(&client_a, a, "sendMessage", json!("hello   room  zero"))
            .await;
        harness.send(&client_a, a, "changedSkin", json!("wizard")).await;

        // B hears the (whitespace-normalized) message and sees the skin.
        let b_events = client_b.drain();
        let chat: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "receiveMessage")
            .collect();
        assert_eq!(chat[0]["data"]["message"], "hello room zero");
        let skins: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "playerChangedSkin")
            .collect();
        assert_eq!(skins[0]["data"]["skin"], "wizard");

        // C is in another room and hears nothing; A gets no echo.
        assert!(client_c.drain().is_empty());
        assert!(client_a.drain().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owner_kick_and_non_owner_kick() {
        let harness = Harness::new().await;
        let realm = rid(100);
        let owner = pid(1);
        harness.seed_realm(realm, owner, None).await;

        let b = pid(2);
        let mut owner_client = harness.connect(owner, "olive").await;
        harness.join(&owner_client, owner, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        owner_client.drain();
        client_b.drain();

        // Non-owner kick attempts are ignored.
        harness
            .send(&client_b, b, "kickPlayer", json!({"uid": owner.to_string()}))
            .await;
        assert!(owner_client.drain().is_empty());

        // The owner's kick removes the target with a terminal message.
        harness
            .send(
                &owner_client,
                owner,
                "kickPlayer",
                json!({"uid": b.to_string()}),
            )
            .await;
        let b_events = client_b.drain();
        let terminated: Vec<_> = b_events
            .iter()
            .filter(|v| v["event"] == "sessionTerminated")
            .collect();
        assert_eq!(terminated[0]["data"]["code"], "OWNER_KICKED");
        assert!(b_events.iter().any(|v| v["event"] == "__close"));

        let left = owner_client.events_named("playerLeftRoom");
        assert_eq!(left[0]["data"], b.to_string());

        let session = harness.ctx.sessions.session_of(owner).await.unwrap();
        assert!(!session.contains(b).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_broadcasts_departure_and_destroys_empty_session() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        client_a.drain();
        client_b.drain();

        dispatch::disconnect(&harness.ctx, client_b.socket).await;

        let a_events = client_a.drain();
        let left: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "playerLeftRoom")
            .collect();
        assert_eq!(left[0]["data"], b.to_string());
        // A is alone again.
        let updates: Vec<_> = a_events
            .iter()
            .filter(|v| v["event"] == "proximityUpdate")
            .collect();
        assert_eq!(updates[0]["data"]["proximityId"], "none");
        assert!(harness.ctx.registry.principal(b).await.is_none());

        dispatch::disconnect(&harness.ctx, client_a.socket).await;
        assert_eq!(harness.ctx.sessions.session_count().await, 0);
        assert_eq!(harness.ctx.connections.count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejoining_after_leave_is_clean() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let mut client = harness.connect(a, "ada").await;
        harness.join(&client, a, realm).await;
        dispatch::disconnect(&harness.ctx, client.socket).await;
        assert_eq!(harness.ctx.sessions.session_count().await, 0);

        let mut client = harness.connect(a, "ada").await;
        harness.join(&client, a, realm).await;
        assert_eq!(client.events_named("joinedRoom").len(), 1);
        assert_eq!(harness.ctx.sessions.session_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rate_limited_joins_get_an_error_event() {
        let harness = Harness::new().await;
        let user = pid(1);
        let mut client = harness.connect(user, "ada").await;

        // joinRealm quota is 5 per minute; the realm not existing doesn't
        // matter, the limiter runs before the store lookup.
        for _ in 0..5 {
            harness.join(&client, user, rid(404)).await;
        }
        assert_eq!(client.events_named("joinFailed").len(), 5);

        harness.join(&client, user, rid(404)).await;
        let events = client.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "error");
        assert_eq!(events[0]["data"]["code"], "RATE_LIMITED");
        assert_eq!(events[0]["data"]["event"], "joinRealm");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_payloads_are_dropped_silently_except_join() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let mut client = harness.connect(a, "ada").await;
        harness.join(&client, a, realm).await;
        client.drain();

        // Out-of-range move, malformed teleport, bad skin: silence.
        harness
            .send(&client, a, "movePlayer", json!({"x": 99999.0, "y": 0.0}))
            .await;
        harness.send(&client, a, "teleport", json!({"x": 1.0})).await;
        harness.send(&client, a, "changedSkin", json!("has spaces")).await;
        harness.send(&client, a, "sendMessage", json!("   ")).await;
        assert!(client.drain().is_empty());

        // Invalid join answers.
        harness
            .send(&client, a, "joinRealm", json!({"realmId": "not-a-uuid"}))
            .await;
        assert_eq!(client.events_named("joinFailed").len(), 1);

        // Position was untouched by the rejected move.
        let session = harness.ctx.sessions.session_of(a).await.unwrap();
        let player = session.player(a).await.unwrap();
        assert_eq!((player.x, player.y), (100.0, 100.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_without_a_session_are_dropped() {
        let harness = Harness::new().await;
        let a = pid(1);
        let mut client = harness.connect(a, "ada").await;

        harness
            .send(&client, a, "movePlayer", json!({"x": 1.0, "y": 1.0}))
            .await;
        harness.send(&client, a, "sendMessage", json!("anyone?")).await;
        assert!(client.drain().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn realm_eviction_terminates_every_member() {
        let harness = Harness::new().await;
        let realm = rid(100);
        harness.seed_realm(realm, pid(99), None).await;

        let a = pid(1);
        let b = pid(2);
        let mut client_a = harness.connect(a, "ada").await;
        harness.join(&client_a, a, realm).await;
        let mut client_b = harness.connect(b, "ben").await;
        harness.join(&client_b, b, realm).await;
        client_a.drain();
        client_b.drain();

        dispatch::evict_realm(
            &harness.ctx,
            realm,
            TerminationCode::RealmUpdated,
            "This realm has been updated.",
        )
        .await;

        for client in [&mut client_a, &mut client_b] {
            let events = client.drain();
            let terminated: Vec<_> = events
                .iter()
                .filter(|v| v["event"] == "sessionTerminated")
                .collect();
            assert_eq!(terminated[0]["data"]["code"], "REALM_UPDATED");
            assert!(events.iter().any(|v| v["event"] == "__close"));
        }
        assert_eq!(harness.ctx.sessions.session_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_join_is_single_flight() {
        let harness = Harness::new().await;
        let user = pid(1);
        let mut client = harness.connect(user, "ada").await;

        // Holding the gate simulates a join still in flight.
        let permit = harness.ctx.join_gate.try_acquire(user).unwrap();
        harness.join(&client, user, rid(404)).await;
        let events = client.events_named("joinFailed");
        assert_eq!(events[0]["data"], "Already joining a space.");
        drop(permit);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn socket_ids_stay_unique_across_sessions() {
        let harness = Harness::new().await;
        let realm_one = rid(100);
        let realm_two = rid(200);
        harness.seed_realm(realm_one, pid(99), None).await;
        harness.seed_realm(realm_two, pid(99), None).await;

        let mut sockets = Vec::new();
        for n in 1..=4u128 {
            let user = pid(n);
            let client = harness.connect(user, "user").await;
            let realm = if n % 2 == 0 { realm_one } else { realm_two };
            harness.join(&client, user, realm).await;
            sockets.push(client);
        }

        let mut seen = std::collections::HashSet::new();
        for realm in [realm_one, realm_two] {
            let session = harness.ctx.sessions.session(realm).await.unwrap();
            for player in session.players().await {
                assert!(seen.insert(player.socket_id), "duplicate socket id");
                // Reverse index agrees with the forward map.
                let via_user = harness.ctx.sessions.session_of(player.user_id).await.unwrap();
                assert!(via_user.contains(player.user_id).await);
            }
        }
        assert_eq!(seen.len(), 4);
    }
}
