//! End-to-end tests driving a real server and clients over localhost.
//!
//! Each test boots its own server on an ephemeral port; the handlers run
//! their I/O on private runtimes, so the tests themselves stay synchronous
//! and poll the way a game loop would.

use client::{ClientConfig, ClientHandler};
use server::{memory_world_runner, ServerConfig, ServerHandler, StaticLevels};
use shared::messages::{Action, Message, MessageKind, Point};
use shared::translator::DefaultSnapshotTranslator;
use shared::world::{EntityWorld, MemoryWorld};
use shared::{ConnectionState, NetworkHandler};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn start_server() -> ServerHandler<MemoryWorld> {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tick_hz: 50,
        snapshot_hz: 50,
    };
    let mut handler = ServerHandler::new(
        config,
        MemoryWorld::new(),
        Box::new(StaticLevels::new("maze", Point::new(1.0, 1.0))),
        memory_world_runner(),
    );
    handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
    handler.start().expect("server failed to start");
    handler
}

fn connect_client(addr: SocketAddr, name: &str) -> ClientHandler {
    let mut handler = ClientHandler::new(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        player_name: name.to_string(),
    });
    handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
    handler.start().expect("client failed to start");
    handler
}

/// Polls the handler until the condition holds or the timeout elapses.
fn poll_until<F>(
    handler: &mut ClientHandler,
    mirror: &mut MemoryWorld,
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut(&ClientHandler, &MemoryWorld) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        handler.poll_and_dispatch(mirror);
        if condition(handler, mirror) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn single_client_handshake_and_snapshot_delivery() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut alice = connect_client(addr, "Alice");
    let ticks: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let level: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&ticks);
    alice
        .dispatcher_mut()
        .register_handler(MessageKind::Snapshot, move |message| {
            if let Message::Snapshot { server_tick, .. } = message {
                sink.lock().unwrap().push(server_tick);
            }
        });
    let sink = Arc::clone(&level);
    alice
        .dispatcher_mut()
        .register_handler(MessageKind::LevelChange, move |message| {
            if let Message::LevelChange { level_name, .. } = message {
                *sink.lock().unwrap() = Some(level_name);
            }
        });

    let mut mirror = MemoryWorld::new();
    mirror.spawn_player("Alice", Point::ZERO);

    // Within a second the hero appears at the level's start tile.
    let applied = poll_until(
        &mut alice,
        &mut mirror,
        Duration::from_secs(5),
        |_, mirror| {
            mirror
                .position("hero-Alice")
                .is_some_and(|p| p.x > 0.5 && p.y > 0.5)
        },
    );
    assert!(applied, "no snapshot reached the mirror");

    assert_eq!(alice.client_id(), Some(1));
    assert_eq!(alice.connection_state(), ConnectionState::DatagramRegistered);
    assert_eq!(level.lock().unwrap().as_deref(), Some("maze"));

    let ticks = ticks.lock().unwrap();
    assert!(!ticks.is_empty());
    assert!(ticks[0] > 0);
    assert!(ticks.windows(2).all(|w| w[1] > w[0]), "ticks not increasing");

    alice.shutdown("test over");
    server.shutdown("test over");
}

#[test]
fn repeated_move_inputs_advance_hero_eastward() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut bob = connect_client(addr, "Bob");
    let mut mirror = MemoryWorld::new();
    mirror.spawn_player("Bob", Point::ZERO);

    let ready = poll_until(&mut bob, &mut mirror, Duration::from_secs(5), |_, mirror| {
        mirror.position("hero-Bob").is_some_and(|p| p.x > 0.5)
    });
    assert!(ready, "hero never appeared");
    let start_x = mirror.position("hero-Bob").unwrap().x;

    let mut samples = Vec::new();
    for _ in 0..10 {
        bob.send_input(Action::Move, Point::new(1.0, 0.0));
        bob.poll_and_dispatch(&mut mirror);
        samples.push(mirror.position("hero-Bob").unwrap().x);
        thread::sleep(Duration::from_millis(50));
    }
    bob.poll_and_dispatch(&mut mirror);
    samples.push(mirror.position("hero-Bob").unwrap().x);

    let final_x = *samples.last().unwrap();
    assert!(
        final_x > start_x + 0.4,
        "hero barely moved: {start_x} -> {final_x}"
    );
    // Authoritative positions only ever move along +x here.
    assert!(
        samples.windows(2).all(|w| w[1] >= w[0] - 1e-4),
        "positions regressed: {samples:?}"
    );

    bob.shutdown("test over");
    server.shutdown("test over");
}

#[test]
fn two_clients_receive_each_others_heroes() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut bob = connect_client(addr, "Bob");
    let mut bob_mirror = MemoryWorld::new();
    bob_mirror.spawn_player("Bob", Point::ZERO);
    bob_mirror.spawn_player("Carol", Point::ZERO);

    // Let Bob finish his handshake first so ids are deterministic.
    assert!(poll_until(
        &mut bob,
        &mut bob_mirror,
        Duration::from_secs(5),
        |handler, _| handler.client_id().is_some(),
    ));
    assert_eq!(bob.client_id(), Some(1));

    let mut carol = connect_client(addr, "Carol");
    let mut carol_mirror = MemoryWorld::new();
    carol_mirror.spawn_player("Bob", Point::ZERO);
    carol_mirror.spawn_player("Carol", Point::ZERO);

    assert!(poll_until(
        &mut carol,
        &mut carol_mirror,
        Duration::from_secs(5),
        |handler, _| handler.client_id().is_some(),
    ));
    assert_eq!(carol.client_id(), Some(2));

    // Every subsequent snapshot reaches both clients and carries both heroes.
    let both_on_bob = poll_until(
        &mut bob,
        &mut bob_mirror,
        Duration::from_secs(5),
        |_, mirror| {
            mirror.position("hero-Bob").is_some_and(|p| p.x > 0.5)
                && mirror.position("hero-Carol").is_some_and(|p| p.x > 0.5)
        },
    );
    assert!(both_on_bob, "Bob never saw both heroes");

    let both_on_carol = poll_until(
        &mut carol,
        &mut carol_mirror,
        Duration::from_secs(5),
        |_, mirror| {
            mirror.position("hero-Bob").is_some_and(|p| p.x > 0.5)
                && mirror.position("hero-Carol").is_some_and(|p| p.x > 0.5)
        },
    );
    assert!(both_on_carol, "Carol never saw both heroes");

    bob.shutdown("test over");
    carol.shutdown("test over");
    server.shutdown("test over");
}

#[test]
fn underscore_name_is_rejected_and_channel_closed() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut impostor = connect_client(addr, "bad_name");
    let reject: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&reject);
    impostor
        .dispatcher_mut()
        .register_handler(MessageKind::ConnectReject, move |message| {
            if let Message::ConnectReject { reason } = message {
                *sink.lock().unwrap() = Some(reason);
            }
        });

    let mut mirror = MemoryWorld::new();
    let rejected = poll_until(
        &mut impostor,
        &mut mirror,
        Duration::from_secs(5),
        |handler, _| reject.lock().unwrap().is_some() && !handler.is_connected(),
    );
    assert!(rejected, "rejection never arrived");
    assert!(reject
        .lock()
        .unwrap()
        .as_deref()
        .unwrap()
        .contains("Invalid player name"));
    assert_eq!(impostor.client_id(), None);

    // No session was created: the next valid client still gets id 1.
    let mut alice = connect_client(addr, "Alice");
    assert!(poll_until(
        &mut alice,
        &mut mirror,
        Duration::from_secs(5),
        |handler, _| handler.client_id().is_some(),
    ));
    assert_eq!(alice.client_id(), Some(1));

    impostor.shutdown("test over");
    alice.shutdown("test over");
    server.shutdown("test over");
}

#[test]
fn abrupt_disconnect_removes_hero_from_snapshots() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut eve = connect_client(addr, "Eve");
    let mut eve_mirror = MemoryWorld::new();
    eve_mirror.spawn_player("Eve", Point::ZERO);
    eve_mirror.spawn_player("Frank", Point::ZERO);

    let latest_names: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&latest_names);
    eve.dispatcher_mut()
        .register_handler(MessageKind::Snapshot, move |message| {
            if let Message::Snapshot { entities, .. } = message {
                *sink.lock().unwrap() =
                    entities.into_iter().map(|state| state.entity_name).collect();
            }
        });

    let mut frank = connect_client(addr, "Frank");
    let mut frank_mirror = MemoryWorld::new();
    frank_mirror.spawn_player("Frank", Point::ZERO);

    // Wait until Eve's snapshots contain both heroes.
    let both_seen = poll_until(
        &mut eve,
        &mut eve_mirror,
        Duration::from_secs(5),
        |_, _| {
            let names = latest_names.lock().unwrap();
            names.contains(&"hero-Eve".to_string()) && names.contains(&"hero-Frank".to_string())
        },
    );
    assert!(both_seen, "Frank never showed up");

    // Frank drops off the map without a goodbye.
    frank.shutdown("gone");
    drop(frank);

    let frank_gone = poll_until(
        &mut eve,
        &mut eve_mirror,
        Duration::from_secs(5),
        |_, _| {
            let names = latest_names.lock().unwrap();
            names.contains(&"hero-Eve".to_string()) && !names.contains(&"hero-Frank".to_string())
        },
    );
    assert!(frank_gone, "snapshots still include the departed hero");

    eve.shutdown("test over");
    server.shutdown("test over");
}

#[test]
fn client_reports_disconnect_when_server_stops() {
    let mut server = start_server();
    let addr = server.local_addr().unwrap();

    let mut alice = connect_client(addr, "Alice");
    let mut mirror = MemoryWorld::new();
    assert!(poll_until(
        &mut alice,
        &mut mirror,
        Duration::from_secs(5),
        |handler, _| handler.client_id().is_some(),
    ));

    server.shutdown("server going away");

    let disconnected = poll_until(
        &mut alice,
        &mut mirror,
        Duration::from_secs(5),
        |handler, _| !handler.is_connected(),
    );
    assert!(disconnected, "client never noticed the server vanishing");
    assert_eq!(alice.connection_state(), ConnectionState::Disconnected);

    alice.shutdown("test over");
}
