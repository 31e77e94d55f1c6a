use clap::Parser;
use client::{ClientConfig, ClientHandler};
use log::{info, warn};
use shared::messages::{Action, MessageKind, Point};
use shared::translator::DefaultSnapshotTranslator;
use shared::world::{EntityWorld, MemoryWorld};
use shared::NetworkHandler;
use std::time::{Duration, Instant};

/// Headless development client: connects, walks the hero east, and logs what
/// the server sends back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Player name (no underscores)
    #[arg(short, long, default_value = "Wanderer")]
    name: String,

    /// Seconds to run before disconnecting
    #[arg(short, long, default_value_t = 10)]
    duration: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to {}:{} as '{}'", args.host, args.port, args.name);

    let mut handler = ClientHandler::new(ClientConfig {
        host: args.host,
        port: args.port,
        player_name: args.name.clone(),
    });
    handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
    handler
        .dispatcher_mut()
        .register_handler(MessageKind::LevelChange, |message| {
            info!("Level change: {message:?}");
        });
    handler
        .dispatcher_mut()
        .register_handler(MessageKind::ConnectReject, |message| {
            warn!("Connection rejected: {message:?}");
        });
    handler
        .dispatcher_mut()
        .register_handler(MessageKind::GameOver, |_| {
            info!("Game over");
        });
    handler.start()?;

    // Local mirror the snapshot translator writes into.
    let mut mirror = MemoryWorld::new();
    let hero = mirror.spawn_player(&args.name, Point::ZERO);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut last_input = Instant::now();
    while Instant::now() < deadline && handler.is_connected() {
        handler.poll_and_dispatch(&mut mirror);

        if last_input.elapsed() >= Duration::from_millis(200) {
            handler.send_input(Action::Move, Point::new(1.0, 0.0));
            last_input = Instant::now();
            if let Some(position) = mirror.position(&hero) {
                info!("Hero at ({:.2}, {:.2})", position.x, position.y);
            }
        }

        std::thread::sleep(Duration::from_millis(16));
    }

    handler.shutdown("session finished");
    Ok(())
}
