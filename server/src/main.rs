use clap::Parser;
use log::info;
use server::{ServerConfig, ServerHandler, StaticLevels};
use shared::messages::Point;
use shared::translator::DefaultSnapshotTranslator;
use shared::world::MemoryWorld;
use shared::NetworkHandler;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both channels to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port shared by the reliable listener and the datagram socket
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Simulation rate (ticks per second)
    #[arg(short, long, default_value_t = shared::TICK_HZ)]
    tick_rate: u32,

    /// Snapshot broadcast rate (per second)
    #[arg(short, long, default_value_t = shared::SNAPSHOT_HZ)]
    snapshot_rate: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!(
        "Starting dedicated server on {}:{} ({}Hz simulation, {}Hz snapshots)",
        args.host, args.port, args.tick_rate, args.snapshot_rate
    );

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        tick_hz: args.tick_rate,
        snapshot_hz: args.snapshot_rate,
    };

    let mut handler = ServerHandler::new(
        config,
        MemoryWorld::new(),
        Box::new(StaticLevels::new("maze", Point::new(1.0, 1.0))),
        server::memory_world_runner(),
    );
    handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
    handler.start()?;
    info!("Server ready on {:?}", handler.local_addr());

    // The authoritative world lives on the tick loop; this scratch world only
    // satisfies the poll signature.
    let mut scratch = MemoryWorld::new();
    loop {
        handler.poll_and_dispatch(&mut scratch);
        std::thread::sleep(Duration::from_millis(50));
    }
}
