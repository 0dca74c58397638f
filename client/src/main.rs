use clap::Parser;
use client::game::{ClientGameState, FramePacer};
use client::input::{InputSource, WanderInput};
use client::network::{ClientSession, NetworkHandle, SharedPlayer};
use client::rendering::{LogRenderer, Renderer};
use log::{info, warn};
use shared::{FrameConfig, PlayerState, WorldCodec};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name, unique on the server
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Local simulation and render rate
    #[arg(short = 'f', long, default_value = "60")]
    target_fps: u32,

    /// State exchanges with the server per second
    #[arg(long, default_value = "20")]
    sync_rate: u32,

    /// Viewport width in world units
    #[arg(short = 'w', long, default_value = "1280")]
    viewport_width: f32,

    /// Viewport height in world units (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "720")]
    viewport_height: f32,

    /// Stop after this many frames; 0 runs until interrupted
    #[arg(long, default_value = "0")]
    frames: u64,

    /// Seed for the wandering input
    #[arg(long, default_value = "0")]
    seed: u64,
}

async fn run_frames(
    args: &Args,
    game: &mut ClientGameState,
    network: &NetworkHandle,
) {
    let mut input = WanderInput::new(args.seed);
    let mut renderer = LogRenderer::new(
        args.viewport_width,
        args.viewport_height,
        u64::from(args.target_fps.max(1)),
    );
    let mut pacer = FramePacer::new(args.target_fps);

    while args.frames == 0 || renderer.frames() < args.frames {
        let dt = pacer.wait().await;
        game.apply_input(input.poll(), dt);

        let local = game.player().snapshot();
        let peers = network.peers();
        renderer.render(game.world(), &local, &peers);

        if network.is_finished() {
            warn!("Lost connection to server");
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {} as {:?}", args.server, args.name);

    let player = SharedPlayer::new(PlayerState::new(args.name.clone(), (0.0, 0.0)));
    let (session, world) =
        ClientSession::connect(&args.server, player.clone(), &WorldCodec::new(), FrameConfig::default())
            .await?;

    let spawn = ClientGameState::spawn_position(&world);
    player.update(|p| p.position = spawn);

    let mut game = ClientGameState::new(world, player);
    let network = session.spawn(Duration::from_nanos(
        1_000_000_000 / u64::from(args.sync_rate.max(1)),
    ));

    tokio::select! {
        _ = run_frames(&args, &mut game, &network) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    network.shutdown();
    info!("Client stopped after {} frames", game.frame);
    Ok(())
}
