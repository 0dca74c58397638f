use clap::{Parser, ValueEnum};
use log::{error, info};
use server::game::WorldTicker;
use server::network::{Server, ServerConfig, DEFAULT_INBOUND_MAX_FRAME_LEN};
use server::registry::DuplicateOriginPolicy;
use shared::generation::{NoiseGenerator, RandomColorGenerator, WorldGenerator};
use shared::world::DEFAULT_CHUNK_SIZE;
use shared::{FrameConfig, WorldCodec};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GeneratorKind {
    /// Value-noise terrain with water, sand and peaks
    Noise,
    /// Plain blocks of random colours
    Random,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// World ticks per second
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Number of chunks along x
    #[arg(long, default_value = "32")]
    chunks_x: u32,

    /// Number of chunks along y
    #[arg(long, default_value = "32")]
    chunks_y: u32,

    /// Blocks per chunk side
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u32,

    /// World generation seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// World generator
    #[arg(long, value_enum, default_value = "noise")]
    generator: GeneratorKind,

    /// What to do with a second handshake from an already registered address
    #[arg(long, value_enum, default_value = "reject")]
    duplicate_origin: DuplicateOriginPolicy,

    /// Largest frame accepted from a client, in bytes
    #[arg(long, default_value_t = DEFAULT_INBOUND_MAX_FRAME_LEN)]
    max_client_frame: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting server...");
    info!(
        "World: {}x{} chunks of {} blocks, {:?} generator, seed {}",
        args.chunks_x, args.chunks_y, args.chunk_size, args.generator, args.seed
    );

    let chunks_count = (args.chunks_x, args.chunks_y);
    let world = match args.generator {
        GeneratorKind::Noise => NoiseGenerator::new(args.seed).generate(chunks_count, args.chunk_size)?,
        GeneratorKind::Random => {
            RandomColorGenerator { seed: args.seed }.generate(chunks_count, args.chunk_size)?
        }
    };

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        duplicate_origin: args.duplicate_origin,
        outbound: FrameConfig::default(),
        inbound: FrameConfig {
            max_frame_len: args.max_client_frame,
            ..FrameConfig::default()
        },
    };
    let mut server = Server::bind(config, &world, &WorldCodec::new()).await?;
    let ticker = WorldTicker::new(args.tick_rate).spawn();

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    ticker.shutdown();
    Ok(())
}
