use clap::Parser;
use server::network::Server;
use server::settings::{BotSpawnMode, ServerSettings};
use std::time::Duration;

/// Parses command-line arguments, builds the round settings and runs the
/// server until Ctrl+C or a fatal error.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "30")]
        tick_rate: u32,
        /// Maximum number of concurrent clients
        #[clap(short, long, default_value = "16")]
        max_clients: usize,
        /// Seconds between respawn waves
        #[clap(long, default_value = "180")]
        respawn_interval: f32,
        /// Fraction of connected clients that must be waiting before a wave starts
        #[clap(long, default_value = "0.5")]
        min_respawn_ratio: f32,
        /// Seconds the shuttle stays on station before returning
        #[clap(long, default_value = "180")]
        max_transport_time: f32,
        /// Crew size to maintain by filling with bots
        #[clap(long, default_value = "0")]
        bot_count: usize,
        /// Top up the crew with bots instead of only reviving dead ones
        #[clap(long)]
        fill_with_bots: bool,
        /// Allow clients to join as spectators
        #[clap(long)]
        allow_spectating: bool,
        /// Ask mid-round campaign respawnees whether to wait for the next round
        #[clap(long)]
        respawn_prompt: bool,
        /// Respawn directly in the main submarine instead of using a shuttle
        #[clap(long)]
        no_respawn_shuttle: bool,
    }

    let args = Args::parse();

    let settings = ServerSettings {
        max_clients: args.max_clients,
        respawn_interval: args.respawn_interval,
        min_respawn_ratio: args.min_respawn_ratio,
        max_transport_time: args.max_transport_time,
        allow_spectating: args.allow_spectating,
        bot_count: args.bot_count,
        bot_spawn_mode: if args.fill_with_bots {
            BotSpawnMode::Fill
        } else {
            BotSpawnMode::Normal
        },
        use_respawn_prompt: args.respawn_prompt,
        use_respawn_shuttle: !args.no_respawn_shuttle,
        override_respawn_sub: false,
    };

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f32(1.0 / args.tick_rate as f32);

    let mut server = Server::new(&address, tick_duration, settings).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    }
}
