use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use shared::GridSize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws")]
    server: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Avatar shown next to the name
    #[arg(short = 'a', long, default_value = "🙂")]
    avatar: String,

    /// Board size: 4x4, 4x6 or 6x6
    #[arg(short = 'g', long, default_value = "4x4")]
    grid: GridSize,

    /// Number of games to play before leaving
    #[arg(long, default_value = "1")]
    games: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Playing {} game(s) on a {} board", args.games, args.grid);

    let mut client = Client::connect(ClientOptions {
        server_url: args.server,
        player_name: args.name,
        avatar: args.avatar,
        grid_size: args.grid,
        games: args.games.max(1),
    })
    .await?;

    client.run().await?;

    Ok(())
}
