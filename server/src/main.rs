use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use server::transport;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Seconds each player gets per turn
    #[clap(short, long, default_value = "30")]
    turn_time: u32,
    /// Pause between the second player joining and the game starting
    #[clap(long, default_value = "500")]
    auto_start_delay_ms: u64,
    /// How long a flipped pair stays visible before it is resolved
    #[clap(long, default_value = "1000")]
    match_delay_ms: u64,
    /// Seconds of silence before a connection is dropped, 0 to disable
    #[clap(long, default_value = "90")]
    idle_timeout: u64,
    /// Maximum number of simultaneous connections
    #[clap(short, long, default_value = "1000")]
    max_connections: usize,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            turn_time_limit: self.turn_time.max(1),
            auto_start_delay: Duration::from_millis(self.auto_start_delay_ms),
            match_resolve_delay: Duration::from_millis(self.match_delay_ms),
            idle_timeout: (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout)),
            max_connections: self.max_connections,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let server = Server::new(args.server_config());
    let handle = server.handle();
    let mut server_task = tokio::spawn(server.run());

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Memory match server listening on ws://{}/ws", address);

    tokio::select! {
        result = transport::serve(listener, handle.clone()) => {
            if let Err(e) = result {
                error!("Transport stopped: {}", e);
            }
        }
        result = &mut server_task => {
            if let Err(e) = result {
                error!("Server loop panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    handle.shutdown();
    Ok(())
}
