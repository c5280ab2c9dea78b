use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::{Args, GameConfig};
use server::network::Server;

/// Parses arguments, opens the coefficient file and serves rounds until a
/// fatal error or Ctrl+C.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = GameConfig::from(Args::parse());
    let mut server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Cannot start server: {}", e);
            return Err(e.into());
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
