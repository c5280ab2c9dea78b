use clap::Parser;
use client::config::{Args, ClientConfig, PlayMode};
use client::network::{connect, Client};
use env_logger::Env;
use log::{error, info};
use shared::format_decimal;
use tokio::io::BufReader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug to see protocol traffic");
    }

    let config = ClientConfig::from(Args::parse());
    info!(
        "Playing as {} against {}:{} ({:?}, {:?})",
        config.player_id, config.server, config.port, config.family, config.mode
    );

    let (stream, peer) = connect(&config).await?;
    let client = Client::new(stream, peer, config.player_id.clone(), config.mode);
    let operator = match config.mode {
        PlayMode::Interactive => Some(BufReader::new(tokio::io::stdin())),
        PlayMode::Autonomous => None,
    };

    // The stdin reader may still be parked on a blocking read, so leave via
    // process::exit rather than waiting for the runtime to shut down.
    match client.play(operator).await {
        Ok(scores) => {
            println!("Final scores:");
            for entry in &scores {
                let marker = if entry.player_id == config.player_id { " *" } else { "" };
                println!("  {:<20} {}{}", entry.player_id, format_decimal(entry.score), marker);
            }
            std::process::exit(0);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
