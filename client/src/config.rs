//! Command line configuration for the game client

use clap::Parser;
use shared::is_valid_player_id;
use std::net::SocketAddr;

/// Polynomial approximation game client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Player id (letters and digits only)
    #[arg(short = 'u', long = "player", value_parser = parse_player_id)]
    pub player_id: String,

    /// Server host name or address
    #[arg(short = 's', long)]
    pub server: String,

    /// Server port
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Connect over IPv4 only
    #[arg(short = '4')]
    pub ipv4: bool,

    /// Connect over IPv6 only
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Play automatically instead of reading puts from stdin
    #[arg(short = 'a', long = "auto")]
    pub auto: bool,
}

fn parse_player_id(s: &str) -> Result<String, String> {
    if is_valid_player_id(s) {
        Ok(s.to_string())
    } else {
        Err("player id must be one or more ASCII letters or digits".to_string())
    }
}

/// Address families the client may connect over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
    Any,
}

impl AddressFamily {
    /// `-4` and `-6` together mean the same as neither.
    pub fn from_flags(ipv4: bool, ipv6: bool) -> Self {
        match (ipv4, ipv6) {
            (true, false) => AddressFamily::V4,
            (false, true) => AddressFamily::V6,
            _ => AddressFamily::Any,
        }
    }

    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
            AddressFamily::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Puts come from operator lines on stdin
    Interactive,
    /// Puts are computed from the server's replies
    Autonomous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub player_id: String,
    pub server: String,
    pub port: u16,
    pub family: AddressFamily,
    pub mode: PlayMode,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            player_id: args.player_id,
            server: args.server,
            port: args.port,
            family: AddressFamily::from_flags(args.ipv4, args.ipv6),
            mode: if args.auto {
                PlayMode::Autonomous
            } else {
                PlayMode::Interactive
            },
        }
    }
}
