//! Command line configuration for the game server

use clap::Parser;
use std::path::PathBuf;

/// Polynomial approximation game server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on (0 lets the OS pick one)
    #[arg(short = 'p', long, default_value_t = 0)]
    pub port: u16,

    /// Largest valid point index K
    #[arg(short = 'k', long = "max-point", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub max_point: u32,

    /// Polynomial degree N
    #[arg(short = 'n', long, default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..=8))]
    pub degree: u32,

    /// Accepted puts per round M
    #[arg(short = 'm', long = "max-puts", default_value_t = 131,
          value_parser = clap::value_parser!(u32).range(1..=12_341_234))]
    pub max_puts: u32,

    /// File with one coefficient line per joining player
    #[arg(short = 'f', long = "file")]
    pub coefficient_file: PathBuf,
}

/// Validated game parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub port: u16,
    /// K: puts are valid at points `0..=max_point`
    pub max_point: usize,
    /// N: every polynomial has `degree + 1` coefficients
    pub degree: usize,
    /// M: accepted puts that end a round
    pub max_puts: u64,
    pub coefficient_file: PathBuf,
}

impl GameConfig {
    pub fn coefficient_count(&self) -> usize {
        self.degree + 1
    }
}

impl From<Args> for GameConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            max_point: args.max_point as usize,
            degree: args.degree as usize,
            max_puts: u64::from(args.max_puts),
            coefficient_file: args.coefficient_file,
        }
    }
}
