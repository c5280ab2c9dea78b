//! Writes random coefficient lines for the server's `-f` file.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::COEFF;
use shared::{format_decimal, round7, MAX_COEFF_MAGNITUDE};
use std::io::{self, BufWriter, Write};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate coefficient lines for approx-server")]
struct Args {
    /// Polynomial degree N (each line has N + 1 coefficients)
    #[arg(short = 'n', long, default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..=8))]
    degree: u32,

    /// Number of lines, one per joining player
    #[arg(short = 'c', long, default_value_t = 100)]
    count: usize,

    /// Largest absolute coefficient value
    #[arg(long, default_value_t = 10.0)]
    magnitude: f64,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let magnitude = args.magnitude.abs().min(MAX_COEFF_MAGNITUDE);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut out = BufWriter::new(io::stdout().lock());
    for _ in 0..args.count {
        write!(out, "{}", COEFF)?;
        for _ in 0..=args.degree {
            let value = if magnitude > 0.0 {
                round7(rng.gen_range(-magnitude..=magnitude))
            } else {
                0.0
            };
            write!(out, " {}", format_decimal(value))?;
        }
        writeln!(out)?;
    }
    out.flush()
}
