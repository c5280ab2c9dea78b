//! # Approximation Game Server Library
//!
//! Authoritative server for the polynomial approximation game. Each player
//! that says HELLO is dealt a hidden polynomial, adjusts an approximation
//! vector through PUT requests, and is scored once the round's put budget
//! is spent.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Reactor
//! One task owns the listener, every connection, every session and the
//! round. Each loop iteration performs exactly one readiness wait over all
//! sockets, bounded by the nearest session deadline, and then handles
//! everything that became ready before waiting again. Handlers never
//! suspend, so no two sessions' messages interleave.
//!
//! ### Deferred Replies
//! `STATE` and `BAD_PUT` replies are not sent immediately. They are stored
//! as one pending action per session and fired by the reactor when their
//! wall-clock deadline has passed.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Per-connection state machine: HELLO handshake and timeout, PUT rules,
//! penalties, deferred replies and the final score.
//!
//! ### Round Module (`round`)
//! Global accepted-put counter and the `SCORING` broadcast.
//!
//! ### Network Module (`network`)
//! Listener, connection buffers, output backpressure and the main loop.
//!
//! ### Coefficients Module (`coefficients`)
//! Forward-only feed of polynomial coefficients, one line per player.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::config::{Args, GameConfig};
//! use server::network::Server;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let config = GameConfig::from(Args::parse());
//!     let mut server = Server::bind(config).await?;
//!     server.run().await
//! }
//! ```

pub mod coefficients;
pub mod config;
pub mod error;
pub mod network;
pub mod round;
pub mod session;
