//! # Approximation Game Client Library
//!
//! Client side of the polynomial approximation game. The client introduces
//! itself with HELLO, learns its hidden polynomial from `COEFF`, sends PUT
//! requests and follows the server's approximation vector through `STATE`
//! replies until the round ends with `SCORING`.
//!
//! ## Play Modes
//!
//! ### Interactive
//! Put requests are read from an operator input (stdin in the binary), one
//! `<point> <value>` pair per line, multiplexed with the server socket.
//! Requests entered before `COEFF` are held and flushed in order once it
//! arrives.
//!
//! ### Autonomous
//! Every `COEFF`, `STATE` and `BAD_PUT` is answered with a put at the point
//! of largest residual, clamped to the accepted value range.
//!
//! ## Module Organization
//!
//! - `config`: command line arguments and address family selection
//! - `game`: mirror of the session and the put strategy
//! - `input`: operator line parsing
//! - `network`: connection setup and the play loop
//! - `error`: the [`ClientError`](error::ClientError) type
//!
//! Any message the protocol codec rejects, and any disconnect before
//! `SCORING`, ends the session with an error.

pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
