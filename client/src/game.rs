//! Client-side mirror of the session and the put strategy
//!
//! The client knows its own polynomial once `COEFF` arrives and learns the
//! server's approximation vector from every `STATE`. In interactive mode the
//! operator decides what to put; puts entered before `COEFF` are held back
//! and flushed in order as soon as the coefficients are known. In autonomous
//! mode every `COEFF`, `STATE` and `BAD_PUT` is answered with the correction
//! at the point where the approximation is furthest off.

use crate::config::PlayMode;
use log::debug;
use shared::{
    evaluate_polynomial, round7, ClientMessage, Expectations, Point, ProtocolError,
    ServerMessage, MAX_PUT_VALUE, MIN_PUT_VALUE,
};
use std::collections::VecDeque;

#[derive(Debug)]
pub struct ClientGame {
    mode: PlayMode,
    coefficients: Option<Vec<f64>>,
    state: Vec<f64>,
    queued_puts: VecDeque<(Point, f64)>,
    expect: Expectations,
}

impl ClientGame {
    pub fn new(mode: PlayMode) -> Self {
        Self {
            mode,
            coefficients: None,
            state: Vec::new(),
            queued_puts: VecDeque::new(),
            expect: Expectations::default(),
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn queued_puts(&self) -> usize {
        self.queued_puts.len()
    }

    /// Parses a server line against the vector lengths seen so far.
    pub fn parse(&self, line: &str) -> Result<ServerMessage, ProtocolError> {
        ServerMessage::parse(line, &self.expect)
    }

    /// Returns the put to send now, or holds it until `COEFF` arrives.
    pub fn submit_put(&mut self, point: Point, value: f64) -> Option<ClientMessage> {
        if self.coefficients.is_none() {
            debug!("Holding PUT {} {} until COEFF", point, value);
            self.queued_puts.push_back((point, value));
            return None;
        }
        Some(ClientMessage::Put { point, value })
    }

    /// Updates the mirror with a server message and returns the puts to send in reply.
    pub fn apply(&mut self, message: &ServerMessage) -> Vec<ClientMessage> {
        let mut outgoing = Vec::new();
        match message {
            ServerMessage::Coeff(values) => {
                self.expect.coefficients = Some(values.len());
                self.coefficients = Some(values.clone());
                outgoing.extend(
                    self.queued_puts
                        .drain(..)
                        .map(|(point, value)| ClientMessage::Put { point, value }),
                );
                self.play_autonomously(&mut outgoing);
            }
            ServerMessage::State(values) => {
                self.expect.state_len = Some(values.len());
                self.state = values.clone();
                self.play_autonomously(&mut outgoing);
            }
            ServerMessage::BadPut { .. } => self.play_autonomously(&mut outgoing),
            ServerMessage::Penalty { .. } | ServerMessage::Scoring(_) => {}
        }
        outgoing
    }

    fn play_autonomously(&self, outgoing: &mut Vec<ClientMessage>) {
        if self.mode != PlayMode::Autonomous {
            return;
        }
        if let Some((point, value)) = self.next_correction() {
            outgoing.push(ClientMessage::Put {
                point: Point::Index(point as i64),
                value,
            });
        }
    }

    /// Index with the largest absolute residual `p(i) - state[i]`, lowest index on ties.
    ///
    /// Before the first `STATE` only index 0 is known to exist.
    pub fn largest_residual(&self) -> Option<(usize, f64)> {
        let coefficients = self.coefficients.as_deref()?;
        let candidates = self.state.len().max(1);
        (0..candidates)
            .map(|i| {
                let current = self.state.get(i).copied().unwrap_or(0.0);
                (i, evaluate_polynomial(coefficients, i) - current)
            })
            .fold(None, |best: Option<(usize, f64)>, (i, residual)| match best {
                Some((_, top)) if top.abs() >= residual.abs() => best,
                _ => Some((i, residual)),
            })
    }

    /// The put that closes as much of the largest residual as one put may.
    pub fn next_correction(&self) -> Option<(usize, f64)> {
        self.largest_residual()
            .map(|(i, residual)| (i, round7(residual.clamp(MIN_PUT_VALUE, MAX_PUT_VALUE))))
    }
}
