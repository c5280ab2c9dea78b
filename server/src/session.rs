//! Per-connection protocol and game state for the server
//!
//! A session moves through three phases:
//!
//! ```text
//! AwaitingHello --HELLO--> Active --EOF / error / round end--> Terminated
//!       |                                                        ^
//!       +------------------- 3 s without HELLO -------------------+
//! ```
//!
//! The session never touches a socket. It consumes parsed [`ClientMessage`]s
//! together with the current time and reports what the reactor has to send
//! now, while replies that are due later are kept as a single
//! [`PendingAction`] that the reactor fires once its time has come.

use crate::coefficients::CoefficientFeed;
use crate::config::GameConfig;
use crate::error::SessionError;
use shared::{
    evaluate_polynomial, round7, ClientMessage, Point, ScoreEntry, ServerMessage, MAX_PUT_VALUE,
    MIN_PUT_VALUE,
};
use std::time::{Duration, Instant};

/// Time a new connection has to introduce itself
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(3);
/// Delay before an out-of-range put is answered with `BAD_PUT`
pub const BAD_PUT_DELAY: Duration = Duration::from_secs(1);
/// Added for a put sent while the previous one is unanswered
pub const PENALTY_POINTS: f64 = 20.0;
/// Added when a `BAD_PUT` reply is sent
pub const BAD_PUT_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHello { deadline: Instant },
    Active,
    Terminated,
}

/// A reply scheduled for later
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    SendState { at: Instant },
    SendBadPut { point: Point, value: f64, at: Instant },
}

impl PendingAction {
    pub fn due(&self) -> Instant {
        match self {
            PendingAction::SendState { at } => *at,
            PendingAction::SendBadPut { at, .. } => *at,
        }
    }
}

/// What the reactor has to do after a message was applied
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// HELLO accepted: send this `COEFF` line now
    Greeted(String),
    /// Send this reply now
    Reply(ServerMessage),
    /// Out-of-range put, `BAD_PUT` is scheduled
    Deferred,
    /// Put applied and `STATE` scheduled; counts towards the round
    Accepted,
}

#[derive(Debug)]
pub struct Session {
    phase: Phase,
    player_id: Option<String>,
    coefficients: Option<Vec<f64>>,
    /// Sized to `K + 1` zeros on the first accepted put
    state: Vec<f64>,
    result: f64,
    accepted_puts: u64,
    /// Set by a put that gets a deferred reply, cleared when that reply is sent
    awaiting_reply: bool,
    pending: Option<PendingAction>,
}

impl Session {
    pub fn new(connected_at: Instant) -> Self {
        Self {
            phase: Phase::AwaitingHello {
                deadline: connected_at + HELLO_TIMEOUT,
            },
            player_id: None,
            coefficients: None,
            state: Vec::new(),
            result: 0.0,
            accepted_puts: 0,
            awaiting_reply: false,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn result(&self) -> f64 {
        self.result
    }

    pub fn accepted_puts(&self) -> u64 {
        self.accepted_puts
    }

    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending.clone()
    }

    /// Earliest instant at which this session needs attention without input
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::AwaitingHello { deadline } => Some(deadline),
            Phase::Active => self.pending.as_ref().map(PendingAction::due),
            Phase::Terminated => None,
        }
    }

    pub fn hello_expired(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::AwaitingHello { deadline } if now >= deadline)
    }

    /// Delay of the `STATE` reply: one second per lowercase letter of the player id.
    pub fn state_delay(&self) -> Duration {
        let letters = self
            .player_id
            .as_deref()
            .unwrap_or_default()
            .bytes()
            .filter(u8::is_ascii_lowercase)
            .count();
        Duration::from_secs(letters as u64)
    }

    /// Applies one message.
    ///
    /// Errors other than [`SessionError::Coefficients`] concern this
    /// connection only and leave the session unchanged.
    pub fn handle(
        &mut self,
        message: ClientMessage,
        now: Instant,
        config: &GameConfig,
        feed: &mut dyn CoefficientFeed,
    ) -> Result<Response, SessionError> {
        match (self.phase, message) {
            (Phase::Terminated, _) => Err(SessionError::Terminated),
            (Phase::AwaitingHello { .. }, ClientMessage::Hello { player_id }) => {
                self.greet(player_id, feed)
            }
            (Phase::AwaitingHello { .. }, ClientMessage::Put { .. }) => {
                Err(SessionError::PutBeforeHello)
            }
            (Phase::Active, ClientMessage::Hello { .. }) => Err(SessionError::DuplicateHello),
            (Phase::Active, ClientMessage::Put { point, value }) => {
                Ok(self.put(point, value, now, config.max_point))
            }
        }
    }

    fn greet(
        &mut self,
        player_id: String,
        feed: &mut dyn CoefficientFeed,
    ) -> Result<Response, SessionError> {
        let coefficients = feed.next_coefficients()?;
        self.player_id = Some(player_id);
        self.coefficients = Some(coefficients.values);
        self.phase = Phase::Active;
        Ok(Response::Greeted(coefficients.line))
    }

    fn put(&mut self, point: Point, value: f64, now: Instant, max_point: usize) -> Response {
        if self.awaiting_reply || self.coefficients.is_none() {
            self.result += PENALTY_POINTS;
            return Response::Reply(ServerMessage::Penalty { point, value });
        }

        let index = match point.index_within(max_point) {
            Some(index) if (MIN_PUT_VALUE..=MAX_PUT_VALUE).contains(&value) => index,
            _ => {
                self.schedule(PendingAction::SendBadPut {
                    point,
                    value,
                    at: now + BAD_PUT_DELAY,
                });
                return Response::Deferred;
            }
        };

        if self.state.is_empty() {
            self.state = vec![0.0; max_point + 1];
        }
        self.state[index] += value;
        self.accepted_puts += 1;

        let at = now + self.state_delay();
        self.schedule(PendingAction::SendState { at });
        Response::Accepted
    }

    /// Every path that schedules runs behind the `awaiting_reply` gate, so an
    /// outstanding action is never replaced.
    fn schedule(&mut self, action: PendingAction) {
        debug_assert!(self.pending.is_none(), "pending reply superseded");
        self.awaiting_reply = true;
        self.pending = Some(action);
    }

    /// Takes the pending reply if it is due at `now`.
    pub fn fire_due(&mut self, now: Instant) -> Option<ServerMessage> {
        if !self.pending.as_ref().is_some_and(|action| action.due() <= now) {
            return None;
        }
        let action = self.pending.take()?;
        self.awaiting_reply = false;

        let message = match action {
            PendingAction::SendState { .. } => ServerMessage::State(self.state.clone()),
            PendingAction::SendBadPut { point, value, .. } => {
                self.result += BAD_PUT_POINTS;
                ServerMessage::BadPut { point, value }
            }
        };
        Some(message)
    }

    /// Adds the residual sum of squares to the result and returns the
    /// rounded score. Sessions that never said HELLO have no score.
    ///
    /// Meant to be called once, when the round ends.
    pub fn final_score(&mut self) -> Option<ScoreEntry> {
        let player_id = self.player_id.clone()?;
        if let Some(coefficients) = &self.coefficients {
            self.result += residual_sum_of_squares(&self.state, coefficients);
        }
        Some(ScoreEntry {
            player_id,
            score: round7(self.result),
        })
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
        self.pending = None;
    }
}

/// `Σ (state[i] - p(i))²` over the indices present in `state`
pub fn residual_sum_of_squares(state: &[f64], coefficients: &[f64]) -> f64 {
    state
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let residual = value - evaluate_polynomial(coefficients, index);
            residual * residual
        })
        .sum()
}
