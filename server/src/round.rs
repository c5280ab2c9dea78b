//! Round bookkeeping and final scoring
//!
//! A round lasts until the accepted puts of all live sessions reach the
//! configured maximum. [`final_scores`] then builds the `SCORING` line that
//! every live connection receives before the session table is cleared.

use crate::session::Session;
use log::info;
use shared::{ScoreEntry, ServerMessage};

/// Round bookkeeping shared by all connections.
///
/// Counts accepted puts across every live session. A disconnecting player
/// takes its accepted puts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    number: u64,
    accepted_puts: u64,
    max_puts: u64,
}

impl Round {
    pub fn new(max_puts: u64) -> Self {
        Self {
            number: 1,
            accepted_puts: 0,
            max_puts,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn accepted_puts(&self) -> u64 {
        self.accepted_puts
    }

    pub fn max_puts(&self) -> u64 {
        self.max_puts
    }

    pub fn record_accepted(&mut self) {
        self.accepted_puts += 1;
    }

    /// Gives back the puts of a player that left mid-round.
    pub fn release(&mut self, puts: u64) {
        self.accepted_puts = self.accepted_puts.saturating_sub(puts);
    }

    /// Checked before every message is handled, so the counter never
    /// overshoots by more than the put that reached it.
    pub fn is_complete(&self) -> bool {
        self.accepted_puts >= self.max_puts
    }

    /// Starts the next round with a fresh counter.
    pub fn reset(&mut self) {
        info!(
            "Round {} finished after {} accepted puts",
            self.number, self.accepted_puts
        );
        self.number += 1;
        self.accepted_puts = 0;
    }
}

/// Builds the `SCORING` message for every live player, ordered by player id.
///
/// Each session's residuals are folded into its result here, so this runs
/// exactly once per round.
pub fn final_scores<'a, I>(sessions: I) -> ServerMessage
where
    I: IntoIterator<Item = &'a mut Session>,
{
    let mut entries: Vec<ScoreEntry> = sessions
        .into_iter()
        .filter(|session| !session.is_terminated())
        .filter_map(Session::final_score)
        .collect();
    entries.sort_by(|a, b| a.player_id.cmp(&b.player_id));
    ServerMessage::Scoring(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::{CoefficientError, CoefficientFeed, Coefficients};
    use crate::config::GameConfig;
    use shared::ClientMessage;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    struct ZeroFeed;

    impl CoefficientFeed for ZeroFeed {
        fn next_coefficients(&mut self) -> Result<Coefficients, CoefficientError> {
            Ok(Coefficients {
                values: vec![0.0, 0.0],
                line: "COEFF 0 0".to_string(),
            })
        }
    }

    fn config() -> GameConfig {
        GameConfig {
            port: 0,
            max_point: 3,
            degree: 1,
            max_puts: 2,
            coefficient_file: PathBuf::from("unused"),
        }
    }

    fn player(id: &str, puts: &[(i64, f64)]) -> Session {
        let now = Instant::now();
        let mut session = Session::new(now);
        let hello = ClientMessage::Hello {
            player_id: id.to_string(),
        };
        session.handle(hello, now, &config(), &mut ZeroFeed).unwrap();
        for &(point, value) in puts {
            let put = ClientMessage::Put {
                point: point.into(),
                value,
            };
            session.handle(put, now, &config(), &mut ZeroFeed).unwrap();
            session.fire_due(now + Duration::from_secs(60));
        }
        session
    }

    #[test]
    fn test_round_counter() {
        let mut round = Round::new(3);
        assert_eq!(round.number(), 1);
        assert!(!round.is_complete());

        round.record_accepted();
        round.record_accepted();
        assert!(!round.is_complete());
        round.record_accepted();
        assert!(round.is_complete());

        round.reset();
        assert_eq!(round.number(), 2);
        assert_eq!(round.accepted_puts(), 0);
        assert!(!round.is_complete());
    }

    #[test]
    fn test_release_returns_puts_of_departed_player() {
        let mut round = Round::new(5);
        for _ in 0..4 {
            round.record_accepted();
        }
        round.release(3);
        assert_eq!(round.accepted_puts(), 1);
        round.release(10);
        assert_eq!(round.accepted_puts(), 0);
    }

    #[test]
    fn test_scores_are_sorted_by_player_id() {
        let mut sessions = vec![
            player("zed", &[(1, 2.0)]),
            player("ALPHA", &[]),
            player("bob", &[(0, 1.0), (3, -1.0)]),
        ];

        let scoring = final_scores(sessions.iter_mut());
        let ServerMessage::Scoring(entries) = scoring else {
            panic!("expected SCORING");
        };
        let ids: Vec<&str> = entries.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(ids, vec!["ALPHA", "bob", "zed"]);
        assert_eq!(entries[0].score, 0.0);
        assert_eq!(entries[1].score, 2.0);
        assert_eq!(entries[2].score, 4.0);
    }

    #[test]
    fn test_scores_skip_terminated_and_anonymous_sessions() {
        let mut gone = player("gone", &[(1, 1.0)]);
        gone.terminate();
        let mut sessions = vec![gone, Session::new(Instant::now()), player("P1", &[])];

        let scoring = final_scores(sessions.iter_mut());
        assert_eq!(scoring.to_string(), "SCORING P1 0.0000000");
    }
}
