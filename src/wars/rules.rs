//! War state machine and settlement rules
//!
//! Every handler that moves a war between states validates the edge here.
//! Allowed edges:
//!
//! ```text
//! pending  -> accepted | declined | expired
//! accepted -> completed
//! ```

use bson::DateTime;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// War lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarStatus {
    /// Declared, waiting for the defender to accept
    #[default]
    Pending,
    /// Both wagers escrowed, war is live
    Accepted,
    /// Defender turned it down; challenger refunded
    Declined,
    /// Acceptance window lapsed; challenger refunded
    Expired,
    /// Settled after the challenge ended; escrow released
    Completed,
}

impl fmt::Display for WarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarStatus::Pending => "pending",
            WarStatus::Accepted => "accepted",
            WarStatus::Declined => "declined",
            WarStatus::Expired => "expired",
            WarStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl WarStatus {
    /// Whether the transition `self -> to` is a legal edge
    pub fn can_transition(self, to: WarStatus) -> bool {
        matches!(
            (self, to),
            (WarStatus::Pending, WarStatus::Accepted)
                | (WarStatus::Pending, WarStatus::Declined)
                | (WarStatus::Pending, WarStatus::Expired)
                | (WarStatus::Accepted, WarStatus::Completed)
        )
    }

    /// Whether the war has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WarStatus::Declined | WarStatus::Expired | WarStatus::Completed
        )
    }
}

/// Acceptance deadline for a war declared at `declared_at`
pub fn acceptance_deadline(declared_at: DateTime, window_hours: i64) -> DateTime {
    let deadline = declared_at.to_chrono() + Duration::hours(window_hours);
    DateTime::from_chrono(deadline)
}

/// Which side won a settled war
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Challenger takes both wagers
    ChallengerWins,
    /// Defender takes both wagers
    DefenderWins,
    /// Equal points; each side gets its own wager back
    Tie,
}

impl Settlement {
    /// Decide the outcome from final challenge points
    pub fn decide(challenger_points: i64, defender_points: i64) -> Self {
        match challenger_points.cmp(&defender_points) {
            std::cmp::Ordering::Greater => Settlement::ChallengerWins,
            std::cmp::Ordering::Less => Settlement::DefenderWins,
            std::cmp::Ordering::Equal => Settlement::Tie,
        }
    }

    /// Coins paid to (challenger, defender) when the wager per side is
    /// `wager`. Escrow already holds 2x wager in total.
    pub fn payouts(self, wager: i64) -> (i64, i64) {
        match self {
            Settlement::ChallengerWins => (2 * wager, 0),
            Settlement::DefenderWins => (0, 2 * wager),
            Settlement::Tie => (wager, wager),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(WarStatus::Pending.can_transition(WarStatus::Accepted));
        assert!(WarStatus::Pending.can_transition(WarStatus::Declined));
        assert!(WarStatus::Pending.can_transition(WarStatus::Expired));
        assert!(WarStatus::Accepted.can_transition(WarStatus::Completed));
    }

    #[test]
    fn test_illegal_transitions() {
        // Accepting anything but a pending war must fail
        assert!(!WarStatus::Accepted.can_transition(WarStatus::Accepted));
        assert!(!WarStatus::Declined.can_transition(WarStatus::Accepted));
        assert!(!WarStatus::Expired.can_transition(WarStatus::Accepted));
        assert!(!WarStatus::Completed.can_transition(WarStatus::Accepted));

        // Pending wars cannot settle directly
        assert!(!WarStatus::Pending.can_transition(WarStatus::Completed));

        // Terminal states are final
        assert!(!WarStatus::Completed.can_transition(WarStatus::Pending));
        assert!(!WarStatus::Declined.can_transition(WarStatus::Expired));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!WarStatus::Pending.is_terminal());
        assert!(!WarStatus::Accepted.is_terminal());
        assert!(WarStatus::Declined.is_terminal());
        assert!(WarStatus::Expired.is_terminal());
        assert!(WarStatus::Completed.is_terminal());
    }

    #[test]
    fn test_acceptance_deadline() {
        let declared = DateTime::from_millis(1_700_000_000_000);
        let deadline = acceptance_deadline(declared, 24);
        assert_eq!(
            deadline.timestamp_millis() - declared.timestamp_millis(),
            24 * 3600 * 1000
        );
    }

    #[test]
    fn test_settlement_decision() {
        assert_eq!(Settlement::decide(120, 80), Settlement::ChallengerWins);
        assert_eq!(Settlement::decide(40, 90), Settlement::DefenderWins);
        assert_eq!(Settlement::decide(50, 50), Settlement::Tie);
    }

    #[test]
    fn test_settlement_payouts_conserve_escrow() {
        for outcome in [
            Settlement::ChallengerWins,
            Settlement::DefenderWins,
            Settlement::Tie,
        ] {
            let (c, d) = outcome.payouts(25);
            assert_eq!(c + d, 50, "escrow must be released exactly once");
        }
    }

    #[test]
    fn test_status_serde_strings() {
        let json = serde_json::to_string(&WarStatus::Accepted).unwrap();
        assert_eq!(json, "\"accepted\"");
        let back: WarStatus = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(back, WarStatus::Expired);
    }
}
