//! Per-command state machine
//!
//! Every command moves through
//! `Idle -> Optimistic -> Reconciling -> (Confirmed | RolledBack) -> Idle`.
//! The table below is the only place transitions are decided; the sync
//! engine drives it and refuses to touch the store on an invalid step.

use thiserror::Error;

/// Phase of a command for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandPhase {
    /// No pending command
    Idle,
    /// Store mutated speculatively, request not yet sent
    Optimistic,
    /// Gateway call outstanding
    Reconciling,
    /// Device acknowledged; authoritative refresh follows
    Confirmed,
    /// Device failed; speculative mutation reverted
    RolledBack,
}

impl std::fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Optimistic => write!(f, "Optimistic"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::RolledBack => write!(f, "RolledBack"),
        }
    }
}

/// Input that advances a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandEvent {
    /// Operator issued the command
    Issue,
    /// Request handed to the gateway
    Send,
    /// Gateway reported success
    Succeed,
    /// Gateway reported failure
    Fail,
    /// Outcome applied, slot released
    Settle,
}

/// Rejected transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid command transition: {event:?} in phase {phase}")]
pub struct InvalidTransition {
    /// Phase the command was in.
    pub phase: CommandPhase,
    /// Event that was not allowed.
    pub event: CommandEvent,
}

impl CommandPhase {
    /// Apply an event, returning the next phase
    pub fn transition(self, event: CommandEvent) -> Result<CommandPhase, InvalidTransition> {
        use CommandEvent::*;
        use CommandPhase::*;

        match (self, event) {
            (Idle, Issue) => Ok(Optimistic),
            (Optimistic, Send) => Ok(Reconciling),
            (Reconciling, Succeed) => Ok(Confirmed),
            (Reconciling, Fail) => Ok(RolledBack),
            (Confirmed, Settle) | (RolledBack, Settle) => Ok(Idle),
            (phase, event) => Err(InvalidTransition { phase, event }),
        }
    }

    /// Whether a command in this phase blocks new commands for its slot
    pub fn is_pending(self) -> bool {
        matches!(self, CommandPhase::Optimistic | CommandPhase::Reconciling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandEvent::*;
    use CommandPhase::*;

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Idle, Issue, Optimistic),
            (Optimistic, Send, Reconciling),
            (Reconciling, Succeed, Confirmed),
            (Reconciling, Fail, RolledBack),
            (Confirmed, Settle, Idle),
            (RolledBack, Settle, Idle),
        ];

        let phases = [Idle, Optimistic, Reconciling, Confirmed, RolledBack];
        let events = [Issue, Send, Succeed, Fail, Settle];

        for phase in phases {
            for event in events {
                let expected = allowed
                    .iter()
                    .find(|(p, e, _)| *p == phase && *e == event)
                    .map(|(_, _, next)| *next);
                match expected {
                    Some(next) => assert_eq!(phase.transition(event), Ok(next)),
                    None => assert_eq!(
                        phase.transition(event),
                        Err(InvalidTransition { phase, event })
                    ),
                }
            }
        }
    }

    #[test]
    fn test_no_double_issue() {
        let phase = Idle.transition(Issue).unwrap();
        assert!(phase.is_pending());
        assert!(phase.transition(Issue).is_err());
    }

    #[test]
    fn test_full_lifecycles() {
        let confirmed = [Issue, Send, Succeed, Settle]
            .into_iter()
            .try_fold(Idle, CommandPhase::transition);
        assert_eq!(confirmed, Ok(Idle));

        let rolled_back = [Issue, Send, Fail]
            .into_iter()
            .try_fold(Idle, CommandPhase::transition);
        assert_eq!(rolled_back, Ok(RolledBack));
    }
}
