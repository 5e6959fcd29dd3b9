//! Command State Machine
//!
//! Defines valid command status transitions and the ack-type lookup table.
//!
//! Status only ever moves forward by rank:
//! ```text
//! QUEUED(0) -> SENT(1) -> ACK(2) -> terminal(3)
//! ```
//! A terminal status is final for node events; only an operator override
//! (handled by the lifecycle manager, not here) may move it.

use crate::{AckType, CommandStatus};

/// Outcome of planning a move from the current status to a target status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target is ahead of the current status and reachable from it
    Advance,
    /// Target equals the current status (redelivered event)
    Unchanged,
    /// Current status is terminal or already past the target
    Superseded { current: CommandStatus },
    /// Target is ahead but not reachable from the current status
    Invalid {
        from: CommandStatus,
        to: CommandStatus,
    },
}

/// Position of a status in the forward-only order
pub fn rank(status: CommandStatus) -> u8 {
    use CommandStatus::*;

    match status {
        Queued => 0,
        Sent => 1,
        Ack => 2,
        Done | NoEffect | Error | Invalid | Busy | Timeout | SendFailed => 3,
    }
}

/// Decide what applying `target` to a command in `current` should do
pub fn plan(current: CommandStatus, target: CommandStatus) -> Transition {
    if current == target {
        return Transition::Unchanged;
    }

    // Never regress, never leave a terminal status
    if current.is_terminal() || rank(target) <= rank(current) {
        return Transition::Superseded { current };
    }

    if is_valid_transition(current, target) {
        Transition::Advance
    } else {
        Transition::Invalid {
            from: current,
            to: target,
        }
    }
}

/// Check if a transition from one status to another is allowed
pub fn is_valid_transition(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;

    match (from, to) {
        // Same status is always valid (idempotent redelivery)
        (a, b) if a == b => true,

        // Bridge publish outcome
        (Queued, Sent | SendFailed) => true,

        // Node accepted; QUEUED allowed because the SENT write can arrive late
        (Queued | Sent, Ack) => true,

        // Node outcomes
        (Queued | Sent | Ack, Done | NoEffect | Error | Invalid | Busy) => true,

        // Sweeper only times out commands that actually went out
        (Sent | Ack, Timeout) => true,

        _ => false,
    }
}

/// Resulting command status for an ack of the given type
///
/// `reports_error` is true when the ack carries an error message.
pub fn ack_status(ack_type: AckType, reports_error: bool) -> CommandStatus {
    match (ack_type, reports_error) {
        (AckType::Accepted, _) => CommandStatus::Ack,
        (AckType::Executed, false) => CommandStatus::Done,
        (AckType::Executed, true) => CommandStatus::Error,
        (AckType::Verified, _) => CommandStatus::Done,
        (AckType::Error, _) => CommandStatus::Error,
    }
}

/// Ack phase logged when a status event moves a command, if any
pub fn status_ack_type(status: CommandStatus) -> Option<AckType> {
    match status {
        CommandStatus::Ack => Some(AckType::Accepted),
        CommandStatus::Done => Some(AckType::Executed),
        CommandStatus::Error => Some(AckType::Error),
        _ => None,
    }
}

/// `result_code` stored on a terminal command
pub fn result_code(status: CommandStatus) -> i64 {
    if status.is_success() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandStatus::*;

    #[test]
    fn test_normal_command_flow() {
        assert_eq!(plan(Queued, Sent), Transition::Advance);
        assert_eq!(plan(Sent, Ack), Transition::Advance);
        assert_eq!(plan(Ack, Done), Transition::Advance);
    }

    #[test]
    fn test_redelivery_is_unchanged() {
        for status in CommandStatus::ALL {
            assert_eq!(plan(*status, *status), Transition::Unchanged);
        }
    }

    #[test]
    fn test_terminal_never_regresses() {
        for terminal in CommandStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for target in CommandStatus::ALL.iter().filter(|t| *t != terminal) {
                assert_eq!(
                    plan(*terminal, *target),
                    Transition::Superseded { current: *terminal },
                    "{terminal} -> {target} must be superseded"
                );
            }
        }
    }

    #[test]
    fn test_late_accept_is_superseded() {
        assert_eq!(
            plan(Ack, Sent),
            Transition::Superseded { current: Ack }
        );
    }

    #[test]
    fn test_error_after_accept_wins() {
        assert_eq!(plan(Ack, Error), Transition::Advance);
    }

    #[test]
    fn test_outcome_before_sent_is_accepted() {
        assert_eq!(plan(Queued, Done), Transition::Advance);
        assert_eq!(plan(Queued, Ack), Transition::Advance);
    }

    #[test]
    fn test_timeout_requires_sent() {
        assert_eq!(
            plan(Queued, Timeout),
            Transition::Invalid {
                from: Queued,
                to: Timeout
            }
        );
        assert_eq!(plan(Sent, Timeout), Transition::Advance);
        assert_eq!(plan(Ack, Timeout), Transition::Advance);
        assert!(!is_valid_transition(Sent, SendFailed));
    }

    #[test]
    fn test_ack_lookup_table() {
        assert_eq!(ack_status(AckType::Accepted, false), Ack);
        assert_eq!(ack_status(AckType::Executed, false), Done);
        assert_eq!(ack_status(AckType::Executed, true), Error);
        assert_eq!(ack_status(AckType::Verified, false), Done);
        assert_eq!(ack_status(AckType::Error, false), Error);
        assert_eq!(ack_status(AckType::Error, true), Error);
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(result_code(Done), 0);
        assert_eq!(result_code(NoEffect), 0);
        assert_eq!(result_code(Timeout), 1);
        assert_eq!(result_code(Error), 1);
    }
}
