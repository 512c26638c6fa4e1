//! Recovery policy for navigation steps.
//!
//! Every failed transition goes through [`RecoveryPolicy::decide`]:
//! - retry after a backoff pause
//! - fall back to a hardware Back press, then re-sync
//! - escalate to recipient failure once the ceiling is hit

use std::collections::HashMap;
use std::time::Duration;

use super::state::{FailureKind, StepFailure, Transition};
use crate::device::DeviceError;

// =====================================================
// POLICY CONFIGURATION
// =====================================================

#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub base_pause_ms: u64,
    pub max_pause_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_pause_ms: 2000,
            max_pause_ms: 8000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    Retry { pause: Duration },
    /// Escape an unrecognized screen with hardware Back, then re-sync.
    Fallback,
    Escalate,
}

impl RecoveryPolicy {
    /// Attempts allowed for a failure kind before escalating.
    pub fn ceiling(&self, _kind: FailureKind) -> u32 {
        self.max_attempts.max(1)
    }

    /// `attempts` counts failures of this kind so far, including this one.
    pub fn decide(&self, failure: &StepFailure, attempts: u32) -> RecoveryDecision {
        if attempts >= self.ceiling(failure.kind) {
            return RecoveryDecision::Escalate;
        }
        match failure.kind {
            FailureKind::ElementNotFound | FailureKind::ActionTimedOut => RecoveryDecision::Retry {
                pause: self.pause_for(attempts),
            },
            FailureKind::UnexpectedState => RecoveryDecision::Fallback,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn pause_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.base_pause_ms as f64 * self.backoff_multiplier.powi(exponent);
        let clamped = delay.min(self.max_pause_ms as f64) as u64;
        Duration::from_millis(clamped)
    }
}

// =====================================================
// ERROR CLASSIFICATION
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Device unreachable: abort the run.
    Fatal,
    Step(FailureKind),
}

/// Map a transport error onto the failure taxonomy.
pub fn classify(error: &DeviceError) -> Classification {
    match error {
        DeviceError::Disconnected(_) | DeviceError::Spawn(_) => Classification::Fatal,
        DeviceError::TimedOut { .. } => Classification::Step(FailureKind::ActionTimedOut),
        DeviceError::CommandFailed { detail, .. } => {
            let detail = detail.to_lowercase();
            if detail.contains("null root node") || detail.contains("could not get idle state") {
                // uiautomator caught the screen mid-transition.
                Classification::Step(FailureKind::UnexpectedState)
            } else {
                Classification::Step(FailureKind::ActionTimedOut)
            }
        }
    }
}

// =====================================================
// ATTEMPT LEDGER
// =====================================================

/// Failure counts per (transition, kind) for one recipient. Never reset
/// while the recipient is in flight, so restarts stay bounded.
#[derive(Debug, Default)]
pub struct AttemptLedger {
    counts: HashMap<(Transition, FailureKind), u32>,
    total: u32,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure and return the count for its (transition, kind).
    pub fn record(&mut self, transition: Transition, kind: FailureKind) -> u32 {
        self.total += 1;
        let count = self.counts.entry((transition, kind)).or_insert(0);
        *count += 1;
        *count
    }

    pub fn total(&self) -> u32 {
        self.total
    }
}

// =====================================================
// TESTS
// =====================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::NavigationState;

    fn failure(kind: FailureKind) -> StepFailure {
        StepFailure::new(kind, NavigationState::Baseline, "test")
    }

    #[test]
    fn test_decide_by_kind() {
        let policy = RecoveryPolicy::default();
        assert!(matches!(
            policy.decide(&failure(FailureKind::ElementNotFound), 1),
            RecoveryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(&failure(FailureKind::ActionTimedOut), 2),
            RecoveryDecision::Retry { .. }
        ));
        assert_eq!(
            policy.decide(&failure(FailureKind::UnexpectedState), 1),
            RecoveryDecision::Fallback
        );
    }

    #[test]
    fn test_escalates_exactly_at_ceiling() {
        let policy = RecoveryPolicy::default();
        for kind in [FailureKind::ElementNotFound, FailureKind::ActionTimedOut, FailureKind::UnexpectedState] {
            assert_ne!(policy.decide(&failure(kind), 2), RecoveryDecision::Escalate);
            assert_eq!(policy.decide(&failure(kind), 3), RecoveryDecision::Escalate);
        }
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RecoveryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.ceiling(FailureKind::ElementNotFound), 1);
        assert_eq!(policy.decide(&failure(FailureKind::ElementNotFound), 1), RecoveryDecision::Escalate);
    }

    #[test]
    fn test_pause_backoff() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.pause_for(1), Duration::from_millis(2000));
        assert_eq!(policy.pause_for(2), Duration::from_millis(4000));
        assert_eq!(policy.pause_for(3), Duration::from_millis(8000));
        assert_eq!(policy.pause_for(6), Duration::from_millis(8000));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&DeviceError::Disconnected("offline".into())), Classification::Fatal);
        assert_eq!(
            classify(&DeviceError::TimedOut { command: "input tap".into(), timeout_ms: 10 }),
            Classification::Step(FailureKind::ActionTimedOut)
        );
        assert_eq!(
            classify(&DeviceError::CommandFailed {
                command: "uiautomator dump".into(),
                detail: "ERROR: null root node returned by UiTestAutomationBridge.".into()
            }),
            Classification::Step(FailureKind::UnexpectedState)
        );
    }

    #[test]
    fn test_ledger_counts_per_transition_and_kind() {
        let mut ledger = AttemptLedger::new();
        assert_eq!(ledger.record(Transition::OpenComposer, FailureKind::ElementNotFound), 1);
        assert_eq!(ledger.record(Transition::OpenComposer, FailureKind::ElementNotFound), 2);
        assert_eq!(ledger.record(Transition::EnterText, FailureKind::ElementNotFound), 1);
        assert_eq!(ledger.record(Transition::OpenComposer, FailureKind::UnexpectedState), 1);
        assert_eq!(ledger.total(), 4);
    }
}
