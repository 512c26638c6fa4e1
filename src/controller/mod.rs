pub mod navigator;
pub mod recovery;
pub mod state;

pub use navigator::Navigator;
pub use recovery::{AttemptLedger, RecoveryDecision, RecoveryPolicy};
pub use state::{FailureKind, NavigationState, StepFailure, Transition};
