use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::AgentError;

/// Where the navigator is in the per-recipient sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationState {
    Baseline,
    ComposerOpen,
    RecipientEntered,
    RecipientConfirmed,
    TextEntered,
    Dispatched,
    Cleaning,
    BaselineRestored,
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Control absent from the screen.
    ElementNotFound,
    /// Control present but the action did not take.
    ActionTimedOut,
    /// Screen matches none of the expected ones.
    UnexpectedState,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind} in {state}: {detail}")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub state: NavigationState,
    pub detail: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, state: NavigationState, detail: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            detail: detail.into(),
        }
    }
}

/// A single edge of the per-recipient state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    OpenComposer,
    EnterRecipient,
    ConfirmRecipient,
    EnterText,
    Dispatch,
    Cleanup,
}

impl Transition {
    /// Transitions that carry a recipient from Baseline to Dispatched.
    pub const DELIVERY: [Transition; 5] = [
        Transition::OpenComposer,
        Transition::EnterRecipient,
        Transition::ConfirmRecipient,
        Transition::EnterText,
        Transition::Dispatch,
    ];

    pub fn target(self) -> NavigationState {
        match self {
            Transition::OpenComposer => NavigationState::ComposerOpen,
            Transition::EnterRecipient => NavigationState::RecipientEntered,
            Transition::ConfirmRecipient => NavigationState::RecipientConfirmed,
            Transition::EnterText => NavigationState::TextEntered,
            Transition::Dispatch => NavigationState::Dispatched,
            Transition::Cleanup => NavigationState::BaselineRestored,
        }
    }

    /// Whether the sequence may restart from Baseline after this transition
    /// fails. Nothing past the dispatch point is ever replayed.
    pub fn restartable(self) -> bool {
        !matches!(self, Transition::Dispatch | Transition::Cleanup)
    }
}

/// Why a transition stopped short.
#[derive(Debug)]
pub enum StepError {
    Failed(StepFailure),
    /// Re-sync landed on Baseline; replay the sequence from the start.
    Restart,
    Fatal(AgentError),
}

impl From<StepFailure> for StepError {
    fn from(failure: StepFailure) -> Self {
        StepError::Failed(failure)
    }
}
