//! Per-recipient navigation through Google Messages.
//!
//! Each recipient walks Baseline → ComposerOpen → RecipientEntered →
//! RecipientConfirmed → TextEntered → Dispatched, then the engine backs out
//! to the conversation list, optionally deletes the conversation, and checks
//! that Baseline is really on screen before the next recipient starts.
//! Every transition runs under the [`RecoveryPolicy`].

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::recovery::{classify, AttemptLedger, Classification, RecoveryDecision, RecoveryPolicy};
use super::state::{FailureKind, NavigationState, StepError, StepFailure, Transition};
use crate::config_manager::{DispatchMode, RunConfig, Timing};
use crate::device::{DeviceError, DeviceSession};
use crate::error::AgentError;
use crate::locator::{ElementLocator, Selector, TreeLocator, UiElement};
use crate::recipients::{MessageBody, Recipient, RecipientStatus};
use crate::schema::{DeviceAction, Key};
use crate::selectors;
use crate::ui_tree::UiTree;

/// Leading characters of the body used to verify typing and sending.
const VERIFY_PREFIX_CHARS: usize = 12;

/// Navigate-back actions that take a dispatched conversation to the list.
const UNWIND_BACKS: usize = 2;

struct Delivery<'a> {
    destination: &'a str,
    body: &'a MessageBody,
}

pub struct Navigator<D, L = TreeLocator> {
    device: D,
    locator: L,
    policy: RecoveryPolicy,
    timing: Timing,
    mode: DispatchMode,
    delete_after_send: bool,
    package: String,
    activity: String,
    state: NavigationState,
}

impl<D: DeviceSession> Navigator<D> {
    pub fn new(device: D, config: &RunConfig) -> Self {
        Self::with_locator(device, TreeLocator, config)
    }
}

impl<D: DeviceSession, L: ElementLocator> Navigator<D, L> {
    pub fn with_locator(device: D, locator: L, config: &RunConfig) -> Self {
        Self {
            device,
            locator,
            policy: config.recovery_policy(),
            timing: config.timing.clone(),
            mode: config.mode,
            delete_after_send: config.delete_after_send,
            package: config.package.clone(),
            activity: config.activity.clone(),
            state: NavigationState::Baseline,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Launch the conversation list and check for Baseline.
    ///
    /// Returns `Ok(false)` when the list did not show up; recipients will
    /// then fail through the normal recovery path. Only a lost device is an
    /// error.
    pub async fn prepare(&mut self) -> Result<bool, AgentError> {
        info!(
            serial = self.device.serial(),
            package = %self.package,
            ui_contract = selectors::UI_CONTRACT_VERSION,
            "📱 Launching messaging app"
        );
        if let Err(e) = self.launch().await {
            absorb(e)?;
        }
        let ready = self.at_baseline().await?;
        if ready {
            self.state = NavigationState::Baseline;
        } else {
            warn!("conversation list not detected after launch");
        }
        Ok(ready)
    }

    /// Run one recipient end to end and set its terminal status.
    ///
    /// Step failures end in `Failed` and still restore Baseline. Only a lost
    /// device is returned as an error, after the status has been set.
    pub async fn process(&mut self, recipient: &mut Recipient, body: &MessageBody) -> Result<(), AgentError> {
        let mut ledger = AttemptLedger::new();
        self.state = NavigationState::Baseline;
        let job = Delivery {
            destination: &recipient.destination,
            body,
        };

        let delivered = self.deliver(&job, &mut ledger).await;
        let status = match delivered {
            Ok(()) => match self.mode {
                DispatchMode::Send => RecipientStatus::Sent,
                DispatchMode::Draft => RecipientStatus::Drafted,
            },
            Err(StepError::Failed(failure)) => {
                error!(recipient = %job.destination, %failure, "❌ Giving up on recipient");
                RecipientStatus::from(failure)
            }
            Err(StepError::Restart) => RecipientStatus::from(StepFailure::new(
                FailureKind::UnexpectedState,
                self.state,
                "restart requested outside the delivery sequence",
            )),
            Err(StepError::Fatal(e)) => {
                recipient.attempts = ledger.total();
                recipient.status = RecipientStatus::from(StepFailure::new(
                    FailureKind::ActionTimedOut,
                    self.state,
                    e.to_string(),
                ));
                return Err(e);
            }
        };
        let dispatched = matches!(status, RecipientStatus::Sent | RecipientStatus::Drafted);
        recipient.attempts = ledger.total();
        recipient.status = status;

        self.unwind().await?;

        if dispatched && self.delete_after_send {
            self.state = NavigationState::Cleaning;
            let job = Delivery {
                destination: &recipient.destination,
                body,
            };
            match self.advance(Transition::Cleanup, &job, &mut ledger).await {
                Ok(()) => info!(recipient = %recipient.destination, "🗑️ Conversation deleted"),
                Err(StepError::Fatal(e)) => return Err(e),
                Err(StepError::Failed(failure)) => {
                    warn!(recipient = %recipient.destination, %failure, "conversation not deleted")
                }
                Err(StepError::Restart) => {}
            }
        }

        if self.restore_baseline().await? {
            self.state = NavigationState::BaselineRestored;
        } else {
            warn!("could not confirm the conversation list; next recipient starts from an unknown screen");
        }
        Ok(())
    }

    // =====================================================
    // SEQUENCE + RECOVERY
    // =====================================================

    async fn deliver(&mut self, job: &Delivery<'_>, ledger: &mut AttemptLedger) -> Result<(), StepError> {
        'restart: loop {
            self.state = NavigationState::Baseline;
            for transition in Transition::DELIVERY {
                match self.advance(transition, job, ledger).await {
                    Ok(()) => {}
                    Err(StepError::Restart) => {
                        info!(recipient = %job.destination, "🔄 Back at conversation list, restarting sequence");
                        continue 'restart;
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(());
        }
    }

    /// Run one transition until it succeeds or the policy escalates.
    async fn advance(
        &mut self,
        transition: Transition,
        job: &Delivery<'_>,
        ledger: &mut AttemptLedger,
    ) -> Result<(), StepError> {
        loop {
            let outcome = match transition {
                Transition::OpenComposer => self.open_composer().await,
                Transition::EnterRecipient => self.enter_recipient(job.destination).await,
                Transition::ConfirmRecipient => self.confirm_recipient(job.destination).await,
                Transition::EnterText => self.enter_text(job.body).await,
                Transition::Dispatch => self.dispatch(job.body).await,
                Transition::Cleanup => self.delete_conversation(job.destination).await,
            };

            let failure = match outcome {
                Ok(()) => {
                    debug!(?transition, state = %transition.target(), "transition complete");
                    self.state = transition.target();
                    return Ok(());
                }
                Err(StepError::Failed(failure)) => failure,
                Err(other) => return Err(other),
            };

            let attempts = ledger.record(transition, failure.kind);
            match self.policy.decide(&failure, attempts) {
                RecoveryDecision::Retry { pause } => {
                    warn!(?transition, attempt = attempts, %failure, "⏳ Retrying step");
                    tokio::time::sleep(pause).await;
                }
                RecoveryDecision::Fallback => {
                    warn!(?transition, attempt = attempts, %failure, "🩹 Unexpected screen, pressing Back");
                    match self.fallback(transition).await {
                        Ok(()) | Err(StepError::Failed(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                RecoveryDecision::Escalate => return Err(StepError::Failed(failure)),
            }
        }
    }

    /// Hardware Back, then work out where we landed.
    async fn fallback(&mut self, transition: Transition) -> Result<(), StepError> {
        self.act(DeviceAction::key(Key::Back), self.timing.back_settle).await?;
        match self.identify_screen().await? {
            Some(NavigationState::Baseline) if transition.restartable() => Err(StepError::Restart),
            Some(screen) => {
                debug!(%screen, "re-synced after fallback");
                Ok(())
            }
            None => {
                debug!("screen not recognized after fallback");
                Ok(())
            }
        }
    }

    async fn identify_screen(&mut self) -> Result<Option<NavigationState>, StepError> {
        let tree = self.snapshot().await?;
        let screen = if self.locator.exists(&tree, &selectors::start_chat()) {
            Some(NavigationState::Baseline)
        } else if self.locator.exists(&tree, &selectors::compose_field()) {
            Some(NavigationState::RecipientConfirmed)
        } else if self.locator.exists(&tree, &selectors::contact_suggestions()) {
            Some(NavigationState::RecipientEntered)
        } else if self.locator.exists(&tree, &selectors::contact_search()) {
            Some(NavigationState::ComposerOpen)
        } else {
            None
        };
        Ok(screen)
    }

    // =====================================================
    // TRANSITIONS
    // =====================================================

    async fn open_composer(&mut self) -> Result<(), StepError> {
        let tree = self.snapshot().await?;
        if self.locator.exists(&tree, &selectors::contact_search()) {
            return Ok(());
        }
        let fab = self.find_in(&tree, &selectors::start_chat())?;
        self.tap(&fab).await?;

        let tree = self.snapshot().await?;
        if !self.locator.exists(&tree, &selectors::contact_search()) {
            return Err(self.failure(FailureKind::UnexpectedState, "address field not shown after start chat").into());
        }
        Ok(())
    }

    async fn enter_recipient(&mut self, destination: &str) -> Result<(), StepError> {
        let field = self.require(&selectors::contact_search()).await?;
        self.tap(&field).await?;
        self.clear_field(&field).await?;

        let digits = destination.trim_start_matches('+');
        self.act(DeviceAction::InputText { text: digits.to_string() }, self.timing.typing_settle)
            .await?;

        let tree = self.snapshot().await?;
        let typed = self
            .locator
            .find(&tree, &selectors::contact_search())
            .map(|f| digits_of(f.text()))
            .unwrap_or_default();
        if !typed.contains(digits) {
            return Err(self
                .failure(FailureKind::ActionTimedOut, format!("address field holds '{}'", typed))
                .into());
        }

        self.act(DeviceAction::key(Key::Enter), self.timing.key_settle).await
    }

    async fn confirm_recipient(&mut self, destination: &str) -> Result<(), StepError> {
        let tree = self.snapshot().await?;
        if self.locator.exists(&tree, &selectors::compose_field()) {
            return Ok(());
        }

        if self.locator.exists(&tree, &selectors::contact_suggestions()) {
            match self.locator.find(&tree, &selectors::suggestion_for(destination)) {
                Some(suggestion) => self.tap(&suggestion).await?,
                None => self.act(DeviceAction::key(Key::Enter), self.timing.key_settle).await?,
            }
        } else if self.locator.exists(&tree, &selectors::contact_search()) {
            // Number typed but not yet accepted.
            self.act(DeviceAction::key(Key::Enter), self.timing.key_settle).await?;
        }

        let tree = self.snapshot().await?;
        if self.locator.exists(&tree, &selectors::compose_field()) {
            Ok(())
        } else if self.locator.exists(&tree, &selectors::contact_search()) {
            Err(self.failure(FailureKind::ActionTimedOut, "recipient not accepted").into())
        } else {
            Err(self.failure(FailureKind::UnexpectedState, "conversation did not open").into())
        }
    }

    async fn enter_text(&mut self, body: &MessageBody) -> Result<(), StepError> {
        let field = self.require(&selectors::compose_field()).await?;
        self.tap(&field).await?;
        self.clear_field(&field).await?;
        for chunk in DeviceAction::type_text(body.as_str()) {
            self.act(chunk, self.timing.typing_settle).await?;
        }

        if !self.compose_holds(body).await? {
            return Err(self.failure(FailureKind::ActionTimedOut, "message text not in compose field").into());
        }
        Ok(())
    }

    async fn dispatch(&mut self, body: &MessageBody) -> Result<(), StepError> {
        if self.mode == DispatchMode::Draft {
            // Collapsing the keyboard commits the draft.
            return self.act(DeviceAction::key(Key::Back), self.timing.back_settle).await;
        }

        let tree = self.snapshot().await?;
        match self.locator.find(&tree, &selectors::send_button()) {
            Some(send) => self.tap(&send).await?,
            None => {
                warn!("send control not found, pressing Enter");
                self.act(DeviceAction::key(Key::Enter), self.timing.key_settle).await?;
            }
        }

        if self.compose_holds(body).await? {
            return Err(self.failure(FailureKind::ActionTimedOut, "message still in compose field").into());
        }
        Ok(())
    }

    /// Long-press the recipient's conversation (the newest row if none shows
    /// the number), delete it, confirm. Skips any sub-step whose result is
    /// already on screen.
    async fn delete_conversation(&mut self, destination: &str) -> Result<(), StepError> {
        let tree = self.snapshot().await?;
        if !self.locator.exists(&tree, &selectors::confirm_button()) {
            if !self.locator.exists(&tree, &selectors::delete_action()) {
                let row = self.find_in(&tree, &selectors::conversation_row_for(destination))?;
                let press = DeviceAction::LongPress {
                    x: row.point.x,
                    y: row.point.y,
                    duration_ms: self.timing.long_press.as_millis() as u64,
                };
                self.act(press, self.timing.tap_settle).await?;
            }
            let delete = self.require(&selectors::delete_action()).await?;
            self.tap(&delete).await?;
        }
        let confirm = self.require(&selectors::confirm_button()).await?;
        self.tap(&confirm).await
    }

    // =====================================================
    // RESTORATION
    // =====================================================

    /// Two navigate-backs, skipped when the sequence never left Baseline;
    /// `restore_baseline` covers whatever this misses.
    async fn unwind(&mut self) -> Result<(), AgentError> {
        if self.state == NavigationState::Baseline {
            return Ok(());
        }
        for _ in 0..UNWIND_BACKS {
            if let Err(e) = self.navigate_back().await {
                absorb(e)?;
            }
        }
        Ok(())
    }

    /// On-screen Back when shown, hardware Back otherwise.
    async fn navigate_back(&mut self) -> Result<(), StepError> {
        let tree = self.snapshot().await?;
        match self.locator.find(&tree, &selectors::navigate_back()) {
            Some(back) => {
                let action = DeviceAction::Tap {
                    x: back.point.x,
                    y: back.point.y,
                };
                self.act(action, self.timing.back_settle).await
            }
            None => self.act(DeviceAction::key(Key::Back), self.timing.back_settle).await,
        }
    }

    /// Confirm Baseline; otherwise press Back a bounded number of times,
    /// then relaunch the app.
    async fn restore_baseline(&mut self) -> Result<bool, AgentError> {
        if self.at_baseline().await? {
            return Ok(true);
        }
        for attempt in 1..=self.policy.max_attempts {
            debug!(attempt, "not at conversation list, pressing Back");
            if let Err(e) = self.act(DeviceAction::key(Key::Back), self.timing.back_settle).await {
                absorb(e)?;
            }
            if self.at_baseline().await? {
                return Ok(true);
            }
        }

        warn!("🚀 Relaunching messaging app to reach the conversation list");
        if let Err(e) = self.launch().await {
            absorb(e)?;
        }
        self.at_baseline().await
    }

    async fn at_baseline(&mut self) -> Result<bool, AgentError> {
        match self.device.dump_ui().await {
            Ok(tree) => Ok(self.locator.exists(&tree, &selectors::start_chat())),
            Err(e) if e.is_fatal() => Err(AgentError::Connection(e.to_string())),
            Err(e) => {
                debug!(error = %e, "ui dump failed during baseline check");
                Ok(false)
            }
        }
    }

    async fn launch(&mut self) -> Result<(), StepError> {
        let action = DeviceAction::LaunchApp {
            package: self.package.clone(),
            activity: self.activity.clone(),
        };
        self.act(action, self.timing.launch_settle).await
    }

    // =====================================================
    // PRIMITIVES
    // =====================================================

    async fn snapshot(&mut self) -> Result<UiTree, StepError> {
        let state = self.state;
        self.device.dump_ui().await.map_err(|e| lift(state, e))
    }

    async fn act(&mut self, action: DeviceAction, settle: Duration) -> Result<(), StepError> {
        debug!(command = %action.to_shell(), "device action");
        let state = self.state;
        self.device.execute(&action).await.map_err(|e| lift(state, e))?;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }

    async fn tap(&mut self, element: &UiElement) -> Result<(), StepError> {
        let action = DeviceAction::Tap {
            x: element.point.x,
            y: element.point.y,
        };
        self.act(action, self.timing.tap_settle).await
    }

    /// Move to the end and delete every character the field shows.
    async fn clear_field(&mut self, field: &UiElement) -> Result<(), StepError> {
        let existing = field.text().chars().count();
        if existing == 0 {
            return Ok(());
        }
        let mut keys = vec![Key::MoveEnd];
        keys.extend(std::iter::repeat(Key::Del).take(existing));
        self.act(DeviceAction::KeyEvents { keys }, self.timing.key_settle).await
    }

    async fn compose_holds(&mut self, body: &MessageBody) -> Result<bool, StepError> {
        let tree = self.snapshot().await?;
        let prefix: String = body.as_str().chars().take(VERIFY_PREFIX_CHARS).collect();
        Ok(self
            .locator
            .find(&tree, &selectors::compose_field())
            .map(|field| field.text().contains(prefix.as_str()))
            .unwrap_or(false))
    }

    async fn require(&mut self, selector: &Selector) -> Result<UiElement, StepError> {
        let tree = self.snapshot().await?;
        self.find_in(&tree, selector)
    }

    fn find_in(&self, tree: &UiTree, selector: &Selector) -> Result<UiElement, StepError> {
        self.locator
            .find(tree, selector)
            .ok_or_else(|| self.failure(FailureKind::ElementNotFound, format!("{} not found", selector.name)).into())
    }

    fn failure(&self, kind: FailureKind, detail: impl Into<String>) -> StepFailure {
        StepFailure::new(kind, self.state, detail)
    }
}

/// Device errors either end the run or become step failures.
fn lift(state: NavigationState, error: DeviceError) -> StepError {
    match classify(&error) {
        Classification::Fatal => StepError::Fatal(AgentError::Connection(error.to_string())),
        Classification::Step(kind) => StepError::Failed(StepFailure::new(kind, state, error.to_string())),
    }
}

/// Restoration is best effort: only a lost device stops it.
fn absorb(error: StepError) -> Result<(), AgentError> {
    match error {
        StepError::Fatal(e) => Err(e),
        StepError::Failed(failure) => {
            warn!(%failure, "restoration step failed");
            Ok(())
        }
        StepError::Restart => Ok(()),
    }
}

fn digits_of(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Connector, SimFaults, SimulatedDevice, SimulatorConnector};
    use crate::selectors::{CONTACT_SEARCH_ID, MESSAGE_TEXT_ID};

    fn config(mode: DispatchMode) -> RunConfig {
        RunConfig {
            mode,
            timing: Timing::instant(),
            retry_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn ready(faults: SimFaults, config: &RunConfig) -> (SimulatorConnector, Navigator<SimulatedDevice>) {
        let connector = SimulatorConnector::new(faults);
        let device = connector.connect(None).await.unwrap();
        let mut navigator = Navigator::new(device, config);
        assert!(navigator.prepare().await.unwrap());
        (connector, navigator)
    }

    fn body(text: &str) -> MessageBody {
        MessageBody::new(text).unwrap()
    }

    struct BlindLocator;

    impl ElementLocator for BlindLocator {
        fn find(&self, _tree: &UiTree, _selector: &Selector) -> Option<UiElement> {
            None
        }
    }

    #[tokio::test]
    async fn test_sends_each_recipient_and_returns_to_list() {
        let (connector, mut nav) = ready(SimFaults::default(), &config(DispatchMode::Send)).await;
        let message = body("Meeting moved to 3pm");

        for number in ["+15550100", "+15550101", "+15550102"] {
            let mut recipient = Recipient::new(number);
            nav.process(&mut recipient, &message).await.unwrap();
            assert_eq!(recipient.status, RecipientStatus::Sent);
            assert_eq!(recipient.attempts, 0);
            assert_eq!(nav.state(), NavigationState::BaselineRestored);
        }

        let report = connector.report();
        assert_eq!(report.sent.len(), 3);
        assert_eq!(report.sent[0], ("+15550100".to_string(), "Meeting moved to 3pm".to_string()));
        assert_eq!(report.draft_saves, 0);
        assert_eq!(report.screen, "conversation_list");
    }

    #[tokio::test]
    async fn test_draft_mode_never_sends() {
        let (connector, mut nav) = ready(SimFaults::default(), &config(DispatchMode::Draft)).await;
        let mut recipient = Recipient::new("+447700900123");
        nav.process(&mut recipient, &body("hello")).await.unwrap();

        assert_eq!(recipient.status, RecipientStatus::Drafted);
        let report = connector.report();
        assert_eq!(report.send_actions, 0);
        assert_eq!(report.draft_saves, 1);
        assert_eq!(report.conversations[0].draft.as_deref(), Some("hello"));
        assert_eq!(report.screen, "conversation_list");
    }

    #[tokio::test]
    async fn test_delete_after_send() {
        let mut cfg = config(DispatchMode::Send);
        cfg.delete_after_send = true;
        let (connector, mut nav) = ready(SimFaults::default(), &cfg).await;

        for number in ["+15550100", "+15550101"] {
            let mut recipient = Recipient::new(number);
            nav.process(&mut recipient, &body("hi")).await.unwrap();
            assert_eq!(recipient.status, RecipientStatus::Sent);
        }

        let report = connector.report();
        assert_eq!(report.deletions, 2);
        assert!(report.conversations.is_empty());
        assert_eq!(report.sent.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_skips_pinned_conversation() {
        let mut cfg = config(DispatchMode::Send);
        cfg.delete_after_send = true;
        let faults = SimFaults {
            pinned: vec!["+15559999".to_string()],
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &cfg).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        let report = connector.report();
        assert_eq!(report.deletions, 1);
        assert_eq!(report.conversations.len(), 1);
        assert_eq!(report.conversations[0].recipient, "+15559999");
    }

    #[tokio::test]
    async fn test_body_with_literal_percent_s() {
        let (connector, mut nav) = ready(SimFaults::default(), &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("use %s here")).await.unwrap();

        assert_eq!(recipient.status, RecipientStatus::Sent);
        assert_eq!(connector.report().sent[0].1, "use %s here");
    }

    #[tokio::test]
    async fn test_failed_recipient_is_not_deleted() {
        let mut cfg = config(DispatchMode::Send);
        cfg.delete_after_send = true;
        let faults = SimFaults {
            unresponsive: vec![CONTACT_SEARCH_ID.to_string()],
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &cfg).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        assert!(matches!(recipient.status, RecipientStatus::Failed { .. }));
        assert_eq!(connector.report().deletions, 0);
    }

    #[tokio::test]
    async fn test_missing_start_chat_escalates_after_ceiling() {
        let connector = SimulatorConnector::new(SimFaults::default());
        let device = connector.connect(None).await.unwrap();
        let mut nav = Navigator::with_locator(device, BlindLocator, &config(DispatchMode::Send));
        assert!(!nav.prepare().await.unwrap());

        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        match &recipient.status {
            RecipientStatus::Failed { kind, state, .. } => {
                assert_eq!(*kind, FailureKind::ElementNotFound);
                assert_eq!(*state, NavigationState::Baseline);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(recipient.attempts, 3);
        let report = connector.report();
        assert!(report.actions.iter().all(|a| !matches!(a, DeviceAction::Tap { .. })));
        assert!(report.sent.is_empty());
    }

    #[tokio::test]
    async fn test_unresponsive_field_times_out_then_restores() {
        let faults = SimFaults {
            unresponsive: vec![CONTACT_SEARCH_ID.to_string()],
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        match &recipient.status {
            RecipientStatus::Failed { kind, state, .. } => {
                assert_eq!(*kind, FailureKind::ActionTimedOut);
                assert_eq!(*state, NavigationState::ComposerOpen);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(recipient.attempts, 3);
        assert_eq!(connector.report().screen, "conversation_list");
        assert_eq!(nav.state(), NavigationState::BaselineRestored);
    }

    #[tokio::test]
    async fn test_contact_suggestion_is_tapped() {
        let faults = SimFaults {
            suggestions: true,
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+14155550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        assert_eq!(recipient.status, RecipientStatus::Sent);
        assert_eq!(connector.report().sent[0].0, "+14155550100");
    }

    #[tokio::test]
    async fn test_overlay_triggers_fallback_and_restart() {
        let faults = SimFaults {
            promo_overlays: 1,
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        assert_eq!(recipient.status, RecipientStatus::Sent);
        assert_eq!(recipient.attempts, 1);
        assert_eq!(connector.report().sent.len(), 1);
    }

    #[tokio::test]
    async fn test_prefilled_compose_field_is_cleared() {
        let (connector, mut nav) = ready(SimFaults::default(), &config(DispatchMode::Draft)).await;
        let mut first = Recipient::new("+15550100");
        nav.process(&mut first, &body("old draft")).await.unwrap();

        let mut nav = Navigator::new(nav.into_device(), &config(DispatchMode::Send));
        let mut second = Recipient::new("+15550100");
        nav.process(&mut second, &body("new text")).await.unwrap();

        assert_eq!(second.status, RecipientStatus::Sent);
        assert_eq!(connector.report().sent, vec![("+15550100".to_string(), "new text".to_string())]);
    }

    #[tokio::test]
    async fn test_unresponsive_compose_field_fails_at_text_entry() {
        let faults = SimFaults {
            unresponsive: vec![MESSAGE_TEXT_ID.to_string()],
            ..Default::default()
        };
        let (connector, mut nav) = ready(faults, &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+15550100");
        nav.process(&mut recipient, &body("hi")).await.unwrap();

        assert!(matches!(
            recipient.status,
            RecipientStatus::Failed { kind: FailureKind::ActionTimedOut, state: NavigationState::RecipientConfirmed, .. }
        ));
        let report = connector.report();
        assert_eq!(report.send_actions, 0);
        assert_eq!(report.screen, "conversation_list");
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let faults = SimFaults {
            disconnect_after: Some(4),
            ..Default::default()
        };
        let (_connector, mut nav) = ready(faults, &config(DispatchMode::Send)).await;
        let mut recipient = Recipient::new("+15550100");
        let err = nav.process(&mut recipient, &body("hi")).await.unwrap_err();

        assert!(matches!(err, AgentError::Connection(_)));
        assert!(recipient.status.is_terminal());
    }
}
