//! Runs the queue through the navigator and accounts for the outcome.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config_manager::{DispatchMode, RunConfig};
use crate::controller::Navigator;
use crate::device::{Connector, DeviceSession};
use crate::error::AgentError;
use crate::recipients::{Recipient, RecipientQueue, RecipientStatus};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct RecipientReport {
    pub destination: String,
    #[serde(flatten)]
    pub status: RecipientStatus,
    pub attempts: u32,
}

impl From<&Recipient> for RecipientReport {
    fn from(recipient: &Recipient) -> Self {
        Self {
            destination: recipient.destination.clone(),
            status: recipient.status.clone(),
            attempts: recipient.attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub device: Option<String>,
    pub mode: DispatchMode,
    pub sent: usize,
    pub drafted: usize,
    pub failed: usize,
    pub total: usize,
    pub recipients: Vec<RecipientReport>,
}

impl RunSummary {
    pub fn new(mode: DispatchMode, total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            device: None,
            mode,
            sent: 0,
            drafted: 0,
            failed: 0,
            total,
            recipients: Vec::with_capacity(total),
        }
    }

    pub fn record(&mut self, recipient: &Recipient) {
        match recipient.status {
            RecipientStatus::Sent => self.sent += 1,
            RecipientStatus::Drafted => self.drafted += 1,
            RecipientStatus::Failed { .. } => self.failed += 1,
            RecipientStatus::Pending => {}
        }
        self.recipients.push(RecipientReport::from(recipient));
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Sent plus drafted, as a percentage of all recipients.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.sent + self.drafted) as f64 / self.total as f64 * 100.0
    }

    pub fn write_json(&self, path: &Path) -> Result<(), AgentError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// The run stopped before every recipient was handled.
#[derive(Debug, Error)]
#[error("run aborted: {error}")]
pub struct RunAborted {
    #[source]
    pub error: AgentError,
    /// What was done before the abort. `None` when nothing ran.
    pub partial: Option<RunSummary>,
}

pub struct Runner<'a> {
    config: &'a RunConfig,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub async fn run<C: Connector>(&self, connector: &C, queue: RecipientQueue) -> Result<RunSummary, RunAborted> {
        let RecipientQueue { mut recipients, body } = queue;
        let total = recipients.len();

        let device = connector
            .connect(self.config.device_serial.as_deref())
            .await
            .map_err(|error| RunAborted { error, partial: None })?;

        let mut summary = RunSummary::new(self.config.mode, total);
        summary.device = Some(device.serial().to_string());
        info!(run_id = %summary.run_id, serial = device.serial(), total, "🔌 Connected");
        println!("🔌 Connected to device: {}", device.serial());

        let mut navigator = Navigator::new(device, self.config);
        if let Err(error) = navigator.prepare().await {
            summary.finish();
            return Err(RunAborted {
                error,
                partial: Some(summary),
            });
        }

        for (index, recipient) in recipients.iter_mut().enumerate() {
            println!("\n📨 [{}/{}] {}", index + 1, total, recipient.destination);
            let outcome = navigator.process(recipient, &body).await;
            print_outcome(recipient);
            summary.record(recipient);

            if let Err(error) = outcome {
                error!(%error, "⛔️ Device lost, aborting run");
                summary.finish();
                return Err(RunAborted {
                    error,
                    partial: Some(summary),
                });
            }

            if needs_delay(index, total) && !self.config.delay.is_zero() {
                println!("   ⏳ Waiting {}s before the next message...", self.config.delay.as_secs());
                tokio::time::sleep(self.config.delay).await;
            }
        }

        summary.finish();
        Ok(summary)
    }
}

/// The inter-message pause goes between recipients, never after the last.
fn needs_delay(index: usize, total: usize) -> bool {
    index + 1 < total
}

fn print_outcome(recipient: &Recipient) {
    match &recipient.status {
        RecipientStatus::Sent => println!("   ✅ Sent to {}", recipient.destination),
        RecipientStatus::Drafted => println!("   📝 Draft saved for {}", recipient.destination),
        RecipientStatus::Failed { kind, state, reason } => {
            println!("   ❌ Failed ({} in {}): {}", kind, state, reason)
        }
        RecipientStatus::Pending => {}
    }
}

pub fn print_banner(config: &RunConfig, queue: &RecipientQueue) {
    let mode = match config.mode {
        DispatchMode::Send => "send",
        DispatchMode::Draft => "save as draft",
    };
    println!("📱 Bulk SMS Sender");
    println!("==================================================");
    println!("👥 Recipients : {}", queue.recipients.len());
    println!("💬 Message    : {}", queue.body.preview(PREVIEW_CHARS));
    println!("🚚 Mode       : {}", mode);
    println!("🗑️  Delete     : {}", if config.delete_after_send { "yes" } else { "no" });
    println!("⏱️  Delay      : {}s", config.delay.as_secs());
    match (&config.device_serial, config.simulate) {
        (_, true) => println!("🔌 Device     : simulated"),
        (Some(serial), false) => println!("🔌 Device     : {}", serial),
        (None, false) => println!("🔌 Device     : first available"),
    }
    println!("==================================================");
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n==================================================");
    println!("📊 Summary");
    println!("   ✅ Sent    : {}", summary.sent);
    println!("   📝 Drafted : {}", summary.drafted);
    println!("   ❌ Failed  : {}", summary.failed);
    println!("   👥 Total   : {}", summary.total);
    println!("   📈 Success : {:.1}%", summary.success_rate());
    for report in &summary.recipients {
        if let RecipientStatus::Failed { kind, reason, .. } = &report.status {
            println!("      - {} [{}] {}", report.destination, kind, reason);
        }
    }
    println!("==================================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::Timing;
    use crate::controller::FailureKind;
    use crate::device::{SimFaults, SimulatorConnector};
    use crate::recipients::MessageBody;
    use crate::selectors::START_CHAT_ID;
    use std::time::Duration;

    fn config(mode: DispatchMode) -> RunConfig {
        RunConfig {
            mode,
            delay: Duration::ZERO,
            timing: Timing::instant(),
            retry_pause: Duration::ZERO,
            simulate: true,
            ..Default::default()
        }
    }

    fn queue(numbers: &[&str]) -> RecipientQueue {
        RecipientQueue {
            recipients: numbers.iter().map(|n| Recipient::new(*n)).collect(),
            body: MessageBody::new("Reminder: dentist tomorrow at 10").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_three_recipients_all_sent() {
        let connector = SimulatorConnector::new(SimFaults::default());
        let cfg = config(DispatchMode::Send);
        let summary = Runner::new(&cfg)
            .run(&connector, queue(&["+15550100", "+15550101", "+15550102"]))
            .await
            .unwrap();

        assert_eq!((summary.sent, summary.drafted, summary.failed, summary.total), (3, 0, 0, 3));
        assert_eq!(summary.success_rate(), 100.0);
        assert!(summary.recipients.iter().all(|r| r.status.is_terminal()));
        assert!(summary.finished_at.is_some());
        assert_eq!(connector.report().sent.len(), 3);
    }

    #[tokio::test]
    async fn test_draft_run_counts_drafts() {
        let connector = SimulatorConnector::new(SimFaults::default());
        let cfg = config(DispatchMode::Draft);
        let summary = Runner::new(&cfg).run(&connector, queue(&["+15550100", "+15550101"])).await.unwrap();

        assert_eq!(summary.drafted, 2);
        assert_eq!(summary.sent, 0);
        assert_eq!(connector.report().send_actions, 0);
    }

    #[tokio::test]
    async fn test_connect_failure_aborts_before_any_recipient() {
        let connector = SimulatorConnector::new(SimFaults {
            unreachable: true,
            ..Default::default()
        });
        let cfg = config(DispatchMode::Send);
        let aborted = Runner::new(&cfg).run(&connector, queue(&["+15550100"])).await.unwrap_err();

        assert!(matches!(aborted.error, AgentError::Connection(_)));
        assert!(aborted.partial.is_none());
        assert!(connector.report().actions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_compose_control_fails_recipients_and_run_continues() {
        let connector = SimulatorConnector::new(SimFaults {
            hidden: vec![START_CHAT_ID.to_string()],
            ..Default::default()
        });
        let cfg = config(DispatchMode::Send);
        let summary = Runner::new(&cfg).run(&connector, queue(&["+15550100", "+15550101"])).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.recipients.len(), 2);
        for report in &summary.recipients {
            assert_eq!(report.attempts, cfg.max_attempts);
            assert!(matches!(
                report.status,
                RecipientStatus::Failed { kind: FailureKind::ElementNotFound, .. }
            ));
        }
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_mid_run_disconnect_returns_partial_summary() {
        let connector = SimulatorConnector::new(SimFaults {
            disconnect_after: Some(30),
            ..Default::default()
        });
        let cfg = config(DispatchMode::Send);
        let aborted = Runner::new(&cfg)
            .run(&connector, queue(&["+15550100", "+15550101", "+15550102"]))
            .await
            .unwrap_err();

        assert!(matches!(aborted.error, AgentError::Connection(_)));
        let partial = aborted.partial.unwrap();
        assert_eq!(partial.sent, 1);
        assert_eq!(partial.recipients.len(), 2);
        assert_eq!(partial.total, 3);
        assert!(partial.recipients.iter().all(|r| r.status.is_terminal()));
    }

    #[test]
    fn test_delay_only_between_recipients() {
        assert!(needs_delay(0, 3));
        assert!(needs_delay(1, 3));
        assert!(!needs_delay(2, 3));
        assert!(!needs_delay(0, 1));
    }

    #[tokio::test]
    async fn test_summary_json_written() {
        let connector = SimulatorConnector::new(SimFaults::default());
        let cfg = config(DispatchMode::Send);
        let summary = Runner::new(&cfg).run(&connector, queue(&["+15550100"])).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sent"], 1);
        assert_eq!(value["recipients"][0]["destination"], "+15550100");
        assert_eq!(value["recipients"][0]["status"], "sent");
    }
}
