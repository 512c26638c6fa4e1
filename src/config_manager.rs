//! Run configuration, resolved once before the run starts.
//!
//! Sources, lowest to highest precedence: built-in defaults, `.env` /
//! process environment (`BULK_SMS_*`), command-line flags.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cli::Cli;
use crate::controller::recovery::RecoveryPolicy;
use crate::error::{AgentError, Result};
use crate::selectors::{CONVERSATION_LIST_ACTIVITY, MESSAGES_PACKAGE};

pub const ENV_ADB: &str = "BULK_SMS_ADB";
pub const ENV_PACKAGE: &str = "BULK_SMS_PACKAGE";
pub const ENV_MAX_ATTEMPTS: &str = "BULK_SMS_MAX_ATTEMPTS";
pub const ENV_SETTLE_MS: &str = "BULK_SMS_SETTLE_MS";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "BULK_SMS_COMMAND_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchMode {
    Send,
    Draft,
}

/// Waits after UI actions, and the adb command deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub launch_settle: Duration,
    pub tap_settle: Duration,
    pub key_settle: Duration,
    pub typing_settle: Duration,
    pub back_settle: Duration,
    pub long_press: Duration,
    pub command_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            launch_settle: Duration::from_secs(3),
            tap_settle: Duration::from_secs(3),
            key_settle: Duration::from_secs(1),
            typing_settle: Duration::from_secs(2),
            back_settle: Duration::from_secs(2),
            long_press: Duration::from_millis(1000),
            command_timeout: Duration::from_secs(20),
        }
    }
}

impl Timing {
    /// No settle waits. For the simulator, where the UI never lags.
    pub fn instant() -> Self {
        Self {
            launch_settle: Duration::ZERO,
            tap_settle: Duration::ZERO,
            key_settle: Duration::ZERO,
            typing_settle: Duration::ZERO,
            back_settle: Duration::ZERO,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub device_serial: Option<String>,
    pub mode: DispatchMode,
    pub delete_after_send: bool,
    pub delay: Duration,
    pub max_attempts: u32,
    pub retry_pause: Duration,
    pub adb_path: PathBuf,
    pub package: String,
    pub activity: String,
    pub timing: Timing,
    pub simulate: bool,
    pub numbers_path: PathBuf,
    pub content_path: PathBuf,
    pub country_code: Option<String>,
    pub summary_json: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            device_serial: None,
            mode: DispatchMode::Send,
            delete_after_send: false,
            delay: Duration::from_secs(5),
            max_attempts: 3,
            retry_pause: Duration::from_secs(2),
            adb_path: PathBuf::from("adb"),
            package: MESSAGES_PACKAGE.to_string(),
            activity: CONVERSATION_LIST_ACTIVITY.to_string(),
            timing: Timing::default(),
            simulate: false,
            numbers_path: PathBuf::from(crate::cli::DEFAULT_NUMBERS_FILE),
            content_path: PathBuf::from(crate::cli::DEFAULT_CONTENT_FILE),
            country_code: None,
            summary_json: None,
        }
    }
}

impl RunConfig {
    /// Resolve from the CLI plus `.env` and the process environment.
    pub fn from_env(cli: &Cli) -> Result<Self> {
        dotenv::dotenv().ok();
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::resolve(cli, &env)
    }

    pub fn resolve(cli: &Cli, env: &HashMap<String, String>) -> Result<Self> {
        let mut config = RunConfig::default();

        config.adb_path = match env.get(ENV_ADB) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => bundled_adb().unwrap_or_else(|| PathBuf::from("adb")),
        };
        if let Some(package) = env.get(ENV_PACKAGE).filter(|p| !p.trim().is_empty()) {
            config.package = package.trim().to_string();
        }
        if let Some(attempts) = env_parse::<u32>(env, ENV_MAX_ATTEMPTS)? {
            config.max_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>(env, ENV_SETTLE_MS)? {
            config.timing.tap_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(env, ENV_COMMAND_TIMEOUT_MS)? {
            config.timing.command_timeout = Duration::from_millis(ms);
        }

        config.device_serial = cli.serialno.clone();
        config.mode = if cli.draft { DispatchMode::Draft } else { DispatchMode::Send };
        config.delete_after_send = cli.delete;
        config.delay = Duration::from_secs(cli.delay);
        if let Some(attempts) = cli.max_attempts {
            config.max_attempts = attempts;
        }
        config.simulate = cli.simulate;
        config.numbers_path = cli.numbers.clone();
        config.content_path = cli.content.clone();
        config.country_code = cli.country_code.clone();
        config.summary_json = cli.summary_json.clone();

        if config.max_attempts == 0 {
            return Err(AgentError::Config("max attempts must be at least 1".to_string()));
        }
        if config.simulate {
            config.timing = Timing::instant();
            config.retry_pause = Duration::ZERO;
        }
        Ok(config)
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        let base = self.retry_pause.as_millis() as u64;
        RecoveryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_pause_ms: base,
            max_pause_ms: base * 4,
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(env: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

/// An `adb` binary shipped next to our executable takes precedence over PATH.
fn bundled_adb() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    let candidate = exe.parent()?.join(name);
    candidate.is_file().then_some(candidate)
}
