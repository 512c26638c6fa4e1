//! `adb` transport: device discovery, shell commands, UI dumps.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Connector, DeviceError, DeviceSession};
use crate::error::AgentError;
use crate::schema::DeviceAction;
use crate::ui_tree::UiTree;

const DUMP_PATH: &str = "/sdcard/window_dump.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub state: String,
}

impl DeviceInfo {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Parse `adb devices` output.
pub fn parse_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(DeviceInfo {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Pick the device to drive. An explicit serial must be attached and ready;
/// without one, exactly one ready device must be attached.
pub fn select_device(devices: &[DeviceInfo], serial: Option<&str>) -> Result<String, AgentError> {
    match serial {
        Some(wanted) => match devices.iter().find(|d| d.serial == wanted) {
            Some(d) if d.is_ready() => Ok(d.serial.clone()),
            Some(d) => Err(AgentError::Connection(format!("device {} is {}", wanted, d.state))),
            None => Err(AgentError::Connection(format!("device {} not found", wanted))),
        },
        None => {
            let ready: Vec<&DeviceInfo> = devices.iter().filter(|d| d.is_ready()).collect();
            match ready.as_slice() {
                [only] => Ok(only.serial.clone()),
                [] => Err(AgentError::Connection("no devices/emulators found".to_string())),
                many => Err(AgentError::Connection(format!(
                    "{} devices attached; pick one with --serialno",
                    many.len()
                ))),
            }
        }
    }
}

/// adb error text that means the device itself is unreachable.
pub fn is_disconnect_message(stderr: &str) -> bool {
    let msg = stderr.to_lowercase();
    msg.contains("device offline")
        || msg.contains("no devices/emulators found")
        || (msg.contains("device") && msg.contains("not found"))
        || msg.contains("device unauthorized")
        || msg.contains("closed")
        || msg.contains("cannot connect")
}

async fn run_adb(adb: &Path, args: &[&str], timeout: Duration) -> Result<String, DeviceError> {
    let command = args.join(" ");
    let mut cmd = Command::new(adb);
    cmd.args(args).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(DeviceError::TimedOut {
                command,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        if is_disconnect_message(&stderr) {
            return Err(DeviceError::Disconnected(stderr));
        }
        let detail = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
        return Err(DeviceError::CommandFailed { command, detail });
    }
    Ok(stdout)
}

pub struct AdbConnector {
    pub adb: PathBuf,
    pub command_timeout: Duration,
}

impl AdbConnector {
    pub fn new(adb: PathBuf, command_timeout: Duration) -> Self {
        Self { adb, command_timeout }
    }
}

#[async_trait]
impl Connector for AdbConnector {
    type Session = AdbSession;

    async fn connect(&self, serial: Option<&str>) -> Result<AdbSession, AgentError> {
        let listing = run_adb(&self.adb, &["devices"], self.command_timeout)
            .await
            .map_err(|e| AgentError::Connection(e.to_string()))?;
        let devices = parse_devices(&listing);
        debug!(count = devices.len(), "adb devices listed");

        let serial = select_device(&devices, serial)?;
        info!(serial = %serial, "device connected");
        Ok(AdbSession {
            adb: self.adb.clone(),
            serial,
            command_timeout: self.command_timeout,
        })
    }
}

pub struct AdbSession {
    adb: PathBuf,
    serial: String,
    command_timeout: Duration,
}

impl AdbSession {
    async fn shell(&self, command: &str) -> Result<String, DeviceError> {
        run_adb(
            &self.adb,
            &["-s", self.serial.as_str(), "shell", command],
            self.command_timeout,
        )
        .await
    }
}

#[async_trait]
impl DeviceSession for AdbSession {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn execute(&mut self, action: &DeviceAction) -> Result<(), DeviceError> {
        let command = action.to_shell();
        debug!(command = %command, "adb shell");
        self.shell(&command).await.map(|_| ())
    }

    async fn dump_ui(&mut self) -> Result<UiTree, DeviceError> {
        let command = format!("uiautomator dump {}", DUMP_PATH);
        let report = self.shell(&command).await?;
        if !report.contains("dumped") {
            return Err(DeviceError::CommandFailed {
                command,
                detail: report.trim().to_string(),
            });
        }

        let xml = self.shell(&format!("cat {}", DUMP_PATH)).await?;
        let tree = UiTree::parse(&xml);
        if tree.is_empty() {
            return Err(DeviceError::CommandFailed {
                command: format!("cat {}", DUMP_PATH),
                detail: "empty view hierarchy".to_string(),
            });
        }
        Ok(tree)
    }
}
