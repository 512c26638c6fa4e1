//! Recipient list and message body, loaded from the two input files.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::controller::state::{FailureKind, NavigationState, StepFailure};
use crate::error::InputError;

static E164_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("valid E.164 regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Drafted,
    Failed {
        kind: FailureKind,
        state: NavigationState,
        reason: String,
    },
}

impl RecipientStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecipientStatus::Pending)
    }
}

impl From<StepFailure> for RecipientStatus {
    fn from(failure: StepFailure) -> Self {
        RecipientStatus::Failed {
            kind: failure.kind,
            state: failure.state,
            reason: failure.detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    /// E.164, leading `+` included.
    pub destination: String,
    pub status: RecipientStatus,
    /// Failed step attempts recorded while processing.
    pub attempts: u32,
}

impl Recipient {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            status: RecipientStatus::Pending,
            attempts: 0,
        }
    }
}

/// The single message text sent to every recipient. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return None;
        }
        if !text.is_ascii() {
            warn!("message contains non-ASCII characters; `adb shell input text` may drop them");
        }
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `max` characters, with an ellipsis when cut.
    pub fn preview(&self, max: usize) -> String {
        if self.0.chars().count() <= max {
            return self.0.clone();
        }
        let cut: String = self.0.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[derive(Debug, Clone)]
pub struct RecipientQueue {
    pub recipients: Vec<Recipient>,
    pub body: MessageBody,
}

impl RecipientQueue {
    pub fn load(numbers_path: &Path, content_path: &Path, country_code: Option<&str>) -> Result<Self, InputError> {
        let recipients = load_numbers(numbers_path, country_code)?
            .into_iter()
            .map(Recipient::new)
            .collect();
        let body = load_body(content_path)?;
        Ok(Self { recipients, body })
    }
}

fn read_file(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => InputError::FileNotFound(path.to_path_buf()),
        _ => InputError::Read {
            path: PathBuf::from(path),
            source: e,
        },
    })
}

/// Valid numbers from the file, deduplicated and sorted.
pub fn load_numbers(path: &Path, country_code: Option<&str>) -> Result<Vec<String>, InputError> {
    let raw = read_file(path)?;
    let mut numbers = BTreeSet::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match normalize_destination(line, country_code) {
            Some(number) => {
                numbers.insert(number);
            }
            None => debug!(line, "skipping unparsable number"),
        }
    }
    if numbers.is_empty() {
        return Err(InputError::NoValidNumbers(path.to_path_buf()));
    }
    Ok(numbers.into_iter().collect())
}

/// First line of the content file, trimmed.
pub fn load_body(path: &Path) -> Result<MessageBody, InputError> {
    let raw = read_file(path)?;
    let first = raw.lines().next().unwrap_or_default();
    MessageBody::new(first).ok_or_else(|| InputError::EmptyContent(path.to_path_buf()))
}

/// Normalize one line to E.164.
///
/// Accepts `+` or `00` international prefixes and the usual separators
/// (spaces, dashes, dots, parentheses). National numbers need a
/// `country_code`; their single trunk `0` is dropped.
pub fn normalize_destination(raw: &str, country_code: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.chars().any(|c| !(c.is_ascii_digit() || "+-. ()/".contains(c))) {
        return None;
    }
    let international = raw.starts_with('+');
    if raw.chars().skip(1).any(|c| c == '+') {
        return None;
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let candidate = if international {
        format!("+{}", digits)
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{}", rest)
    } else {
        let code = country_code?.trim().trim_start_matches('+');
        let national = digits.strip_prefix('0').unwrap_or(&digits);
        format!("+{}{}", code, national)
    };

    E164_RE.is_match(&candidate).then_some(candidate)
}
