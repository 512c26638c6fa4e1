use serde::{Deserialize, Serialize};

/// Android key codes used by the engine (`input keyevent <code>`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Back,
    Enter,
    Del,
    MoveEnd,
}

impl Key {
    pub fn code(self) -> u16 {
        match self {
            Key::Back => 4,
            Key::Enter => 66,
            Key::Del => 67,
            Key::MoveEnd => 123,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", content = "payload")]
pub enum DeviceAction {
    #[serde(rename = "app.launch")]
    LaunchApp { package: String, activity: String },

    #[serde(rename = "ui.tap")]
    Tap { x: i32, y: i32 },
    #[serde(rename = "ui.long_press")]
    LongPress { x: i32, y: i32, duration_ms: u64 },

    #[serde(rename = "keyboard.text")]
    InputText { text: String },
    #[serde(rename = "keyboard.keys")]
    KeyEvents { keys: Vec<Key> },
}

impl DeviceAction {
    pub fn key(key: Key) -> Self {
        DeviceAction::KeyEvents { keys: vec![key] }
    }

    /// `InputText` actions that together type `text` verbatim.
    pub fn type_text(text: &str) -> Vec<DeviceAction> {
        input_text_chunks(text)
            .into_iter()
            .map(|text| DeviceAction::InputText { text })
            .collect()
    }

    /// Shell command run on the device for this action.
    pub fn to_shell(&self) -> String {
        match self {
            DeviceAction::LaunchApp { package, activity } => {
                format!("am start -n {}/{}", package, activity)
            }
            DeviceAction::Tap { x, y } => format!("input tap {} {}", x, y),
            // A zero-distance swipe is a long press.
            DeviceAction::LongPress { x, y, duration_ms } => {
                format!("input swipe {} {} {} {} {}", x, y, x, y, duration_ms)
            }
            DeviceAction::InputText { text } => format!("input text {}", escape_input_text(text)),
            DeviceAction::KeyEvents { keys } => {
                let codes: Vec<String> = keys.iter().map(|k| k.code().to_string()).collect();
                format!("input keyevent {}", codes.join(" "))
            }
        }
    }
}

/// Escape text for `input text` running under the device shell.
/// Spaces become `%s`; shell metacharacters are backslash-escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => out.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*' | '~'
            | '#' | '?' | '[' | ']' | '{' | '}' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// `input text` turns every literal `%s` into a space, so split after the
/// `%` of each one and type the pieces separately.
pub fn input_text_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find("%s") {
        chunks.push(rest[..=at].to_string());
        rest = &rest[at + 1..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
