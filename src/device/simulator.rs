//! In-process stand-in for a phone running Google Messages.
//!
//! Models just enough of the app for the navigator: a screen stack, the soft
//! keyboard, conversations with drafts, and conversation deletion. Faults can
//! be injected to exercise recovery. Backs `--simulate` dry runs and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;

use super::{Connector, DeviceError, DeviceSession};
use crate::error::AgentError;
use crate::schema::{DeviceAction, Key};
use crate::selectors::{
    BACK_DESC, CONFIRM_ID, CONTACT_SEARCH_ID, CONTACT_SUGGESTIONS_ID, CONVERSATION_ROW_ID, DELETE_ACTION_ID,
    MESSAGES_PACKAGE, MESSAGE_TEXT_ID, SEND_ID, START_CHAT_ID,
};
use crate::ui_tree::{Bounds, Point, UiNode, UiTree};

const SIM_SERIAL: &str = "sim-0001";
const SUGGESTION_ROW_ID: &str = "sim:suggestion_row";
const CANCEL_ID: &str = "android:id/button2";
const PROMO_DISMISS_ID: &str = "sim:promo_dismiss";
const MAX_ROWS: usize = 5;

static LAUNCHER: Screen = Screen::Launcher;

#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// Resource ids that are never rendered.
    pub hidden: Vec<String>,
    /// Field resource ids that ignore typed text.
    pub unresponsive: Vec<String>,
    /// Show a contact suggestion list after the number is submitted.
    pub suggestions: bool,
    /// Operations (actions + dumps) served before the device drops.
    pub disconnect_after: Option<usize>,
    /// `connect` fails outright.
    pub unreachable: bool,
    /// Times a promo overlay appears instead of the composer.
    pub promo_overlays: usize,
    /// Conversations that stay above all others in the list.
    pub pinned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    Launcher,
    ConversationList { selected: Option<usize> },
    NewConversation { query: String, suggestions_shown: bool },
    Conversation { recipient: String, draft: String },
    DeleteConfirm,
    Promo,
}

impl Screen {
    fn name(&self) -> &'static str {
        match self {
            Screen::Launcher => "launcher",
            Screen::ConversationList { .. } => "conversation_list",
            Screen::NewConversation { .. } => "new_conversation",
            Screen::Conversation { .. } => "conversation",
            Screen::DeleteConfirm => "delete_confirm",
            Screen::Promo => "promo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimConversation {
    pub recipient: String,
    pub last_message: Option<String>,
    pub draft: Option<String>,
}

/// What the simulated phone went through, for assertions and dry-run output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimReport {
    pub screen: &'static str,
    pub keyboard: bool,
    pub conversations: Vec<SimConversation>,
    pub sent: Vec<(String, String)>,
    pub send_actions: u32,
    pub draft_saves: u32,
    pub deletions: u32,
    pub launches: u32,
    pub dumps: usize,
    pub actions: Vec<DeviceAction>,
}

#[derive(Debug)]
struct PhoneModel {
    faults: SimFaults,
    stack: Vec<Screen>,
    keyboard: bool,
    promos_left: usize,
    ops: usize,
    report: SimReport,
}

impl PhoneModel {
    fn new(faults: SimFaults) -> Self {
        let report = SimReport {
            conversations: faults
                .pinned
                .iter()
                .map(|recipient| SimConversation {
                    recipient: recipient.clone(),
                    last_message: None,
                    draft: None,
                })
                .collect(),
            ..Default::default()
        };
        Self {
            promos_left: faults.promo_overlays,
            faults,
            stack: vec![Screen::Launcher],
            keyboard: false,
            ops: 0,
            report,
        }
    }

    fn is_pinned(&self, recipient: &str) -> bool {
        self.faults.pinned.iter().any(|p| p == recipient)
    }

    fn top(&self) -> &Screen {
        self.stack.last().unwrap_or(&LAUNCHER)
    }

    fn top_mut(&mut self) -> Option<&mut Screen> {
        self.stack.last_mut()
    }

    fn tick(&mut self) -> Result<(), DeviceError> {
        self.ops += 1;
        match self.faults.disconnect_after {
            Some(limit) if self.ops > limit => Err(DeviceError::Disconnected(format!(
                "error: device '{}' not found",
                SIM_SERIAL
            ))),
            _ => Ok(()),
        }
    }

    fn is_hidden(&self, id: &str) -> bool {
        self.faults.hidden.iter().any(|h| h == id)
    }

    fn is_unresponsive(&self, id: &str) -> bool {
        self.faults.unresponsive.iter().any(|h| h == id)
    }

    fn render(&self) -> UiTree {
        let mut nodes = vec![UiNode::new("", Bounds::new(0, 0, 1080, 2400))];
        let back = || {
            UiNode::new("", Bounds::new(0, 80, 160, 220))
                .with_desc(BACK_DESC)
                .clickable()
        };

        match self.top() {
            Screen::Launcher => {
                nodes.push(UiNode::new("com.android.launcher:id/workspace", Bounds::new(0, 0, 1080, 2400)));
            }
            Screen::ConversationList { selected } => {
                if selected.is_some() {
                    nodes.push(UiNode::new(DELETE_ACTION_ID, Bounds::new(900, 80, 1040, 220)).clickable());
                } else {
                    nodes.push(UiNode::new(START_CHAT_ID, Bounds::new(700, 2000, 1040, 2150)).with_text("Start chat").clickable());
                }
                for (i, convo) in self.report.conversations.iter().take(MAX_ROWS).enumerate() {
                    let top = 300 + (i as i32) * 200;
                    nodes.push(
                        UiNode::new(CONVERSATION_ROW_ID, Bounds::new(0, top, 1080, top + 200))
                            .with_text(&convo.recipient)
                            .clickable(),
                    );
                }
            }
            Screen::NewConversation { query, suggestions_shown } => {
                nodes.push(back());
                nodes.push(
                    UiNode::new(CONTACT_SEARCH_ID, Bounds::new(160, 80, 1080, 220))
                        .with_text(query)
                        .clickable(),
                );
                if *suggestions_shown {
                    nodes.push(UiNode::new(CONTACT_SUGGESTIONS_ID, Bounds::new(0, 300, 1080, 900)));
                    nodes.push(
                        UiNode::new(SUGGESTION_ROW_ID, Bounds::new(0, 300, 1080, 450))
                            .with_text(&format!("Send to {}", query))
                            .clickable(),
                    );
                }
            }
            Screen::Conversation { recipient, draft } => {
                nodes.push(back());
                nodes.push(UiNode::new("", Bounds::new(160, 80, 900, 220)).with_text(recipient));
                nodes.push(
                    UiNode::new(MESSAGE_TEXT_ID, Bounds::new(0, 2050, 900, 2200))
                        .with_text(draft)
                        .clickable(),
                );
                if !draft.is_empty() {
                    nodes.push(UiNode::new(SEND_ID, Bounds::new(900, 2050, 1080, 2200)).clickable());
                }
            }
            Screen::DeleteConfirm => {
                nodes.push(UiNode::new("", Bounds::new(100, 1000, 980, 1250)).with_text("Delete this conversation?"));
                nodes.push(UiNode::new(CANCEL_ID, Bounds::new(300, 1300, 580, 1400)).with_text("Cancel").clickable());
                nodes.push(UiNode::new(CONFIRM_ID, Bounds::new(600, 1300, 900, 1400)).with_text("Delete").clickable());
            }
            Screen::Promo => {
                nodes.push(UiNode::new("", Bounds::new(100, 800, 980, 1200)).with_text("Try the new chat features"));
                nodes.push(UiNode::new(PROMO_DISMISS_ID, Bounds::new(600, 1300, 900, 1400)).with_text("Got it").clickable());
            }
        }

        nodes.retain(|n| n.resource_id.is_empty() || !self.is_hidden(&n.resource_id));
        UiTree::new(nodes)
    }

    fn apply(&mut self, action: &DeviceAction) -> Result<(), DeviceError> {
        self.report.actions.push(action.clone());
        match action {
            DeviceAction::LaunchApp { package, activity } => {
                if package != MESSAGES_PACKAGE {
                    return Err(DeviceError::CommandFailed {
                        command: action.to_shell(),
                        detail: format!("Activity class {{{}/{}}} does not exist.", package, activity),
                    });
                }
                self.stack = vec![Screen::ConversationList { selected: None }];
                self.keyboard = false;
                self.report.launches += 1;
            }
            DeviceAction::Tap { x, y } => self.tap(Point { x: *x, y: *y }),
            DeviceAction::LongPress { x, y, .. } => self.long_press(Point { x: *x, y: *y }),
            DeviceAction::InputText { text } => self.type_text(text),
            DeviceAction::KeyEvents { keys } => {
                for key in keys {
                    self.key(*key);
                }
            }
        }
        Ok(())
    }

    fn tap(&mut self, p: Point) {
        let tree = self.render();
        let Some(node) = tree.hit_test(p).cloned() else { return };

        if node.content_desc == BACK_DESC {
            self.pop_screen();
            return;
        }
        match node.resource_id.as_str() {
            START_CHAT_ID => {
                if self.promos_left > 0 {
                    self.promos_left -= 1;
                    self.stack.push(Screen::Promo);
                } else {
                    self.stack.push(Screen::NewConversation {
                        query: String::new(),
                        suggestions_shown: false,
                    });
                    self.keyboard = true;
                }
            }
            CONTACT_SEARCH_ID | MESSAGE_TEXT_ID => self.keyboard = true,
            SUGGESTION_ROW_ID => {
                if let Some(Screen::NewConversation { query, .. }) = self.stack.last().cloned() {
                    self.open_conversation(query);
                }
            }
            SEND_ID => self.send(),
            DELETE_ACTION_ID => self.stack.push(Screen::DeleteConfirm),
            CONFIRM_ID => {
                self.stack.pop();
                let selected = match self.stack.last_mut() {
                    Some(Screen::ConversationList { selected }) => selected.take(),
                    _ => None,
                };
                if let Some(index) = selected.filter(|i| *i < self.report.conversations.len()) {
                    self.report.conversations.remove(index);
                    self.report.deletions += 1;
                }
            }
            CANCEL_ID | PROMO_DISMISS_ID => {
                self.stack.pop();
            }
            _ => {}
        }
    }

    fn long_press(&mut self, p: Point) {
        let tree = self.render();
        let Some(node) = tree.hit_test(p) else { return };
        if node.resource_id != CONVERSATION_ROW_ID {
            return;
        }
        let index = ((p.y - 300) / 200) as usize;
        if let Some(Screen::ConversationList { selected }) = self.top_mut() {
            *selected = Some(index);
        }
    }

    fn type_text(&mut self, text: &str) {
        if !self.keyboard {
            return;
        }
        let search_dead = self.is_unresponsive(CONTACT_SEARCH_ID);
        let compose_dead = self.is_unresponsive(MESSAGE_TEXT_ID);
        match self.top_mut() {
            Some(Screen::NewConversation { query, .. }) if !search_dead => query.push_str(text),
            Some(Screen::Conversation { draft, .. }) if !compose_dead => draft.push_str(text),
            _ => {}
        }
    }

    fn key(&mut self, key: Key) {
        match key {
            Key::Back => {
                if self.keyboard {
                    self.keyboard = false;
                    let has_draft = matches!(self.top(), Screen::Conversation { draft, .. } if !draft.is_empty());
                    if has_draft {
                        self.report.draft_saves += 1;
                    }
                } else {
                    self.pop_screen();
                }
            }
            Key::Enter => match self.top().clone() {
                Screen::NewConversation { query, suggestions_shown } if !query.is_empty() => {
                    if self.faults.suggestions && !suggestions_shown {
                        if let Some(Screen::NewConversation { suggestions_shown, .. }) = self.top_mut() {
                            *suggestions_shown = true;
                        }
                    } else {
                        self.open_conversation(query);
                    }
                }
                Screen::Conversation { draft, .. } if !draft.is_empty() => self.send(),
                _ => {}
            },
            Key::Del => {
                if !self.keyboard {
                    return;
                }
                match self.top_mut() {
                    Some(Screen::NewConversation { query, .. }) => {
                        query.pop();
                    }
                    Some(Screen::Conversation { draft, .. }) => {
                        draft.pop();
                    }
                    _ => {}
                }
            }
            Key::MoveEnd => {}
        }
    }

    fn open_conversation(&mut self, query: String) {
        let recipient = format!("+{}", query);
        let draft = self
            .report
            .conversations
            .iter()
            .find(|c| c.recipient == recipient)
            .and_then(|c| c.draft.clone())
            .unwrap_or_default();
        self.stack.push(Screen::Conversation { recipient, draft });
        self.keyboard = true;
    }

    fn send(&mut self) {
        let Some(Screen::Conversation { recipient, draft }) = self.top_mut() else { return };
        if draft.is_empty() {
            return;
        }
        let recipient = recipient.clone();
        let body = std::mem::take(draft);
        self.report.send_actions += 1;
        self.report.sent.push((recipient.clone(), body.clone()));
        self.touch_conversation(&recipient, Some(body), None);
    }

    fn pop_screen(&mut self) {
        let popped = self.stack.pop();
        self.keyboard = false;
        if let Some(Screen::Conversation { recipient, draft }) = popped {
            if !draft.is_empty() {
                self.touch_conversation(&recipient, None, Some(draft));
            }
        }
        if self.stack.is_empty() {
            self.stack.push(Screen::Launcher);
        }
    }

    /// Move (or insert) a conversation to the top of the list, below any
    /// pinned ones.
    fn touch_conversation(&mut self, recipient: &str, message: Option<String>, draft: Option<String>) {
        let mut convo = match self.report.conversations.iter().position(|c| c.recipient == recipient) {
            Some(i) => self.report.conversations.remove(i),
            None => SimConversation {
                recipient: recipient.to_string(),
                last_message: None,
                draft: None,
            },
        };
        if message.is_some() {
            convo.last_message = message;
            convo.draft = None;
        }
        if draft.is_some() {
            convo.draft = draft;
        }
        let top = if self.is_pinned(recipient) {
            0
        } else {
            self.report
                .conversations
                .iter()
                .take_while(|c| self.is_pinned(&c.recipient))
                .count()
        };
        self.report.conversations.insert(top, convo);
    }

    fn snapshot(&self) -> SimReport {
        let mut report = self.report.clone();
        report.screen = self.top().name();
        report.keyboard = self.keyboard;
        report
    }
}

fn lock(model: &Mutex<PhoneModel>) -> MutexGuard<'_, PhoneModel> {
    model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SimulatorConnector {
    model: Arc<Mutex<PhoneModel>>,
}

impl SimulatorConnector {
    pub fn new(faults: SimFaults) -> Self {
        Self {
            model: Arc::new(Mutex::new(PhoneModel::new(faults))),
        }
    }

    pub fn report(&self) -> SimReport {
        lock(&self.model).snapshot()
    }
}

#[async_trait]
impl Connector for SimulatorConnector {
    type Session = SimulatedDevice;

    async fn connect(&self, serial: Option<&str>) -> Result<SimulatedDevice, AgentError> {
        if lock(&self.model).faults.unreachable {
            return Err(AgentError::Connection("no devices/emulators found".to_string()));
        }
        if let Some(wanted) = serial {
            if wanted != SIM_SERIAL {
                return Err(AgentError::Connection(format!("device {} not found", wanted)));
            }
        }
        Ok(SimulatedDevice {
            model: Arc::clone(&self.model),
            serial: SIM_SERIAL.to_string(),
        })
    }
}

pub struct SimulatedDevice {
    model: Arc<Mutex<PhoneModel>>,
    serial: String,
}

#[async_trait]
impl DeviceSession for SimulatedDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn execute(&mut self, action: &DeviceAction) -> Result<(), DeviceError> {
        let mut model = lock(&self.model);
        model.tick()?;
        model.apply(action)
    }

    async fn dump_ui(&mut self) -> Result<UiTree, DeviceError> {
        let mut model = lock(&self.model);
        model.tick()?;
        model.report.dumps += 1;
        Ok(model.render())
    }
}
