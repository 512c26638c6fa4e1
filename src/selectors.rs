//! Descriptors for the Google Messages UI.
//!
//! This is the contract with the target app. When its layout changes, bump
//! [`UI_CONTRACT_VERSION`] and update the selectors here; nothing else in the
//! crate knows resource ids or labels.

use crate::locator::{Descriptor, Selector};

pub const UI_CONTRACT_VERSION: &str = "google-messages/2025.1";

pub const MESSAGES_PACKAGE: &str = "com.google.android.apps.messaging";
pub const CONVERSATION_LIST_ACTIVITY: &str = ".ui.ConversationListActivity";

pub const START_CHAT_ID: &str = "com.google.android.apps.messaging:id/start_chat_fab";
pub const CONTACT_SEARCH_ID: &str = "ContactSearchField";
pub const CONTACT_SUGGESTIONS_ID: &str = "ContactSuggestionList";
pub const MESSAGE_TEXT_ID: &str = "message_text";
pub const SEND_ID: &str = "Compose:Draft:Send";
pub const CONVERSATION_ROW_ID: &str = "com.google.android.apps.messaging:id/swipeableContainer";
pub const DELETE_ACTION_ID: &str = "com.google.android.apps.messaging:id/action_delete";
pub const CONFIRM_ID: &str = "android:id/button1";
pub const BACK_DESC: &str = "Back";

fn id(value: &str) -> Descriptor {
    Descriptor::ResourceId(value.to_string())
}

/// Floating "Start chat" button on the conversation list. Its presence
/// defines the Baseline screen.
pub fn start_chat() -> Selector {
    Selector::new("start_chat", id(START_CHAT_ID)).or(Descriptor::TextContains("Start chat".into()))
}

pub fn contact_search() -> Selector {
    Selector::new("contact_search", id(CONTACT_SEARCH_ID))
}

pub fn contact_suggestions() -> Selector {
    Selector::new("contact_suggestions", id(CONTACT_SUGGESTIONS_ID))
}

/// The suggestion row for `destination` (E.164): matched on its last ten
/// digits, or the generic "Send to" row. Scoped to the suggestion list, since
/// the address field above it echoes the same digits.
pub fn suggestion_for(destination: &str) -> Selector {
    Selector::new(
        "contact_suggestion",
        Descriptor::ClickableTextAny(vec![last_digits(destination, 10), "Send to".to_string()]),
    )
    .within(CONTACT_SUGGESTIONS_ID)
}

pub fn compose_field() -> Selector {
    Selector::new("compose_field", id(MESSAGE_TEXT_ID))
}

pub fn send_button() -> Selector {
    Selector::new("send_button", id(SEND_ID))
}

pub fn navigate_back() -> Selector {
    Selector::new("navigate_back", Descriptor::DescContains(BACK_DESC.into()))
}

/// The row showing `destination`, else the newest row.
pub fn conversation_row_for(destination: &str) -> Selector {
    Selector::new(
        "conversation_row",
        Descriptor::ResourceIdWithText {
            id: CONVERSATION_ROW_ID.to_string(),
            needle: last_digits(destination, 10),
        },
    )
    .or(id(CONVERSATION_ROW_ID))
}

pub fn delete_action() -> Selector {
    Selector::new("delete_action", id(DELETE_ACTION_ID))
}

pub fn confirm_button() -> Selector {
    Selector::new("confirm_button", id(CONFIRM_ID))
}

pub fn last_digits(value: &str, n: usize) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(n);
    digits[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{ElementLocator, TreeLocator};
    use crate::ui_tree::{Bounds, UiNode, UiTree};

    #[test]
    fn test_last_digits() {
        assert_eq!(last_digits("+1 (415) 555-0100", 10), "4155550100");
        assert_eq!(last_digits("+4412", 10), "4412");
    }

    #[test]
    fn test_start_chat_has_text_fallback() {
        assert_eq!(start_chat().descriptors.len(), 2);
    }

    #[test]
    fn test_suggestion_ignores_address_field() {
        let tree = UiTree::new(vec![
            UiNode::new(CONTACT_SEARCH_ID, Bounds::new(160, 80, 1080, 220))
                .with_text("14155550100")
                .clickable(),
            UiNode::new(CONTACT_SUGGESTIONS_ID, Bounds::new(0, 300, 1080, 900)),
            UiNode::new("", Bounds::new(0, 300, 1080, 450))
                .with_text("Send to 14155550100")
                .clickable(),
        ]);
        let found = TreeLocator.find(&tree, &suggestion_for("+14155550100")).unwrap();
        assert_eq!(found.text(), "Send to 14155550100");
    }

    #[test]
    fn test_conversation_row_prefers_recipient() {
        let tree = UiTree::new(vec![
            UiNode::new(CONVERSATION_ROW_ID, Bounds::new(0, 300, 1080, 500)).with_text("+15559999"),
            UiNode::new(CONVERSATION_ROW_ID, Bounds::new(0, 500, 1080, 700)).with_text("+15550100"),
        ]);
        let row = TreeLocator.find(&tree, &conversation_row_for("+15550100")).unwrap();
        assert_eq!(row.text(), "+15550100");
        let fallback = TreeLocator.find(&tree, &conversation_row_for("+15551234")).unwrap();
        assert_eq!(fallback.text(), "+15559999");
    }
}
