//! Data models for Conversation Mail
//!
//! These models mirror the stored rows of the forum's conversation tables.
//! All datetime fields use naive UTC.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// User id of a guest (not logged in).
pub const GUEST_USER_ID: i64 = 0;

/// Permission that allows editing own messages outside of drafts.
pub const PERMISSION_EDIT_MESSAGE: &str = "user.conversation.canEditMessage";

// =============================================================================
// Conversation
// =============================================================================

/// Whether a participant hid the conversation from their list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HideState {
    #[default]
    Visible,
    /// Hidden from the list; reappears on new replies.
    Hidden,
    /// Left permanently; the conversation is no longer readable.
    Left,
}

/// A participant of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub hide_state: HideState,
}

impl Participant {
    #[must_use]
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            hide_state: HideState::Visible,
        }
    }
}

/// A conversation: a private thread between a starter and its participants.
///
/// # Visibility
/// - guests never read
/// - drafts are readable by their starter only
/// - otherwise the reader must be a participant who has not left
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub subject: String,
    pub first_message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub time: NaiveDateTime,
    pub is_draft: bool,
    pub is_closed: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl Conversation {
    /// Returns true if `user_id` may read this conversation.
    #[must_use]
    pub fn can_read(&self, user_id: i64) -> bool {
        if user_id == GUEST_USER_ID {
            return false;
        }
        if self.is_draft {
            return self.user_id == user_id;
        }
        self.participant(user_id)
            .is_some_and(|p| p.hide_state != HideState::Left)
    }

    #[must_use]
    pub fn participant(&self, user_id: i64) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: 0,
            subject: String::new(),
            first_message_id: 0,
            user_id: GUEST_USER_ID,
            username: String::new(),
            time: chrono::Utc::now().naive_utc(),
            is_draft: false,
            is_closed: false,
            participants: Vec::new(),
        }
    }
}

// =============================================================================
// Message
// =============================================================================

/// A stored conversation message.
///
/// The three `enable_*` flags control how the body is parsed.
/// `attachments` is the number of attachments recorded for the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub time: NaiveDateTime,
    pub attachments: u32,
    pub enable_smilies: bool,
    pub enable_html: bool,
    pub enable_bbcodes: bool,
}

impl Default for MessageRow {
    fn default() -> Self {
        Self {
            id: 0,
            conversation_id: 0,
            user_id: GUEST_USER_ID,
            username: String::new(),
            message: String::new(),
            time: chrono::Utc::now().naive_utc(),
            attachments: 0,
            enable_smilies: true,
            enable_html: false,
            enable_bbcodes: true,
        }
    }
}

// =============================================================================
// Attachment
// =============================================================================

/// A file uploaded to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    /// Owner object type, e.g. `com.woltlab.wcf.conversation.message`.
    pub object_type: String,
    pub object_id: i64,
    pub user_id: i64,
    pub filename: String,
    pub filesize: u64,
    pub file_type: String,
    pub is_image: bool,
    pub width: u32,
    pub height: u32,
    pub downloads: u64,
    pub show_order: i32,
    pub upload_time: NaiveDateTime,
}

impl Default for Attachment {
    fn default() -> Self {
        Self {
            id: 0,
            object_type: String::new(),
            object_id: 0,
            user_id: GUEST_USER_ID,
            filename: String::new(),
            filesize: 0,
            file_type: "application/octet-stream".to_string(),
            is_image: false,
            width: 0,
            height: 0,
            downloads: 0,
            show_order: 0,
            upload_time: chrono::Utc::now().naive_utc(),
        }
    }
}

// =============================================================================
// UserNotification
// =============================================================================

/// A stored notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotification {
    pub id: i64,
    pub event_id: i64,
    /// Id of the object the notification refers to (a conversation id here).
    pub object_id: i64,
    pub author_id: Option<i64>,
    pub user_id: i64,
    pub time: NaiveDateTime,
    pub confirmed: bool,
}

// =============================================================================
// Actor
// =============================================================================

/// The user a request is executed for, with the session's granted permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
    permissions: BTreeSet<String>,
}

impl Actor {
    #[must_use]
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            permissions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn guest() -> Self {
        Self::new(GUEST_USER_ID, "")
    }

    /// Grants a permission, builder style.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    #[must_use]
    pub const fn is_guest(&self) -> bool {
        self.user_id == GUEST_USER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(is_draft: bool) -> Conversation {
        Conversation {
            id: 1,
            subject: "Hello".into(),
            first_message_id: 10,
            user_id: 5,
            username: "alice".into(),
            is_draft,
            participants: vec![Participant::new(5, "alice"), Participant::new(6, "bob")],
            ..Default::default()
        }
    }

    #[test]
    fn guests_never_read() {
        assert!(!conversation(false).can_read(GUEST_USER_ID));
    }

    #[test]
    fn drafts_only_readable_by_starter() {
        let c = conversation(true);
        assert!(c.can_read(5));
        assert!(!c.can_read(6));
    }

    #[test]
    fn participants_read_until_they_leave() {
        let mut c = conversation(false);
        assert!(c.can_read(6));
        assert!(!c.can_read(7));

        c.participants[1].hide_state = HideState::Hidden;
        assert!(c.can_read(6), "hidden conversations stay readable");

        c.participants[1].hide_state = HideState::Left;
        assert!(!c.can_read(6));
    }

    #[test]
    fn actor_permissions() {
        let actor = Actor::new(3, "carol").with_permission(PERMISSION_EDIT_MESSAGE);
        assert!(actor.has_permission(PERMISSION_EDIT_MESSAGE));
        assert!(!actor.has_permission("admin.general.canUseAcp"));
        assert!(!actor.is_guest());
        assert!(Actor::guest().is_guest());
    }

    #[test]
    fn hide_state_serializes_snake_case() {
        let json = serde_json::to_string(&HideState::Left).unwrap();
        assert_eq!(json, "\"left\"");
    }
}
