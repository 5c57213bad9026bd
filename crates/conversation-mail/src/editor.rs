//! Create, update and delete conversation messages.

use chrono::NaiveDateTime;
use conversation_mail_core::{MailError, MailResult, MessageRow};
use tracing::debug;

use crate::message::ConversationMessage;

/// Fields of a message to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    /// Defaults to now.
    pub time: Option<NaiveDateTime>,
    pub attachments: u32,
    pub enable_smilies: bool,
    pub enable_html: bool,
    pub enable_bbcodes: bool,
}

impl NewMessage {
    #[must_use]
    pub fn new(
        conversation_id: i64,
        user_id: i64,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let defaults = MessageRow::default();
        Self {
            conversation_id,
            user_id,
            username: username.into(),
            message: message.into(),
            time: None,
            attachments: 0,
            enable_smilies: defaults.enable_smilies,
            enable_html: defaults.enable_html,
            enable_bbcodes: defaults.enable_bbcodes,
        }
    }

    fn validate(&self) -> MailResult<()> {
        if self.conversation_id <= 0 {
            return Err(MailError::InvalidArgument(format!(
                "invalid conversation id: {}",
                self.conversation_id
            )));
        }
        if self.message.trim().is_empty() {
            return Err(MailError::InvalidArgument(
                "message body must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Changed fields of a message; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageUpdate {
    pub message: Option<String>,
    pub attachments: Option<u32>,
    pub enable_smilies: Option<bool>,
    pub enable_html: Option<bool>,
    pub enable_bbcodes: Option<bool>,
}

impl MessageUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.attachments.is_none()
            && self.enable_smilies.is_none()
            && self.enable_html.is_none()
            && self.enable_bbcodes.is_none()
    }

    /// Writes the set fields into `row`.
    pub fn apply(&self, row: &mut MessageRow) {
        if let Some(message) = &self.message {
            row.message.clone_from(message);
        }
        if let Some(attachments) = self.attachments {
            row.attachments = attachments;
        }
        if let Some(v) = self.enable_smilies {
            row.enable_smilies = v;
        }
        if let Some(v) = self.enable_html {
            row.enable_html = v;
        }
        if let Some(v) = self.enable_bbcodes {
            row.enable_bbcodes = v;
        }
    }
}

/// Persistent storage of message rows.
pub trait MessageStore {
    /// Inserts a message and returns the stored row with its new id.
    fn insert(&self, message: NewMessage) -> MailResult<MessageRow>;
    fn get(&self, message_id: i64) -> MailResult<Option<MessageRow>>;
    /// Applies `update` and returns the updated row.
    fn update(&self, message_id: i64, update: &MessageUpdate) -> MailResult<MessageRow>;
    /// Deletes the given messages; returns how many existed.
    fn delete(&self, message_ids: &[i64]) -> MailResult<usize>;
}

/// Write access to one message.
pub struct ConversationMessageEditor<'s> {
    store: &'s dyn MessageStore,
    message: ConversationMessage,
}

impl std::fmt::Debug for ConversationMessageEditor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMessageEditor")
            .field("message_id", &self.message.id())
            .finish_non_exhaustive()
    }
}

impl<'s> ConversationMessageEditor<'s> {
    #[must_use]
    pub const fn new(store: &'s dyn MessageStore, message: ConversationMessage) -> Self {
        Self { store, message }
    }

    /// Inserts `message` and returns an editor for the stored row.
    pub fn create(store: &'s dyn MessageStore, message: NewMessage) -> MailResult<Self> {
        message.validate()?;
        let row = store.insert(message)?;
        debug!(
            message_id = row.id,
            conversation_id = row.conversation_id,
            "conversation message created"
        );
        Ok(Self::new(store, ConversationMessage::new(row)))
    }

    /// Opens an editor for the stored message `message_id`.
    pub fn load(store: &'s dyn MessageStore, message_id: i64) -> MailResult<Self> {
        let row = store
            .get(message_id)?
            .ok_or(MailError::MessageNotFound(message_id))?;
        Ok(Self::new(store, ConversationMessage::new(row)))
    }

    #[must_use]
    pub const fn message(&self) -> &ConversationMessage {
        &self.message
    }

    #[must_use]
    pub fn into_message(self) -> ConversationMessage {
        self.message
    }

    /// Stores `update` and refreshes the wrapped message.
    pub fn update(&mut self, update: &MessageUpdate) -> MailResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        if update
            .message
            .as_deref()
            .is_some_and(|body| body.trim().is_empty())
        {
            return Err(MailError::InvalidArgument(
                "message body must not be empty".to_string(),
            ));
        }
        let row = self.store.update(self.message.id(), update)?;
        self.message.replace_row(row);
        debug!(message_id = self.message.id(), "conversation message updated");
        Ok(())
    }

    /// Deletes the message.
    pub fn delete(self) -> MailResult<()> {
        Self::delete_all(self.store, &[self.message.id()]).map(|_| ())
    }

    /// Deletes several messages; returns how many existed.
    pub fn delete_all(store: &dyn MessageStore, message_ids: &[i64]) -> MailResult<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let deleted = store.delete(message_ids)?;
        debug!(requested = message_ids.len(), deleted, "conversation messages deleted");
        Ok(deleted)
    }
}
