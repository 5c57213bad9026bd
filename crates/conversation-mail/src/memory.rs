//! In-memory backends for the storage traits.
//!
//! Each backend keeps its state behind a single `Mutex`; poisoned locks are
//! recovered rather than propagated. Used by tests, the CLI and embedders
//! without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use conversation_mail_core::{
    Attachment, Conversation, MailError, MailResult, MessageRow, UserNotification,
};
use conversation_mail_render::{EmbeddedAttachment, EmbeddedObjectSource};
use indexmap::IndexMap;
use tracing::debug;

use crate::attachment::AttachmentSource;
use crate::editor::{MessageStore, MessageUpdate, NewMessage};
use crate::link::{LinkBuilder, LinkParams, RouteLinkBuilder};
use crate::message::ConversationSource;
use crate::notification::{NotificationStore, RevocationCleanup, USER_NOTIFICATION_COUNT_KEY};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Conversations
// =============================================================================

/// Conversations keyed by id.
#[derive(Debug, Default)]
pub struct MemoryConversationSource {
    conversations: Mutex<IndexMap<i64, Conversation>>,
    lookups: AtomicUsize,
}

impl MemoryConversationSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation: Conversation) {
        lock(&self.conversations).insert(conversation.id, conversation);
    }

    pub fn remove(&self, conversation_id: i64) -> Option<Conversation> {
        lock(&self.conversations).shift_remove(&conversation_id)
    }

    /// Applies `f` to a stored conversation; returns false if it is unknown.
    pub fn modify(&self, conversation_id: i64, f: impl FnOnce(&mut Conversation)) -> bool {
        lock(&self.conversations)
            .get_mut(&conversation_id)
            .map(f)
            .is_some()
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl ConversationSource for MemoryConversationSource {
    fn user_conversation(&self, conversation_id: i64, _user_id: i64) -> Option<Conversation> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        lock(&self.conversations).get(&conversation_id).cloned()
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// Attachments in insertion order, with links built under a site base URL.
#[derive(Debug)]
pub struct MemoryAttachmentSource {
    attachments: Mutex<Vec<Attachment>>,
    links: RouteLinkBuilder,
}

impl MemoryAttachmentSource {
    #[must_use]
    pub fn new(links: RouteLinkBuilder) -> Self {
        Self {
            attachments: Mutex::new(Vec::new()),
            links,
        }
    }

    pub fn insert(&self, attachment: Attachment) {
        let mut attachments = lock(&self.attachments);
        attachments.retain(|a| a.id != attachment.id);
        attachments.push(attachment);
    }

    fn embedded(&self, attachment: &Attachment) -> EmbeddedAttachment {
        let params = LinkParams::object(attachment.id, "");
        let url = self.links.link("Attachment", &params);
        let thumbnail_url = attachment
            .is_image
            .then(|| self.links.link("Attachment", &params.with_query("thumbnail", 1)));
        EmbeddedAttachment {
            id: attachment.id,
            filename: attachment.filename.clone(),
            url,
            thumbnail_url,
            is_image: attachment.is_image,
        }
    }
}

impl AttachmentSource for MemoryAttachmentSource {
    fn attachments(&self, object_type: &str, object_ids: &[i64]) -> MailResult<Vec<Attachment>> {
        Ok(lock(&self.attachments)
            .iter()
            .filter(|a| a.object_type == object_type && object_ids.contains(&a.object_id))
            .cloned()
            .collect())
    }
}

impl EmbeddedObjectSource for MemoryAttachmentSource {
    fn attachment(
        &self,
        object_type: &str,
        object_id: i64,
        attachment_id: i64,
    ) -> Option<EmbeddedAttachment> {
        let attachments = lock(&self.attachments);
        attachments
            .iter()
            .find(|a| a.id == attachment_id && a.object_type == object_type && a.object_id == object_id)
            .map(|a| self.embedded(a))
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Default)]
struct NotificationState {
    notifications: IndexMap<i64, UserNotification>,
    /// `(user_id, key)` → value.
    user_storage: HashMap<(i64, String), String>,
    deletes: usize,
    resets: usize,
}

impl NotificationState {
    fn reset_storage(&mut self, user_id: i64, key: &str) {
        self.user_storage.remove(&(user_id, key.to_string()));
        self.resets += 1;
    }
}

/// Notifications and user storage under one lock.
#[derive(Debug, Default)]
pub struct MemoryNotificationBackend {
    state: Mutex<NotificationState>,
}

impl MemoryNotificationBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a notification; the recipient's cached count is reset.
    pub fn insert(&self, notification: UserNotification) {
        let mut state = lock(&self.state);
        let user_id = notification.user_id;
        state.notifications.insert(notification.id, notification);
        state.reset_storage(user_id, USER_NOTIFICATION_COUNT_KEY);
    }

    #[must_use]
    pub fn contains(&self, notification_id: i64) -> bool {
        lock(&self.state).notifications.contains_key(&notification_id)
    }

    #[must_use]
    pub fn user_storage_value(&self, user_id: i64, key: &str) -> Option<String> {
        lock(&self.state)
            .user_storage
            .get(&(user_id, key.to_string()))
            .cloned()
    }

    /// Number of notifications deleted so far.
    #[must_use]
    pub fn deletes(&self) -> usize {
        lock(&self.state).deletes
    }

    /// Number of user-storage resets so far.
    #[must_use]
    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }
}

impl NotificationStore for MemoryNotificationBackend {
    fn notifications_for(&self, user_id: i64) -> MailResult<Vec<UserNotification>> {
        let mut notifications: Vec<_> = lock(&self.state)
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by_key(|n| (n.time, n.id));
        Ok(notifications)
    }

    fn apply_revocation(&self, cleanup: RevocationCleanup) -> MailResult<bool> {
        let mut state = lock(&self.state);
        let deleted = state
            .notifications
            .shift_remove(&cleanup.notification_id)
            .is_some();
        if deleted {
            state.deletes += 1;
        }
        state.reset_storage(cleanup.user_id, cleanup.storage_key);
        debug!(
            notification_id = cleanup.notification_id,
            user_id = cleanup.user_id,
            deleted,
            "revocation applied"
        );
        Ok(deleted)
    }

    fn notification_count(&self, user_id: i64) -> MailResult<u64> {
        let mut state = lock(&self.state);
        let key = (user_id, USER_NOTIFICATION_COUNT_KEY.to_string());
        if let Some(cached) = state.user_storage.get(&key) {
            return cached.parse().map_err(|_| {
                MailError::Storage(format!("corrupt {USER_NOTIFICATION_COUNT_KEY} for user {user_id}"))
            });
        }
        let count = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.confirmed)
            .count() as u64;
        state.user_storage.insert(key, count.to_string());
        Ok(count)
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Default)]
struct MessageState {
    rows: IndexMap<i64, MessageRow>,
    last_id: i64,
}

/// Message rows with sequential ids.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    state: Mutex<MessageState>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert(&self, message: NewMessage) -> MailResult<MessageRow> {
        let mut state = lock(&self.state);
        state.last_id += 1;
        let row = MessageRow {
            id: state.last_id,
            conversation_id: message.conversation_id,
            user_id: message.user_id,
            username: message.username,
            message: message.message,
            time: message.time.unwrap_or_else(|| Utc::now().naive_utc()),
            attachments: message.attachments,
            enable_smilies: message.enable_smilies,
            enable_html: message.enable_html,
            enable_bbcodes: message.enable_bbcodes,
        };
        state.rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn get(&self, message_id: i64) -> MailResult<Option<MessageRow>> {
        Ok(lock(&self.state).rows.get(&message_id).cloned())
    }

    fn update(&self, message_id: i64, update: &MessageUpdate) -> MailResult<MessageRow> {
        let mut state = lock(&self.state);
        let row = state
            .rows
            .get_mut(&message_id)
            .ok_or(MailError::MessageNotFound(message_id))?;
        update.apply(row);
        Ok(row.clone())
    }

    fn delete(&self, message_ids: &[i64]) -> MailResult<usize> {
        let mut state = lock(&self.state);
        Ok(message_ids
            .iter()
            .filter(|id| state.rows.shift_remove(*id).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: i64, user_id: i64, confirmed: bool) -> UserNotification {
        UserNotification {
            id,
            event_id: 1,
            object_id: 7,
            author_id: Some(1),
            user_id,
            time: Utc::now().naive_utc(),
            confirmed,
        }
    }

    #[test]
    fn notification_count_is_cached_until_reset() {
        let backend = MemoryNotificationBackend::new();
        backend.insert(notification(1, 2, false));
        backend.insert(notification(2, 2, true));
        backend.insert(notification(3, 5, false));

        assert_eq!(backend.notification_count(2).unwrap(), 1);
        assert_eq!(
            backend.user_storage_value(2, USER_NOTIFICATION_COUNT_KEY).as_deref(),
            Some("1")
        );

        backend.insert(notification(4, 2, false));
        assert!(backend.user_storage_value(2, USER_NOTIFICATION_COUNT_KEY).is_none());
        assert_eq!(backend.notification_count(2).unwrap(), 2);
    }

    #[test]
    fn revocation_deletes_once_and_resets_each_time() {
        let backend = MemoryNotificationBackend::new();
        backend.insert(notification(1, 2, false));
        backend.notification_count(2).unwrap();
        let resets_before = backend.resets();

        let cleanup = RevocationCleanup {
            notification_id: 1,
            user_id: 2,
            storage_key: USER_NOTIFICATION_COUNT_KEY,
        };
        assert!(backend.apply_revocation(cleanup.clone()).unwrap());
        assert!(!backend.contains(1));
        assert!(backend.user_storage_value(2, USER_NOTIFICATION_COUNT_KEY).is_none());

        assert!(!backend.apply_revocation(cleanup).unwrap());
        assert_eq!(backend.deletes(), 1);
        assert_eq!(backend.resets(), resets_before + 2);
    }

    #[test]
    fn corrupt_cached_count_is_storage_error() {
        let backend = MemoryNotificationBackend::new();
        lock(&backend.state)
            .user_storage
            .insert((2, USER_NOTIFICATION_COUNT_KEY.to_string()), "many".to_string());
        let err = backend.notification_count(2).unwrap_err();
        assert_eq!(err.error_type(), "STORAGE_ERROR");
    }

    #[test]
    fn message_store_crud() {
        let store = MemoryMessageStore::new();
        let first = store.insert(NewMessage::new(7, 1, "alice", "one")).unwrap();
        let second = store.insert(NewMessage::new(7, 1, "alice", "two")).unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let update = MessageUpdate {
            message: Some("uno".to_string()),
            ..MessageUpdate::default()
        };
        assert_eq!(store.update(1, &update).unwrap().message, "uno");
        assert!(matches!(
            store.update(9, &update),
            Err(MailError::MessageNotFound(9))
        ));

        assert_eq!(store.delete(&[1, 9]).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(1).unwrap().is_none());
    }

    #[test]
    fn embedded_attachments_are_scoped_to_their_object() {
        let source = MemoryAttachmentSource::new(RouteLinkBuilder::new("https://forum.test", true));
        source.insert(Attachment {
            id: 3,
            object_type: "test.message".to_string(),
            object_id: 7,
            filename: "cat.png".to_string(),
            is_image: true,
            ..Attachment::default()
        });

        let embedded = source.attachment("test.message", 7, 3).unwrap();
        assert_eq!(embedded.url, "https://forum.test/attachment/3/");
        assert_eq!(
            embedded.thumbnail_url.as_deref(),
            Some("https://forum.test/attachment/3/?thumbnail=1")
        );
        assert!(source.attachment("test.message", 8, 3).is_none());
        assert!(source.attachment("other", 7, 3).is_none());
    }

    #[test]
    fn conversation_source_counts_lookups() {
        let source = MemoryConversationSource::new();
        source.insert(Conversation {
            id: 7,
            ..Conversation::default()
        });
        assert!(source.user_conversation(7, 1).is_some());
        assert!(source.user_conversation(8, 1).is_none());
        assert_eq!(source.lookups(), 2);
        assert!(source.modify(7, |c| c.is_closed = true));
        assert!(source.user_conversation(7, 1).is_some_and(|c| c.is_closed));
        assert!(source.remove(7).is_some());
    }
}
