//! User notification event for conversations.
//!
//! An event wraps a stored notification and the conversation it refers to.
//! Before it is shown, [`UserNotificationEvent::check_access`] re-checks that
//! the recipient can still read the conversation. When they cannot, the
//! check returns a [`RevocationCleanup`] that the caller applies through
//! [`NotificationStore::apply_revocation`]: the notification is deleted and
//! the recipient's cached notification count is reset in one step.

use chrono::NaiveDateTime;
use conversation_mail_core::{
    Actor, Conversation, GUEST_USER_ID, MailError, MailResult, UserNotification,
};
use conversation_mail_render::Language;
use serde::Serialize;
use tracing::{debug, warn};

use crate::link::{LinkBuilder, LinkParams};
use crate::message::{CONVERSATION_CONTROLLER, ConversationSource};

/// User-storage key caching a user's unread notification count.
pub const USER_NOTIFICATION_COUNT_KEY: &str = "userNotificationCount";

const PHRASE_TITLE: &str = "conversation.title";
const PHRASE_MESSAGE: &str = "conversation.message";
const PHRASE_MAIL: &str = "conversation.mail";

/// How a notification mail is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// One mail per notification.
    #[default]
    Instant,
    /// Part of a daily digest.
    Daily,
}

impl NotificationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Daily => "daily",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Self::Instant),
            "daily" => Ok(Self::Daily),
            other => Err(MailError::InvalidArgument(format!(
                "unknown notification type: {other}"
            ))),
        }
    }
}

/// The user who triggered a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAuthor {
    pub user_id: i64,
    pub username: String,
}

impl NotificationAuthor {
    #[must_use]
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    #[must_use]
    pub fn guest() -> Self {
        Self::new(GUEST_USER_ID, "Guest")
    }

    /// The author recorded on `notification`, resolved against the
    /// conversation starter.
    #[must_use]
    pub fn for_conversation(notification: &UserNotification, conversation: &Conversation) -> Self {
        match notification.author_id {
            Some(id) if id == conversation.user_id => Self::new(id, conversation.username.clone()),
            Some(id) => conversation
                .participant(id)
                .map_or_else(Self::guest, |p| Self::new(id, p.username.clone())),
            None => Self::guest(),
        }
    }
}

/// Result of the last access check of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessState {
    #[default]
    Unchecked,
    Granted,
    Revoked,
}

/// Cleanup owed after an access check failed.
#[must_use = "the notification and cached count stay stale unless the cleanup is applied"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationCleanup {
    /// Notification to delete.
    pub notification_id: i64,
    /// User whose storage value is reset.
    pub user_id: i64,
    /// User-storage key to reset.
    pub storage_key: &'static str,
}

/// Outcome of [`UserNotificationEvent::check_access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Revoked(RevocationCleanup),
}

impl AccessDecision {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// A renderable wrapper around a stored notification.
pub trait UserNotificationEvent {
    fn notification(&self) -> &UserNotification;
    fn author(&self) -> &NotificationAuthor;

    fn time(&self) -> NaiveDateTime {
        self.notification().time
    }

    fn is_confirmed(&self) -> bool {
        self.notification().confirmed
    }

    fn title(&self) -> MailResult<String>;

    fn email_title(&self) -> MailResult<String> {
        self.title()
    }

    /// HTML message for the notification list.
    fn message(&self) -> MailResult<String>;

    /// Plain-text mail body.
    fn email_message(&self, notification_type: NotificationType) -> MailResult<String>;

    fn link(&self, links: &dyn LinkBuilder) -> String;

    /// Checks whether `actor` may still see the notification's subject.
    ///
    /// Every call re-evaluates; nothing is remembered between renders.
    fn check_access(&mut self, actor: &Actor) -> AccessDecision;

    fn access_state(&self) -> AccessState;
}

#[derive(Serialize)]
struct PhraseContext<'a> {
    conversation: &'a Conversation,
    author: &'a NotificationAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_type: Option<NotificationType>,
}

/// Notification about a conversation the recipient was added to.
#[derive(Debug, Clone)]
pub struct ConversationNotificationEvent {
    notification: UserNotification,
    conversation: Conversation,
    author: NotificationAuthor,
    language: Language,
    state: AccessState,
}

impl ConversationNotificationEvent {
    /// Builds the event; `conversation` must be the notification's object.
    pub fn new(
        notification: UserNotification,
        conversation: Conversation,
        author: NotificationAuthor,
        language: Language,
    ) -> MailResult<Self> {
        if notification.object_id != conversation.id {
            return Err(MailError::ConversationMismatch {
                expected: notification.object_id,
                actual: conversation.id,
            });
        }
        Ok(Self {
            notification,
            conversation,
            author,
            language,
            state: AccessState::Unchecked,
        })
    }

    /// Loads the conversation of `notification` for its recipient.
    ///
    /// Returns `Ok(None)` when the conversation no longer exists.
    pub fn load(
        notification: UserNotification,
        conversations: &dyn ConversationSource,
        language: &Language,
    ) -> MailResult<Option<Self>> {
        let Some(conversation) =
            conversations.user_conversation(notification.object_id, notification.user_id)
        else {
            debug!(
                notification_id = notification.id,
                conversation_id = notification.object_id,
                "conversation of notification is gone"
            );
            return Ok(None);
        };
        let author = NotificationAuthor::for_conversation(&notification, &conversation);
        Self::new(notification, conversation, author, language.clone()).map(Some)
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn phrase_context(&self, notification_type: Option<NotificationType>) -> PhraseContext<'_> {
        PhraseContext {
            conversation: &self.conversation,
            author: &self.author,
            notification_type,
        }
    }
}

impl UserNotificationEvent for ConversationNotificationEvent {
    fn notification(&self) -> &UserNotification {
        &self.notification
    }

    fn author(&self) -> &NotificationAuthor {
        &self.author
    }

    fn title(&self) -> MailResult<String> {
        self.language.get(PHRASE_TITLE)
    }

    fn message(&self) -> MailResult<String> {
        self.language
            .get_dynamic_variable(PHRASE_MESSAGE, self.phrase_context(None))
    }

    fn email_message(&self, notification_type: NotificationType) -> MailResult<String> {
        self.language
            .get_dynamic_variable(PHRASE_MAIL, self.phrase_context(Some(notification_type)))
    }

    fn link(&self, links: &dyn LinkBuilder) -> String {
        links.link(
            CONVERSATION_CONTROLLER,
            &LinkParams::object(self.conversation.id, self.conversation.subject.as_str()),
        )
    }

    fn check_access(&mut self, actor: &Actor) -> AccessDecision {
        if self.conversation.can_read(actor.user_id) {
            self.state = AccessState::Granted;
            return AccessDecision::Granted;
        }
        self.state = AccessState::Revoked;
        debug!(
            notification_id = self.notification.id,
            conversation_id = self.conversation.id,
            user_id = actor.user_id,
            "conversation no longer visible, revoking notification"
        );
        AccessDecision::Revoked(RevocationCleanup {
            notification_id: self.notification.id,
            user_id: actor.user_id,
            storage_key: USER_NOTIFICATION_COUNT_KEY,
        })
    }

    fn access_state(&self) -> AccessState {
        self.state
    }
}

/// Storage of notifications and the per-user cached notification count.
pub trait NotificationStore {
    /// Notifications of `user_id`, oldest first.
    fn notifications_for(&self, user_id: i64) -> MailResult<Vec<UserNotification>>;

    /// Deletes the notification and resets the named user-storage value as
    /// one atomic unit. Returns whether a notification was deleted;
    /// re-applying a cleanup deletes nothing.
    fn apply_revocation(&self, cleanup: RevocationCleanup) -> MailResult<bool>;

    /// Unconfirmed notifications of `user_id`, served from the
    /// `userNotificationCount` user-storage value and recomputed on a miss.
    fn notification_count(&self, user_id: i64) -> MailResult<u64>;
}

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedNotification {
    pub notification_id: i64,
    pub title: String,
    pub message: String,
    pub link: String,
    pub author: String,
    pub time: NaiveDateTime,
    pub confirmed: bool,
}

/// The notification listing of a user.
///
/// Rendering prunes notifications whose subject the user can no longer see.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFeed;

impl NotificationFeed {
    /// Builds conversation events for all notifications of `actor`.
    pub fn load_events(
        actor: &Actor,
        store: &dyn NotificationStore,
        conversations: &dyn ConversationSource,
        language: &Language,
    ) -> MailResult<Vec<ConversationNotificationEvent>> {
        let mut events = Vec::new();
        for notification in store.notifications_for(actor.user_id)? {
            if let Some(event) = ConversationNotificationEvent::load(notification, conversations, language)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Checks access for each event, applies revocations and renders the
    /// events that remain visible to `actor`.
    pub fn render_for<E>(
        actor: &Actor,
        events: impl IntoIterator<Item = E>,
        store: &dyn NotificationStore,
        links: &dyn LinkBuilder,
    ) -> MailResult<Vec<RenderedNotification>>
    where
        E: UserNotificationEvent,
    {
        let mut rendered = Vec::new();
        for mut event in events {
            match event.check_access(actor) {
                AccessDecision::Granted => {}
                AccessDecision::Revoked(cleanup) => {
                    let notification_id = cleanup.notification_id;
                    if let Err(err) = store.apply_revocation(cleanup) {
                        warn!(
                            notification_id,
                            user_id = actor.user_id,
                            error = %err,
                            "failed to clean up revoked notification"
                        );
                    }
                    continue;
                }
            }

            rendered.push(RenderedNotification {
                notification_id: event.notification().id,
                title: event.title()?,
                message: event.message()?,
                link: event.link(links),
                author: event.author().username.clone(),
                time: event.time(),
                confirmed: event.is_confirmed(),
            });
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use conversation_mail_core::{HideState, Participant};

    use super::*;
    use crate::link::RouteLinkBuilder;

    fn conversation() -> Conversation {
        Conversation {
            id: 7,
            subject: "Tom & Jerry".to_string(),
            first_message_id: 1,
            user_id: 1,
            username: "alice".to_string(),
            participants: vec![Participant::new(1, "alice"), Participant::new(2, "bob")],
            ..Conversation::default()
        }
    }

    fn notification() -> UserNotification {
        UserNotification {
            id: 40,
            event_id: 1,
            object_id: 7,
            author_id: Some(1),
            user_id: 2,
            time: chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .unwrap()
                .naive_utc(),
            confirmed: false,
        }
    }

    fn event() -> ConversationNotificationEvent {
        let notification = notification();
        let conversation = conversation();
        let author = NotificationAuthor::for_conversation(&notification, &conversation);
        ConversationNotificationEvent::new(notification, conversation, author, Language::default())
            .unwrap()
    }

    #[test]
    fn mismatched_conversation_is_rejected() {
        let mut other = conversation();
        other.id = 8;
        let err = ConversationNotificationEvent::new(
            notification(),
            other,
            NotificationAuthor::guest(),
            Language::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MailError::ConversationMismatch { expected: 7, actual: 8 }));
    }

    #[test]
    fn author_resolution() {
        let conversation = conversation();
        let mut n = notification();
        assert_eq!(NotificationAuthor::for_conversation(&n, &conversation).username, "alice");
        n.author_id = Some(2);
        assert_eq!(NotificationAuthor::for_conversation(&n, &conversation).username, "bob");
        n.author_id = Some(99);
        assert_eq!(NotificationAuthor::for_conversation(&n, &conversation), NotificationAuthor::guest());
        n.author_id = None;
        assert_eq!(NotificationAuthor::for_conversation(&n, &conversation).user_id, GUEST_USER_ID);
    }

    #[test]
    fn phrases() {
        let event = event();
        assert_eq!(event.title().unwrap(), "New Conversation");
        assert_eq!(event.email_title().unwrap(), "New Conversation");

        let message = event.message().unwrap();
        assert!(message.contains("alice"));
        assert!(message.contains("Tom &amp; Jerry"));

        let daily = event.email_message(NotificationType::Daily).unwrap();
        assert_eq!(daily.trim(), "alice started a new conversation: Tom & Jerry");
        let instant = event.email_message(NotificationType::Instant).unwrap();
        assert!(instant.starts_with("Hello,"));
        assert!(instant.contains("with you: Tom & Jerry"));
    }

    #[test]
    fn link_targets_conversation() {
        let links = RouteLinkBuilder::new("https://forum.test", true);
        assert_eq!(event().link(&links), "https://forum.test/conversation/7-tom-jerry/");
    }

    #[test]
    fn participant_is_granted() {
        let mut event = event();
        assert_eq!(event.access_state(), AccessState::Unchecked);
        assert!(event.check_access(&Actor::new(2, "bob")).is_granted());
        assert_eq!(event.access_state(), AccessState::Granted);
    }

    #[test]
    fn non_reader_gets_cleanup() {
        let mut event = event();
        let decision = event.check_access(&Actor::new(3, "carol"));
        assert_eq!(
            decision,
            AccessDecision::Revoked(RevocationCleanup {
                notification_id: 40,
                user_id: 3,
                storage_key: USER_NOTIFICATION_COUNT_KEY,
            })
        );
        assert_eq!(event.access_state(), AccessState::Revoked);
    }

    #[test]
    fn access_is_rechecked_on_every_call() {
        let notification = notification();
        let mut conversation = conversation();
        conversation.participants[1].hide_state = HideState::Left;
        let mut event = ConversationNotificationEvent::new(
            notification,
            conversation,
            NotificationAuthor::guest(),
            Language::default(),
        )
        .unwrap();
        let bob = Actor::new(2, "bob");
        assert!(!event.check_access(&bob).is_granted());
        assert!(!event.check_access(&bob).is_granted());
        assert!(event.check_access(&Actor::new(1, "alice")).is_granted());
        assert!(!event.check_access(&Actor::guest()).is_granted());
    }

    struct FailingCleanupStore {
        attempts: std::cell::Cell<usize>,
    }

    impl NotificationStore for FailingCleanupStore {
        fn notifications_for(&self, _: i64) -> MailResult<Vec<UserNotification>> {
            Ok(vec![notification()])
        }

        fn apply_revocation(&self, _: RevocationCleanup) -> MailResult<bool> {
            self.attempts.set(self.attempts.get() + 1);
            Err(MailError::Storage("database is locked".to_string()))
        }

        fn notification_count(&self, _: i64) -> MailResult<u64> {
            Ok(1)
        }
    }

    #[test]
    fn failed_cleanup_hides_event_without_failing_feed() {
        let store = FailingCleanupStore {
            attempts: std::cell::Cell::new(0),
        };
        let links = RouteLinkBuilder::new("https://forum.test", true);

        let rendered =
            NotificationFeed::render_for(&Actor::new(3, "carol"), [event()], &store, &links).unwrap();
        assert!(rendered.is_empty());
        assert_eq!(store.attempts.get(), 1);

        let rendered =
            NotificationFeed::render_for(&Actor::new(2, "bob"), [event()], &store, &links).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(store.attempts.get(), 1);
    }

    #[test]
    fn notification_type_parsing() {
        assert_eq!("DAILY".parse::<NotificationType>().unwrap(), NotificationType::Daily);
        assert_eq!(NotificationType::default().to_string(), "instant");
        assert!("weekly".parse::<NotificationType>().is_err());
    }
}
