//! Conversation messages and conversation notifications
//!
//! This crate provides:
//! - The message entity (`ConversationMessage`): rendering, excerpts, mail text,
//!   attachments, edit permission, titles and links
//! - The conversation notification event with its self-healing access check
//! - Message editing (`ConversationMessageEditor`)
//! - In-memory backends for conversations, attachments, notifications and messages

#![forbid(unsafe_code)]

pub mod attachment;
pub mod editor;
pub mod link;
pub mod memory;
pub mod message;
pub mod notification;

pub use attachment::{AttachmentPermissions, AttachmentSource, GroupedAttachmentList};
pub use editor::{ConversationMessageEditor, MessageStore, MessageUpdate, NewMessage};
pub use link::{LinkBuilder, LinkParams, RouteLinkBuilder, slugify};
pub use memory::{
    MemoryAttachmentSource, MemoryConversationSource, MemoryMessageStore,
    MemoryNotificationBackend,
};
pub use message::{
    CONVERSATION_CONTROLLER, ConversationMessage, ConversationSource, MESSAGE_OBJECT_TYPE,
    MessageContent,
};
pub use notification::{
    AccessDecision, AccessState, ConversationNotificationEvent, NotificationAuthor,
    NotificationFeed, NotificationStore, NotificationType, RenderedNotification,
    RevocationCleanup, USER_NOTIFICATION_COUNT_KEY, UserNotificationEvent,
};

pub use conversation_mail_core::{Config, MailError, MailResult};
pub use conversation_mail_render::{Language, MessageParser};
