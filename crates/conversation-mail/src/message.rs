//! The conversation message entity and its rendering contract.
//!
//! A message renders its body through a shared [`MessageParser`]; the
//! embedded-object context (this message's id) is passed with each call.
//! The parent conversation is looked up once per instance and cached.

use std::cell::OnceCell;

use chrono::NaiveDateTime;
use conversation_mail_core::{
    Actor, Config, Conversation, MailError, MailResult, MessageRow, PERMISSION_EDIT_MESSAGE,
};
use conversation_mail_render::{
    EmbedContext, EmbeddedObjectSource, HELLIP, MessageParser, OutputType, ParseOptions,
    decode_html, strip_html, truncate_html,
};

use crate::attachment::{AttachmentPermissions, AttachmentSource, GroupedAttachmentList};
use crate::link::{LinkBuilder, LinkParams};

/// Object type of conversation messages for attachments and embedded objects.
pub const MESSAGE_OBJECT_TYPE: &str = "com.woltlab.wcf.conversation.message";

/// Controller name of the conversation page.
pub const CONVERSATION_CONTROLLER: &str = "Conversation";

/// Looks up conversations.
pub trait ConversationSource {
    /// The conversation `conversation_id` as loaded for `user_id`.
    ///
    /// Returns the conversation whether or not the user may read it; callers
    /// decide visibility with [`Conversation::can_read`].
    fn user_conversation(&self, conversation_id: i64, user_id: i64) -> Option<Conversation>;
}

/// Accessors shared by all message-like objects.
pub trait MessageContent {
    /// The raw, unparsed body.
    fn message(&self) -> &str;
    fn time(&self) -> NaiveDateTime;
    fn user_id(&self) -> i64;
    fn username(&self) -> &str;

    fn is_visible(&self) -> bool {
        true
    }
}

/// A message of a conversation.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    row: MessageRow,
    conversation: OnceCell<Conversation>,
}

impl From<MessageRow> for ConversationMessage {
    fn from(row: MessageRow) -> Self {
        Self::new(row)
    }
}

impl ConversationMessage {
    #[must_use]
    pub const fn new(row: MessageRow) -> Self {
        Self {
            row,
            conversation: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.row.id
    }

    #[must_use]
    pub const fn conversation_id(&self) -> i64 {
        self.row.conversation_id
    }

    #[must_use]
    pub const fn row(&self) -> &MessageRow {
        &self.row
    }

    #[must_use]
    pub fn into_row(self) -> MessageRow {
        self.row
    }

    #[must_use]
    pub const fn has_attachments(&self) -> bool {
        self.row.attachments > 0
    }

    /// Replaces the stored row, keeping the cached conversation.
    pub(crate) fn replace_row(&mut self, row: MessageRow) {
        debug_assert_eq!(row.conversation_id, self.row.conversation_id);
        self.row = row;
    }

    #[must_use]
    pub const fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            enable_smilies: self.row.enable_smilies,
            enable_html: self.row.enable_html,
            enable_bbcodes: self.row.enable_bbcodes,
        }
    }

    /// Full HTML rendering, with inline attachments resolved through `embedded`.
    #[must_use]
    pub fn formatted_message(
        &self,
        parser: &MessageParser,
        embedded: &dyn EmbeddedObjectSource,
    ) -> String {
        let ctx = EmbedContext {
            object_type: MESSAGE_OBJECT_TYPE,
            object_id: self.row.id,
            source: embedded,
        };
        parser.parse(
            &self.row.message,
            self.parse_options(),
            OutputType::Html,
            Some(&ctx),
        )
    }

    /// Reduced HTML for excerpts and mail.
    #[must_use]
    pub fn simplified_formatted_message(&self, parser: &MessageParser) -> String {
        parser.parse(
            &self.row.message,
            self.parse_options(),
            OutputType::SimplifiedHtml,
            None,
        )
    }

    /// The simplified rendering cut to `max_length` rendered characters.
    #[must_use]
    pub fn excerpt(&self, parser: &MessageParser, max_length: usize) -> String {
        truncate_html(
            &self.simplified_formatted_message(parser),
            max_length,
            HELLIP,
            false,
        )
    }

    /// Plain text for mail bodies: simplified rendering without tags and entities.
    #[must_use]
    pub fn mail_text(&self, parser: &MessageParser) -> String {
        decode_html(&strip_html(&self.simplified_formatted_message(parser)))
    }

    /// The message's attachments, or `None` when the attachment module is
    /// disabled or the message has none.
    pub fn attachments(
        &self,
        config: &Config,
        source: &dyn AttachmentSource,
    ) -> MailResult<Option<GroupedAttachmentList>> {
        if !config.module_attachment || !self.has_attachments() {
            return Ok(None);
        }
        let mut list = GroupedAttachmentList::new(MESSAGE_OBJECT_TYPE).object_ids([self.row.id]);
        list.read_objects(source)?;
        list.set_permissions(AttachmentPermissions::ALL);
        Ok(Some(list))
    }

    /// The parent conversation as seen by `viewer`, looked up on first use.
    pub fn conversation(
        &self,
        conversations: &dyn ConversationSource,
        viewer: &Actor,
    ) -> MailResult<&Conversation> {
        if let Some(conversation) = self.conversation.get() {
            return Ok(conversation);
        }
        let conversation = conversations
            .user_conversation(self.row.conversation_id, viewer.user_id)
            .ok_or(MailError::ConversationNotFound(self.row.conversation_id))?;
        Ok(self.conversation.get_or_init(|| conversation))
    }

    /// Replaces the cached parent conversation.
    pub fn set_conversation(&mut self, conversation: Conversation) -> MailResult<()> {
        if conversation.id != self.row.conversation_id {
            return Err(MailError::ConversationMismatch {
                expected: self.row.conversation_id,
                actual: conversation.id,
            });
        }
        self.conversation = OnceCell::from(conversation);
        Ok(())
    }

    /// True if `actor` wrote this message and either the conversation is
    /// still a draft or the actor may edit sent messages.
    pub fn can_edit(
        &self,
        actor: &Actor,
        conversations: &dyn ConversationSource,
    ) -> MailResult<bool> {
        if actor.is_guest() || actor.user_id != self.row.user_id {
            return Ok(false);
        }
        let conversation = self.conversation(conversations, actor)?;
        Ok(conversation.is_draft || actor.has_permission(PERMISSION_EDIT_MESSAGE))
    }

    /// The conversation subject, prefixed with `RE: ` for replies.
    pub fn title(
        &self,
        conversations: &dyn ConversationSource,
        viewer: &Actor,
    ) -> MailResult<String> {
        let conversation = self.conversation(conversations, viewer)?;
        if conversation.first_message_id == self.row.id {
            Ok(conversation.subject.clone())
        } else {
            Ok(format!("RE: {}", conversation.subject))
        }
    }

    /// Link to this message inside its conversation.
    pub fn link(
        &self,
        links: &dyn LinkBuilder,
        conversations: &dyn ConversationSource,
        viewer: &Actor,
    ) -> MailResult<String> {
        let conversation = self.conversation(conversations, viewer)?;
        let params = LinkParams::object(conversation.id, conversation.subject.as_str())
            .with_query("messageID", self.row.id)
            .with_anchor(format!("message{}", self.row.id));
        Ok(links.link(CONVERSATION_CONTROLLER, &params))
    }
}

impl MessageContent for ConversationMessage {
    fn message(&self) -> &str {
        &self.row.message
    }

    fn time(&self) -> NaiveDateTime {
        self.row.time
    }

    fn user_id(&self) -> i64 {
        self.row.user_id
    }

    fn username(&self) -> &str {
        &self.row.username
    }
}
