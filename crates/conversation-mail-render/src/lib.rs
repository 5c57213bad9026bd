//! Message parsing and phrase rendering for Conversation Mail
//!
//! This crate provides:
//! - The message parser (`MessageParser`): HTML policy, BBCode, smilies, sanitization
//! - HTML utilities (escaping, stripping, entity decoding, tag-aware truncation)
//! - Phrase rendering (`Language`) over embedded MiniJinja templates

#![forbid(unsafe_code)]

pub mod bbcode;
pub mod html;
pub mod language;
pub mod parser;
pub mod sanitize;
pub mod smilies;

pub use html::{HELLIP, decode_html, escape_html, strip_html, truncate_html, visible_length};
pub use language::{DEFAULT_LANGUAGE, Language};
pub use parser::{
    EmbedContext, EmbeddedAttachment, EmbeddedObjectSource, MessageParser, OutputType,
    ParseOptions,
};
