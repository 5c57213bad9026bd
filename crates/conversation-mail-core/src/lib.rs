//! Core types, configuration, and models for Conversation Mail
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - Data models (`Conversation`, `MessageRow`, `Attachment`, `UserNotification`, `Actor`)
//! - Common error types

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod models;

pub use config::{Config, DEFAULT_EXCERPT_LENGTH};
pub use error::{Error as MailError, Result as MailResult};
pub use models::{
    Actor, Attachment, Conversation, GUEST_USER_ID, HideState, MessageRow,
    PERMISSION_EDIT_MESSAGE, Participant, UserNotification,
};
