//! Attachments of a message, grouped into images and other files.

use conversation_mail_core::{Attachment, MailResult};
use tracing::debug;

/// What the viewer may do with the listed attachments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentPermissions {
    pub can_download: bool,
    pub can_view_preview: bool,
}

impl AttachmentPermissions {
    /// Full access, as granted to readers of a conversation.
    pub const ALL: Self = Self {
        can_download: true,
        can_view_preview: true,
    };
}

/// Reads stored attachments.
pub trait AttachmentSource {
    /// Attachments of type `object_type` owned by any of `object_ids`.
    fn attachments(&self, object_type: &str, object_ids: &[i64]) -> MailResult<Vec<Attachment>>;
}

/// Attachments of one or more objects, split into images and files.
///
/// Both groups are ordered by show order, then id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedAttachmentList {
    object_type: String,
    object_ids: Vec<i64>,
    images: Vec<Attachment>,
    files: Vec<Attachment>,
    permissions: AttachmentPermissions,
}

impl GroupedAttachmentList {
    #[must_use]
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_ids: Vec::new(),
            images: Vec::new(),
            files: Vec::new(),
            permissions: AttachmentPermissions::default(),
        }
    }

    /// Restricts the list to attachments of `ids`.
    #[must_use]
    pub fn object_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.object_ids.extend(ids);
        self.object_ids.sort_unstable();
        self.object_ids.dedup();
        self
    }

    /// Loads the attachments of the configured objects from `source`,
    /// replacing anything read before.
    pub fn read_objects(&mut self, source: &dyn AttachmentSource) -> MailResult<()> {
        self.images.clear();
        self.files.clear();
        if self.object_ids.is_empty() {
            return Ok(());
        }

        let mut attachments: Vec<Attachment> = source
            .attachments(&self.object_type, &self.object_ids)?
            .into_iter()
            .filter(|a| {
                a.object_type == self.object_type && self.object_ids.binary_search(&a.object_id).is_ok()
            })
            .collect();
        attachments.sort_by_key(|a| (a.show_order, a.id));

        let (images, files): (Vec<_>, Vec<_>) = attachments.into_iter().partition(|a| a.is_image);
        debug!(
            object_type = %self.object_type,
            images = images.len(),
            files = files.len(),
            "attachments read"
        );
        self.images = images;
        self.files = files;
        Ok(())
    }

    pub fn set_permissions(&mut self, permissions: AttachmentPermissions) {
        self.permissions = permissions;
    }

    #[must_use]
    pub const fn permissions(&self) -> AttachmentPermissions {
        self.permissions
    }

    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.object_ids
    }

    #[must_use]
    pub fn images(&self) -> &[Attachment] {
        &self.images
    }

    #[must_use]
    pub fn files(&self) -> &[Attachment] {
        &self.files
    }

    /// Images first, then files.
    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.images.iter().chain(self.files.iter())
    }

    #[must_use]
    pub fn get(&self, attachment_id: i64) -> Option<&Attachment> {
        self.iter().find(|a| a.id == attachment_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len() + self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
