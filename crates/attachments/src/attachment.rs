//! Attachment variants the resolver accepts.

use serde::{Deserialize, Serialize};

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::AttachmentInput {}
    impl Sealed for super::AttachmentRecord {}
}

/// Capabilities the resolver needs from an attachment.
///
/// Sealed: the set of variants is closed, so every caller is checked at
/// compile time rather than by probing for fields.
pub trait Attachment: sealed::Sealed + Send + Sync {
    fn id(&self) -> &str;

    /// Serialized resource reference, if the attachment has one.
    fn resource_ref(&self) -> Option<&str>;

    /// Declared MIME type; may be empty when unknown.
    fn mime_type(&self) -> &str;

    fn title(&self) -> &str;

    fn filename(&self) -> Option<&str> {
        None
    }

    /// Declared size in bytes, when the variant records one.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// The minimal view: what a chat message hands over for resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInput {
    pub id: String,
    #[serde(default, alias = "ref")]
    pub resource_ref: Option<String>,
    #[serde(default, alias = "mime_type")]
    pub mime_hint: String,
    #[serde(default)]
    pub title: String,
}

impl AttachmentInput {
    pub fn new(
        id: impl Into<String>,
        resource_ref: impl Into<String>,
        mime_hint: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_ref: Some(resource_ref.into()),
            mime_hint: mime_hint.into(),
            title: title.into(),
        }
    }
}

impl Attachment for AttachmentInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn resource_ref(&self) -> Option<&str> {
        self.resource_ref.as_deref().filter(|r| !r.is_empty())
    }

    fn mime_type(&self) -> &str {
        &self.mime_hint
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// A persisted attachment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    pub message_id: String,
    #[serde(default)]
    pub resource_ref: Option<String>,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub title: String,
    /// Unix seconds.
    pub created_at: u64,
}

impl Attachment for AttachmentRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn resource_ref(&self) -> Option<&str> {
        self.resource_ref.as_deref().filter(|r| !r.is_empty())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn filename(&self) -> Option<&str> {
        Some(self.filename.as_str()).filter(|f| !f.is_empty())
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

impl From<&AttachmentRecord> for AttachmentInput {
    fn from(record: &AttachmentRecord) -> Self {
        Self {
            id: record.id.clone(),
            resource_ref: record.resource_ref.clone(),
            mime_hint: record.mime_type.clone(),
            title: record.title.clone(),
        }
    }
}
