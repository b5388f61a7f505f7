//! Chat attachment resolution.
//!
//! [`ContentResolver`] turns an attachment into display URLs for a UI and
//! into data URLs for a multimodal model, falling back stage by stage when a
//! cached representation, the optimizer, or a read fails.

pub mod attachment;
pub mod classify;
pub mod error;
pub mod pdf;
pub mod resolver;
pub mod strategy;
pub mod urls;
pub mod view;

pub use {
    attachment::{Attachment, AttachmentInput, AttachmentRecord},
    classify::{FileType, classify},
    error::{StageError, StageResult},
    pdf::{MAX_AI_PAGES, PdfPageExtractor},
    resolver::{AiPayload, ContentResolver},
    strategy::{IMAGE_STAGES, ImageStage, STAGE_TIMEOUT_MARGIN, stage_timeout_for},
    urls::UrlPolicy,
    view::{AttachmentView, DisplayUrls},
};
