use serde::{Deserialize, Serialize};

use crate::classify::FileType;

/// URLs produced for displaying an attachment. Every field is optional:
/// an unresolvable resource yields all `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayUrls {
    pub download_url: Option<String>,
    pub preview_url: Option<String>,
    pub src: Option<String>,
    pub data_url: Option<String>,
}

/// JSON shape handed to chat clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    pub is_image: bool,
    pub download_url: Option<String>,
    pub preview_url: Option<String>,
    /// Same as `preview_url`; kept for clients that read the older name.
    pub thumbnail_url: Option<String>,
    pub src: Option<String>,
    pub data_url: Option<String>,
}

impl AttachmentView {
    pub(crate) fn assemble(
        id: &str,
        title: &str,
        filename: &str,
        size: u64,
        mime_type: &str,
        file_type: FileType,
        urls: DisplayUrls,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            filename: filename.to_string(),
            size,
            mime_type: mime_type.to_string(),
            file_type,
            is_image: file_type == FileType::Image,
            thumbnail_url: urls.preview_url.clone(),
            download_url: urls.download_url,
            preview_url: urls.preview_url,
            src: urls.src,
            data_url: urls.data_url,
        }
    }
}
