use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Image {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn image(context: impl Into<String>, source: image::ImageError) -> Self {
        Self::Image {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl attache_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

attache_common::impl_context!();
