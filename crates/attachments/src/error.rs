use std::time::Duration;

use thiserror::Error;

/// Why a resolution stage deferred to the next one.
///
/// None of these ever leave the resolver: they are logged and turned into
/// "try the next strategy", or into a null / placeholder result once every
/// strategy is exhausted.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("resource not found: {reference}")]
    ResourceNotFound { reference: String },

    #[error("transform unavailable: {reason}")]
    TransformUnavailable { reason: String },

    #[error("stream read failed: {0}")]
    StreamReadFailure(#[from] attache_store::Error),

    #[error("encoding failed: {0}")]
    EncodingFailure(#[from] attache_media::Error),

    #[error("{stage} timed out after {}s", after.as_secs())]
    Timeout { stage: &'static str, after: Duration },
}

impl StageError {
    #[must_use]
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            reference: reference.into(),
        }
    }

    #[must_use]
    pub fn transform_unavailable(reason: impl Into<String>) -> Self {
        Self::TransformUnavailable {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::StreamReadFailure(err.into())
    }
}

impl From<tokio::task::JoinError> for StageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::EncodingFailure(attache_media::Error::Message(format!("optimizer task failed: {err}")))
    }
}

pub type StageResult<T> = Result<T, StageError>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_stream_failures() {
        let err: StageError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, StageError::StreamReadFailure(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_message_names_stage() {
        let err = StageError::Timeout {
            stage: "optimizer",
            after: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "optimizer timed out after 30s");
    }
}
