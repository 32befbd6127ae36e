pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("media not found: {0}")]
    MediaNotFound(String),

    #[error("external service failure: {0}")]
    ExternalService(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("render cancelled")]
    Cancelled,

    #[error("no renderable content: {0}")]
    ContentLoss(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable, serializable classification of a [`ReelError`] for task records and progress events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    MediaNotFound,
    ExternalServiceFailure,
    Encoding,
    Cancelled,
    ContentLoss,
    Internal,
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn media_not_found(msg: impl Into<String>) -> Self {
        Self::MediaNotFound(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn content_loss(msg: impl Into<String>) -> Self {
        Self::ContentLoss(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::MediaNotFound(_) => ErrorKind::MediaNotFound,
            Self::ExternalService(_) => ErrorKind::ExternalServiceFailure,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ContentLoss(_) => ErrorKind::ContentLoss,
            Self::Evaluation(_) | Self::Serde(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Per-element failures are absorbed by the element renderer; everything else ends the attempt.
    pub fn is_element_recoverable(&self) -> bool {
        matches!(self, Self::MediaNotFound(_) | Self::ExternalService(_))
    }
}

impl From<serde_json::Error> for ReelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            ReelError::media_not_found("x")
                .to_string()
                .contains("media not found:")
        );
        assert!(
            ReelError::encoding("x")
                .to_string()
                .contains("encoding error:")
        );
        assert_eq!(ReelError::Cancelled.to_string(), "render cancelled");
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ReelError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            ReelError::external_service("tts down").kind(),
            ErrorKind::ExternalServiceFailure
        );
        assert_eq!(ReelError::serde("bad").kind(), ErrorKind::Internal);
        assert!(ReelError::media_not_found("a.png").is_element_recoverable());
        assert!(!ReelError::encoding("pipe").is_element_recoverable());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let s = serde_json::to_string(&ErrorKind::ExternalServiceFailure).unwrap();
        assert_eq!(s, "\"external_service_failure\"");
    }
}
