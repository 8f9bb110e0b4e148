use std::path::PathBuf;

use thiserror::Error;

pub type RpencResult<T> = Result<T, RpencError>;

/// Failure of a single pack encryption. Every variant aborts the whole pack;
/// nothing is retried internally.
#[derive(Debug, Error)]
pub enum RpencError {
    /// Master key or a derived per-file key is not 32 bytes.
    #[error("invalid key: {0}")]
    InputKey(String),

    #[error("no manifest.json found under {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("invalid manifest.json: {0}")]
    ManifestInvalid(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("key manifest encoding failed: {0}")]
    Encoding(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RpencError {
    /// True for errors caused by the pack contents rather than the
    /// environment. Batch callers use this to decide whether to skip a pack.
    pub fn is_pack_error(&self) -> bool {
        matches!(
            self,
            Self::ManifestNotFound(_) | Self::ManifestInvalid(_) | Self::InputKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RpencError::ManifestNotFound(PathBuf::from("/tmp/pack"));
        assert_eq!(err.to_string(), "no manifest.json found under /tmp/pack");

        let err = RpencError::InputKey("expected 32 bytes, got 31".into());
        assert_eq!(err.to_string(), "invalid key: expected 32 bytes, got 31");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RpencError = io.into();
        assert!(matches!(err, RpencError::Io(_)));
        assert!(!err.is_pack_error());
    }

    #[test]
    fn test_pack_error_classification() {
        assert!(RpencError::ManifestInvalid("bad uuid".into()).is_pack_error());
        assert!(!RpencError::Archive("corrupt".into()).is_pack_error());
        assert!(!RpencError::Internal("walk skipped manifest".into()).is_pack_error());
    }
}
