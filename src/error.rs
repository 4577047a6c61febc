use thiserror::Error;

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while ingesting, transforming, or transferring media
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("File type not allowed: {extension}")]
    UnsupportedType { extension: String },

    #[error("Failed to read media source: {source}")]
    Read {
        #[source]
        source: std::io::Error,
    },

    #[error("Rendition failed: {reason}")]
    Rendition { reason: String },

    #[error("Media transport misconfigured: {name}")]
    TransportConfig { name: String },

    #[error("Transfer failed for {key}: {reason}")]
    Transport { key: String, reason: String },

    #[error("Media not found: {id}")]
    NotFound { id: String },

    #[error("Fetch timed out after {millis}ms: {url}")]
    Timeout { url: String, millis: u64 },

    #[error("Invalid media identifier: {message}")]
    InvalidIdentifier { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MediaError {
    /// Create an unsupported-type error from a sniffed extension
    pub fn unsupported<S: Into<String>>(extension: S) -> Self {
        Self::UnsupportedType {
            extension: extension.into(),
        }
    }

    /// Create a read error from an I/O failure on the source
    pub fn read(source: std::io::Error) -> Self {
        Self::Read { source }
    }

    /// Create a rendition error
    pub fn rendition<S: Into<String>>(reason: S) -> Self {
        Self::Rendition {
            reason: reason.into(),
        }
    }

    /// Create a transfer error for a specific object key
    pub fn transport<K: Into<String>, S: Into<String>>(key: K, reason: S) -> Self {
        Self::Transport {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier<S: Into<String>>(message: S) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
        }
    }

    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }
}
