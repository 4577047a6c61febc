use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Random identity assigned to an asset at ingestion time.
///
/// 20 random bytes, hex encoded. Deliberately not content-derived: two
/// ingestions of the same bytes get distinct fingerprints (and keys).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Generate a new random fingerprint
    pub fn new() -> Self {
        let mut raw = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut raw);
        Self(hex::encode(raw))
    }

    /// Create from existing string
    pub fn from_string(fingerprint: String) -> Self {
        Self(fingerprint)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of a multi-part transfer: the main asset or a rendition
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub content_length: u64,
}

impl UploadPart {
    pub fn new<K: Into<String>, C: Into<String>>(key: K, body: Bytes, content_type: C) -> Self {
        let content_length = body.len() as u64;
        Self {
            key: key.into(),
            body,
            content_type: content_type.into(),
            content_length,
        }
    }
}

/// Reference to an object living in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObjectReference {
    pub key: String,
    pub url: String,
    pub size: u64,
    /// Opaque content fingerprint reported by the backend
    pub etag: Option<String>,
}

/// Descriptor for one successfully transferred part, accumulated on the
/// session and handed to the caller with the terminal `Complete` signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// How a download request addresses its target.
///
/// The caller picks the mode explicitly; nothing is inferred from the shape
/// of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocator {
    /// Opaque metadata record identifier
    Id(i64),
    /// Object-store key, e.g. `acme/image/<fingerprint>.jpg`
    Key(String),
    /// Absolute URL fetched over HTTP
    Url(String),
}

impl MediaLocator {
    /// Classify a caller-supplied string for callers that only have one.
    ///
    /// Purely numeric input resolves to [`MediaLocator::Id`], an absolute
    /// http(s) URL to [`MediaLocator::Url`], anything else non-empty to
    /// [`MediaLocator::Key`].
    pub fn parse(input: &str) -> crate::MediaResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(crate::MediaError::invalid_identifier(
                "identifier must be a record id, object key, or absolute URL",
            ));
        }
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        if let Ok(url) = reqwest::Url::parse(trimmed) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(Self::Url(trimmed.to_string()));
            }
        }
        Ok(Self::Key(trimmed.to_string()))
    }
}

impl std::fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{}", id),
            Self::Key(key) => write!(f, "key:{}", key),
            Self::Url(url) => write!(f, "url:{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_40_hex_chars() {
        let fp = Fingerprint::new();
        assert_eq!(fp.as_str().len(), 40);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprints_are_unique_per_call() {
        assert_ne!(Fingerprint::new(), Fingerprint::new());
    }

    #[test]
    fn test_locator_parse_modes() {
        assert_eq!(MediaLocator::parse("42").unwrap(), MediaLocator::Id(42));
        assert_eq!(
            MediaLocator::parse("https://cdn.example.com/a.jpg").unwrap(),
            MediaLocator::Url("https://cdn.example.com/a.jpg".to_string())
        );
        assert_eq!(
            MediaLocator::parse("acme/image/abc.jpg").unwrap(),
            MediaLocator::Key("acme/image/abc.jpg".to_string())
        );
    }

    #[test]
    fn test_locator_parse_rejects_empty() {
        assert!(MediaLocator::parse("  ").is_err());
    }
}
