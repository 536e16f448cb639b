// Image reference parsing (repository[:tag][@digest])

use std::fmt;

/// Tag used when a reference names neither a tag nor a digest
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Image reference is empty")]
    Empty,
    #[error("Invalid image reference '{0}': repository name is empty")]
    MissingRepository(String),
    #[error("Invalid image reference '{0}': empty tag")]
    EmptyTag(String),
    #[error("Invalid image reference '{0}': empty digest")]
    EmptyDigest(String),
}

/// A parsed image reference such as `registry.example.com/team/app:v1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// The tag is whatever follows the last `:` that comes after the last `/`,
    /// so a registry port (`localhost:5000/app`) is not mistaken for a tag.
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name, digest) = match reference.split_once('@') {
            Some((_, "")) => return Err(ReferenceError::EmptyDigest(reference.to_string())),
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (reference, None),
        };

        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(pos) => {
                let split = last_slash + pos;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(ReferenceError::EmptyTag(reference.to_string()));
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(ReferenceError::MissingRepository(reference.to_string()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Tag value to send to the engine API: digest, then tag, then `latest`
    pub fn api_tag(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Registry host of an image reference: everything before the first `/`.
///
/// References without a `/` return the whole string, which will simply not be
/// found in the auth mapping.
pub fn registry_host(image: &str) -> &str {
    image.split('/').next().unwrap_or(image)
}
