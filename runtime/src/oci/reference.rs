//! OCI image reference parsing.
//!
//! Parses image references like `quay.io/org/app:v1.2` or
//! `quay.io/org/app@sha256:…` into structured components. A parsed reference
//! always has exactly one operative identity: a tag or a digest. That choice
//! decides whether a mutation may republish in place.

use std::fmt;
use std::str::FromStr;

use labelmod_core::error::{LabelModError, Result};

use super::digest::validate_digest;

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Maximum tag length accepted by OCI distribution registries.
const MAX_TAG_LEN: usize = 128;

/// Which kind of identity a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Mutable pointer; can be re-pointed at a new manifest
    Tag,
    /// Immutable content address; can never be republished
    Digest,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag => write!(f, "tag"),
            Self::Digest => write!(f, "digest"),
        }
    }
}

/// The operative identity of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    Tag(String),
    Digest(String),
}

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, optionally with port (e.g., "quay.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/team/app")
    pub repository: String,
    /// Tag or digest
    pub target: ReferenceTarget,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `quay.io/org/app:tag` → quay.io/org/app:tag
    /// - `quay.io/org/app@sha256:abc...` → digest reference
    /// - `quay.io/org/app:tag@sha256:abc...` → digest reference (the tag is ignored)
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LabelModError::InvalidReference(
                "Empty image reference".to_string(),
            ));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rfind('@') {
            Some(at_pos) => {
                let digest_part = &reference[at_pos + 1..];
                validate_digest(digest_part).map_err(|e| {
                    LabelModError::InvalidReference(format!("{} in '{}'", e, reference))
                })?;
                (&reference[..at_pos], Some(digest_part.to_string()))
            }
            None => (reference, None),
        };

        // A colon is a tag separator only when no '/' follows it; otherwise
        // it belongs to a registry port.
        let (name, tag) = match name_tag.rfind(':') {
            Some(colon_pos) if !name_tag[colon_pos + 1..].contains('/') => {
                (&name_tag[..colon_pos], Some(&name_tag[colon_pos + 1..]))
            }
            _ => (name_tag, None),
        };

        if let Some(tag) = tag {
            validate_tag(tag)?;
        }

        let (registry, repository) = Self::split_registry_repository(name)?;

        let target = match (digest, tag) {
            (Some(digest), tag) => {
                if let Some(tag) = tag {
                    tracing::debug!(
                        reference,
                        tag,
                        "Reference carries both tag and digest; digest is authoritative"
                    );
                }
                ReferenceTarget::Digest(digest)
            }
            (None, Some(tag)) => ReferenceTarget::Tag(tag.to_string()),
            (None, None) => ReferenceTarget::Tag(DEFAULT_TAG.to_string()),
        };

        Ok(ImageReference {
            registry,
            repository,
            target,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        if name.is_empty() {
            return Err(LabelModError::InvalidReference(
                "Empty repository name".to_string(),
            ));
        }

        // The first component is a registry host when it contains a dot or
        // colon, or is "localhost"
        if let Some(slash_pos) = name.find('/') {
            let first = &name[..slash_pos];
            if first.contains('.') || first.contains(':') || first == "localhost" {
                validate_registry(first)?;
                let repo = &name[slash_pos + 1..];
                let repo = if is_docker_hub(first) && !repo.contains('/') {
                    format!("library/{}", repo)
                } else {
                    repo.to_string()
                };
                validate_repository(&repo)?;
                return Ok((first.to_string(), repo));
            }
        }

        // No registry detected, use the default
        let repository = if name.contains('/') {
            name.to_string()
        } else {
            // Single name like "nginx" → "library/nginx" for Docker Hub
            format!("library/{}", name)
        };
        validate_repository(&repository)?;

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// Whether this reference is tag- or digest-qualified.
    pub fn kind(&self) -> ReferenceKind {
        match self.target {
            ReferenceTarget::Tag(_) => ReferenceKind::Tag,
            ReferenceTarget::Digest(_) => ReferenceKind::Digest,
        }
    }

    /// The tag, if this is a tag reference.
    pub fn tag(&self) -> Option<&str> {
        match &self.target {
            ReferenceTarget::Tag(tag) => Some(tag),
            ReferenceTarget::Digest(_) => None,
        }
    }

    /// The digest, if this is a digest reference.
    pub fn digest(&self) -> Option<&str> {
        match &self.target {
            ReferenceTarget::Digest(digest) => Some(digest),
            ReferenceTarget::Tag(_) => None,
        }
    }

    /// `registry/repository`, the coordinate credentials are resolved for.
    pub fn repository_coordinate(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// A tag reference to `tag` in the same repository.
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        validate_tag(tag)?;
        Ok(Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            target: ReferenceTarget::Tag(tag.to_string()),
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        match &self.target {
            ReferenceTarget::Tag(tag) => format!("{}:{}", self.repository_coordinate(), tag),
            ReferenceTarget::Digest(digest) => {
                format!("{}@{}", self.repository_coordinate(), digest)
            }
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl FromStr for ImageReference {
    type Err = LabelModError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Validate a tag: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphanumeric() || first == '_')
                && tag.len() <= MAX_TAG_LEN
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(LabelModError::InvalidReference(format!(
            "Invalid tag '{}': expected [A-Za-z0-9_][A-Za-z0-9_.-]{{0,127}}",
            tag
        )))
    }
}

/// Docker Hub host aliases; single-component paths there live under `library/`.
fn is_docker_hub(registry: &str) -> bool {
    matches!(
        registry,
        "docker.io" | "index.docker.io" | "registry-1.docker.io"
    )
}

fn validate_registry(registry: &str) -> Result<()> {
    let valid = !registry.is_empty()
        && registry
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if valid {
        Ok(())
    } else {
        Err(LabelModError::InvalidReference(format!(
            "Invalid registry host '{}'",
            registry
        )))
    }
}

fn validate_repository(repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(LabelModError::InvalidReference(
            "Empty repository name".to_string(),
        ));
    }

    for component in repository.split('/') {
        let bytes = component.as_bytes();
        let edges_ok = matches!(bytes.first(), Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit())
            && matches!(bytes.last(), Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit());
        let chars_ok = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));

        if !edges_ok || !chars_ok {
            return Err(LabelModError::InvalidReference(format!(
                "Invalid repository path '{}': component '{}' must be lowercase alphanumerics separated by '.', '_' or '-'",
                repository, component
            )));
        }
    }
    Ok(())
}
