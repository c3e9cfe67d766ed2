//! Image manifest handling.
//!
//! The manifest is kept as its decoded JSON document so that every field we
//! do not touch (layers, annotations, subject, ...) is carried through. The
//! only supported change is swapping the config descriptor.

use labelmod_core::error::{LabelModError, Result};
use serde_json::{Map, Value};

use super::digest::{canonical_json, validate_digest};

/// OCI image manifest media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker image manifest (schema 2) media type.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image index media type.
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Docker manifest list media type.
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest media types requested from the registry.
pub const ACCEPTED_MANIFEST_MEDIA_TYPES: &[&str] =
    &[OCI_MANIFEST_MEDIA_TYPE, DOCKER_MANIFEST_MEDIA_TYPE];

/// Digest, size and media type of the config object a manifest references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// A single-platform image manifest.
#[derive(Debug, Clone)]
pub struct ImageManifest {
    document: Map<String, Value>,
    media_type: String,
    config: ConfigDescriptor,
    /// Bytes as fetched; `None` once the manifest has been rewritten
    raw: Option<Vec<u8>>,
}

impl ImageManifest {
    /// Decode manifest bytes.
    ///
    /// `content_type` is the registry-reported media type, used when the
    /// document itself does not carry a `mediaType` field.
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| LabelModError::InvalidDocument(format!("manifest: {}", e)))?;
        let Value::Object(document) = value else {
            return Err(LabelModError::InvalidDocument(
                "manifest is not a JSON object".to_string(),
            ));
        };

        let media_type = document
            .get("mediaType")
            .and_then(Value::as_str)
            .or(content_type)
            .unwrap_or(OCI_MANIFEST_MEDIA_TYPE)
            .to_string();

        if media_type == OCI_INDEX_MEDIA_TYPE
            || media_type == DOCKER_MANIFEST_LIST_MEDIA_TYPE
            || (document.contains_key("manifests") && !document.contains_key("config"))
        {
            return Err(LabelModError::UnsupportedManifest(format!(
                "{} (multi-platform images are not supported; reference a single platform manifest by digest)",
                media_type
            )));
        }
        if media_type != OCI_MANIFEST_MEDIA_TYPE && media_type != DOCKER_MANIFEST_MEDIA_TYPE {
            return Err(LabelModError::UnsupportedManifest(media_type));
        }

        match document.get("schemaVersion").and_then(Value::as_u64) {
            Some(2) => {}
            other => {
                return Err(LabelModError::UnsupportedManifest(format!(
                    "schemaVersion {:?}",
                    other
                )))
            }
        }

        let config = parse_config_descriptor(&document)?;

        Ok(Self {
            document,
            media_type,
            config,
            raw: Some(bytes.to_vec()),
        })
    }

    /// The manifest media type, used as the push content type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The config descriptor.
    pub fn config(&self) -> &ConfigDescriptor {
        &self.config
    }

    /// Number of layer descriptors (layers themselves are never touched).
    pub fn layer_count(&self) -> usize {
        self.document
            .get("layers")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// A new manifest identical to this one except for the config descriptor's
    /// digest and size. The descriptor's media type and any other descriptor
    /// fields are kept.
    pub fn with_config(&self, digest: &str, size: u64) -> Self {
        if self.config.digest == digest && self.config.size == size {
            return self.clone();
        }

        let mut document = self.document.clone();
        if let Some(Value::Object(config)) = document.get_mut("config") {
            config.insert("digest".to_string(), Value::String(digest.to_string()));
            config.insert("size".to_string(), Value::from(size));
        }

        Self {
            document,
            media_type: self.media_type.clone(),
            config: ConfigDescriptor {
                media_type: self.config.media_type.clone(),
                digest: digest.to_string(),
                size,
            },
            raw: None,
        }
    }

    /// Bytes to push: the fetched bytes when unchanged, canonical JSON otherwise.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => canonical_json(&Value::Object(self.document.clone())),
        }
    }
}

fn parse_config_descriptor(document: &Map<String, Value>) -> Result<ConfigDescriptor> {
    let config = document
        .get("config")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            LabelModError::InvalidDocument("manifest has no config descriptor".to_string())
        })?;

    let field = |name: &str| {
        config.get(name).ok_or_else(|| {
            LabelModError::InvalidDocument(format!("config descriptor is missing '{}'", name))
        })
    };

    let media_type = field("mediaType")?
        .as_str()
        .ok_or_else(|| LabelModError::InvalidDocument("config mediaType is not a string".into()))?
        .to_string();
    let digest = field("digest")?
        .as_str()
        .ok_or_else(|| LabelModError::InvalidDocument("config digest is not a string".into()))?
        .to_string();
    validate_digest(&digest)
        .map_err(|e| LabelModError::InvalidDocument(format!("config descriptor: {}", e)))?;
    let size = field("size")?
        .as_u64()
        .ok_or_else(|| LabelModError::InvalidDocument("config size is not a number".into()))?;

    Ok(ConfigDescriptor {
        media_type,
        digest,
        size,
    })
}
