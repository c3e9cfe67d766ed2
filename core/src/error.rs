use thiserror::Error;

/// label-mod error types
///
/// Every failure of an inspect or mutate operation ends up as one of these
/// variants and is reported in the outcome document through [`kind`] and its
/// display string. None of them is retried internally.
///
/// [`kind`]: LabelModError::kind
#[derive(Error, Debug)]
pub enum LabelModError {
    /// Malformed image or tag reference; raised before any network traffic
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Credential resolution or the registry auth handshake failed
    #[error("Authentication failed for {registry}: {message}")]
    Authentication { registry: String, message: String },

    /// Network or HTTP failure reaching the registry
    #[error("Transport error talking to {registry}: {message}")]
    Transport { registry: String, message: String },

    /// Manifest or config blob absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Mutation requested on a digest reference without any tag to publish under
    #[error("Cannot push to digest reference {0} without specifying a tag; use --tag to name one")]
    DigestWithoutTag(String),

    /// Malformed label argument (e.g. `key=value` without `=`)
    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    /// Pure removal where none of the requested keys existed
    #[error("No labels were removed (none of [{}] present)", .0.join(", "))]
    NoOpMutation(Vec<String>),

    /// Registry rejected an upload because the digest did not match the content
    #[error("Registry integrity error for {digest}: {message}")]
    RegistryIntegrity { digest: String, message: String },

    /// Manifest media type this tool does not republish (indexes, lists, schema1)
    #[error("Unsupported manifest media type: {0}")]
    UnsupportedManifest(String),

    /// Manifest or config bytes could not be decoded
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Configuration or credential store error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation interrupted before all tag pushes were issued
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LabelModError {
    /// Stable machine-readable code for this error, emitted as `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "invalid_reference",
            Self::Authentication { .. } => "authentication",
            Self::Transport { .. } => "transport",
            Self::NotFound(_) => "not_found",
            Self::DigestWithoutTag(_) => "digest_without_tag",
            Self::InvalidLabel(_) => "invalid_label",
            Self::NoOpMutation(_) => "no_op_mutation",
            Self::RegistryIntegrity { .. } => "registry_integrity",
            Self::UnsupportedManifest(_) => "unsupported_manifest",
            Self::InvalidDocument(_) => "invalid_document",
            Self::ConfigError(_) => "config",
            Self::Cancelled(_) => "cancelled",
            Self::IoError(_) => "io",
        }
    }
}

impl From<serde_json::Error> for LabelModError {
    fn from(err: serde_json::Error) -> Self {
        LabelModError::InvalidDocument(err.to_string())
    }
}

impl From<serde_yaml::Error> for LabelModError {
    fn from(err: serde_yaml::Error) -> Self {
        LabelModError::ConfigError(err.to_string())
    }
}

/// Result type alias for label-mod operations
pub type Result<T> = std::result::Result<T, LabelModError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reference_display() {
        let error = LabelModError::InvalidReference("empty image reference".to_string());
        assert_eq!(error.to_string(), "Invalid reference: empty image reference");
        assert_eq!(error.kind(), "invalid_reference");
    }

    #[test]
    fn test_authentication_error_display() {
        let error = LabelModError::Authentication {
            registry: "quay.io".to_string(),
            message: "401 Unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication failed for quay.io: 401 Unauthorized"
        );
        assert_eq!(error.kind(), "authentication");
    }

    #[test]
    fn test_digest_without_tag_display() {
        let error = LabelModError::DigestWithoutTag("quay.io/org/app@sha256:abc".to_string());
        assert!(error.to_string().contains("quay.io/org/app@sha256:abc"));
        assert!(error.to_string().contains("--tag"));
        assert_eq!(error.kind(), "digest_without_tag");
    }

    #[test]
    fn test_no_op_mutation_lists_keys() {
        let error = LabelModError::NoOpMutation(vec!["c".to_string(), "d".to_string()]);
        assert_eq!(
            error.to_string(),
            "No labels were removed (none of [c, d] present)"
        );
        assert_eq!(error.kind(), "no_op_mutation");
    }

    #[test]
    fn test_registry_integrity_display() {
        let error = LabelModError::RegistryIntegrity {
            digest: "sha256:abc".to_string(),
            message: "digest invalid".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry integrity error for sha256:abc: digest invalid"
        );
    }

    #[test]
    fn test_kind_codes_are_distinct() {
        let errors = vec![
            LabelModError::InvalidReference(String::new()),
            LabelModError::Authentication {
                registry: String::new(),
                message: String::new(),
            },
            LabelModError::Transport {
                registry: String::new(),
                message: String::new(),
            },
            LabelModError::NotFound(String::new()),
            LabelModError::DigestWithoutTag(String::new()),
            LabelModError::InvalidLabel(String::new()),
            LabelModError::NoOpMutation(vec![]),
            LabelModError::RegistryIntegrity {
                digest: String::new(),
                message: String::new(),
            },
            LabelModError::UnsupportedManifest(String::new()),
            LabelModError::InvalidDocument(String::new()),
            LabelModError::ConfigError(String::new()),
            LabelModError::Cancelled(String::new()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: LabelModError = io_error.into();
        assert!(matches!(error, LabelModError::IoError(_)));
        assert_eq!(error.kind(), "io");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let error: LabelModError = result.unwrap_err().into();
        assert!(matches!(error, LabelModError::InvalidDocument(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: LabelModError = result.unwrap_err().into();
        assert!(matches!(error, LabelModError::ConfigError(_)));
    }
}
