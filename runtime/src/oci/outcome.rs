//! Operation outcomes.
//!
//! An outcome is the only observable of a run: it is printed as JSON and its
//! `success` flag decides the exit status.

use std::collections::BTreeMap;

use labelmod_core::error::{LabelModError, Result};
use serde::{Deserialize, Serialize};

/// Result of a label mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// The reference exactly as given
    pub image_ref: String,

    /// Digest of the manifest that was fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_digest: Option<String>,

    /// Digest of the manifest that was (or would have been) published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_digest: Option<String>,

    /// Requested keys that were present and got removed
    #[serde(default)]
    pub removed: Vec<String>,

    #[serde(default)]
    pub updated: BTreeMap<String, String>,

    /// Fully-qualified references of the extra tags that were pushed
    #[serde(default)]
    pub tagged_as: Vec<String>,
}

impl MutationOutcome {
    pub fn new(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            ..Default::default()
        }
    }

    /// Mark the outcome failed with `err`. Fields already filled are kept.
    pub fn fail(&mut self, err: &LabelModError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind().to_string());
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of reading an image's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    pub image_ref: String,

    /// Digest of the manifest the reference resolved to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_digest: Option<String>,

    /// Labels currently on the image
    #[serde(default)]
    pub current: BTreeMap<String, String>,
}

impl InspectOutcome {
    pub fn new(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            ..Default::default()
        }
    }

    pub fn fail(&mut self, err: &LabelModError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind().to_string());
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
