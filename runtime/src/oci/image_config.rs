//! Image configuration document.
//!
//! Labels live under `config.Labels`. Everything else in the document is
//! opaque and survives a label rewrite untouched, in its original key order.
//! Only the `Labels` object is rebuilt, with its keys sorted.

use std::collections::BTreeMap;

use labelmod_core::error::{LabelModError, Result};
use serde_json::{Map, Value};

/// An image config blob as fetched from the registry.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    document: Map<String, Value>,
    labels: BTreeMap<String, String>,
    raw: Option<Vec<u8>>,
}

impl ImageConfig {
    /// Decode a config blob.
    ///
    /// A missing or `null` `config.Labels` is an empty label set; a label
    /// value that is not a string is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| LabelModError::InvalidDocument(format!("image config: {}", e)))?;
        let Value::Object(document) = value else {
            return Err(LabelModError::InvalidDocument(
                "image config is not a JSON object".to_string(),
            ));
        };

        let labels = match document.get("config") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(config)) => parse_labels(config.get("Labels"))?,
            Some(_) => {
                return Err(LabelModError::InvalidDocument(
                    "image config 'config' field is not an object".to_string(),
                ))
            }
        };

        Ok(Self {
            document,
            labels,
            raw: Some(bytes.to_vec()),
        })
    }

    /// Current labels, sorted by key.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// A new config with `labels` as its complete label set.
    ///
    /// An empty set drops the `Labels` key rather than writing `{}`.
    pub fn with_labels(&self, labels: BTreeMap<String, String>) -> Self {
        if labels == self.labels {
            return self.clone();
        }

        let mut document = self.document.clone();
        let config = document
            .entry("config")
            .or_insert_with(|| Value::Object(Map::new()));
        if !config.is_object() {
            *config = Value::Object(Map::new());
        }
        if let Value::Object(config) = config {
            if labels.is_empty() {
                // rebuild rather than remove so the remaining keys keep their order
                *config = std::mem::take(config)
                    .into_iter()
                    .filter(|(key, _)| key != "Labels")
                    .collect();
            } else {
                let map: Map<String, Value> = labels
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                // replaces in place when present, appends otherwise
                config.insert("Labels".to_string(), Value::Object(map));
            }
        }

        Self {
            document,
            labels,
            raw: None,
        }
    }

    /// Bytes to push: the fetched bytes when unchanged, compact JSON in
    /// document order otherwise.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => Ok(serde_json::to_vec(&self.document)?),
        }
    }
}

fn parse_labels(value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key.clone(), s.clone())),
                other => Err(LabelModError::InvalidDocument(format!(
                    "label '{}' has non-string value {}",
                    key, other
                ))),
            })
            .collect(),
        Some(other) => Err(LabelModError::InvalidDocument(format!(
            "config.Labels is not an object: {}",
            other
        ))),
    }
}
