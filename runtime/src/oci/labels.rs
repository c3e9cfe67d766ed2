//! Label deltas.
//!
//! A [`LabelDelta`] is a removal list plus an update map. Applying it to a
//! label set never touches the input; the result carries the new label set
//! together with what actually changed.
//!
//! # Ordering
//!
//! Removals are applied first, then updates. A key that is both removed and
//! updated therefore ends up present with the update value.
//!
//! # Example
//!
//! ```text
//! label-mod modify-labels quay.io/org/app:v1 \
//!     --remove maintainer \
//!     --update org.opencontainers.image.version=1.2.0
//! ```

use std::collections::BTreeMap;

use labelmod_core::error::{LabelModError, Result};

/// Requested label changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    /// Keys to remove, in the order given
    pub removals: Vec<String>,

    /// Keys to set, with their new values
    pub updates: BTreeMap<String, String>,
}

/// Result of applying a [`LabelDelta`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    /// Complete label set after the delta
    pub labels: BTreeMap<String, String>,

    /// Removal keys that were present, in request order
    pub removed: Vec<String>,

    /// Updates that were applied
    pub updated: BTreeMap<String, String>,
}

impl LabelDelta {
    /// A delta that only removes keys.
    pub fn remove<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            removals: keys.into_iter().map(Into::into).collect(),
            updates: BTreeMap::new(),
        }
    }

    /// A delta that only sets keys.
    pub fn update<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            removals: Vec::new(),
            updates: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build a delta from removal keys and `key=value` update assignments.
    pub fn from_args(removals: &[String], assignments: &[String]) -> Result<Self> {
        let updates = assignments
            .iter()
            .map(|a| parse_label_assignment(a))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            removals: removals.to_vec(),
            updates,
        })
    }

    /// True when the delta removes keys and sets none.
    pub fn is_pure_removal(&self) -> bool {
        !self.removals.is_empty() && self.updates.is_empty()
    }

    /// True when the delta requests nothing.
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.updates.is_empty()
    }

    /// Apply the delta to `current`.
    ///
    /// Removing an absent key is not an error here; the caller decides
    /// whether a removal that changed nothing should fail.
    pub fn apply(&self, current: &BTreeMap<String, String>) -> LabelChange {
        let mut labels = current.clone();
        let mut removed = Vec::new();

        for key in &self.removals {
            if labels.remove(key).is_some() {
                removed.push(key.clone());
            }
        }

        for (key, value) in &self.updates {
            labels.insert(key.clone(), value.clone());
        }

        LabelChange {
            labels,
            removed,
            updated: self.updates.clone(),
        }
    }
}

/// Parse a `key=value` label assignment.
///
/// The split happens on the first `=`, so values may themselves contain `=`.
/// An empty value is allowed; an empty key or a missing `=` is not.
pub fn parse_label_assignment(assignment: &str) -> Result<(String, String)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(LabelModError::InvalidLabel(format!(
            "'{}' is not a key=value assignment",
            assignment
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_remove_present_key() {
        let change = LabelDelta::remove(["a"]).apply(&labels(&[("a", "1"), ("b", "2")]));
        assert_eq!(change.labels, labels(&[("b", "2")]));
        assert_eq!(change.removed, vec!["a"]);
        assert!(change.updated.is_empty());
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let current = labels(&[("a", "1"), ("b", "2")]);
        let change = LabelDelta::remove(["c"]).apply(&current);
        assert_eq!(change.labels, current);
        assert!(change.removed.is_empty());
    }

    #[test]
    fn test_removed_follows_request_order_without_duplicates() {
        let current = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let change = LabelDelta::remove(["c", "x", "a", "c"]).apply(&current);
        assert_eq!(change.removed, vec!["c", "a"]);
        assert_eq!(change.labels, labels(&[("b", "2")]));
    }

    #[test]
    fn test_update_adds_and_overwrites() {
        let change =
            LabelDelta::update([("b", "20"), ("c", "3")]).apply(&labels(&[("a", "1"), ("b", "2")]));
        assert_eq!(change.labels, labels(&[("a", "1"), ("b", "20"), ("c", "3")]));
        assert_eq!(change.updated, labels(&[("b", "20"), ("c", "3")]));
    }

    #[test]
    fn test_update_wins_over_removal_of_same_key() {
        let delta = LabelDelta {
            removals: vec!["a".to_string()],
            updates: labels(&[("a", "new")]),
        };
        let change = delta.apply(&labels(&[("a", "old")]));
        assert_eq!(change.labels, labels(&[("a", "new")]));
        assert_eq!(change.removed, vec!["a"]);
    }

    #[test]
    fn test_result_is_difference_union_updates() {
        let current = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let delta = LabelDelta {
            removals: vec!["a".to_string(), "z".to_string()],
            updates: labels(&[("c", "30"), ("d", "4")]),
        };

        let mut expected = current.clone();
        for key in &delta.removals {
            expected.remove(key);
        }
        expected.extend(delta.updates.clone());

        assert_eq!(delta.apply(&current).labels, expected);
    }

    #[test]
    fn test_apply_leaves_input_untouched() {
        let current = labels(&[("a", "1")]);
        let _ = LabelDelta::remove(["a"]).apply(&current);
        assert_eq!(current, labels(&[("a", "1")]));
    }

    #[test]
    fn test_is_pure_removal() {
        assert!(LabelDelta::remove(["a"]).is_pure_removal());
        assert!(!LabelDelta::update([("a", "1")]).is_pure_removal());
        assert!(!LabelDelta::default().is_pure_removal());
        assert!(LabelDelta::default().is_empty());
    }

    #[test]
    fn test_parse_label_assignment() {
        assert_eq!(
            parse_label_assignment("version=1.0").unwrap(),
            ("version".to_string(), "1.0".to_string())
        );
        assert_eq!(
            parse_label_assignment("opts=a=b").unwrap(),
            ("opts".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_label_assignment("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_label_assignment_rejects_malformed() {
        assert!(matches!(
            parse_label_assignment("novalue"),
            Err(LabelModError::InvalidLabel(_))
        ));
        assert!(parse_label_assignment("=value").is_err());
    }

    #[test]
    fn test_from_args() {
        let delta = LabelDelta::from_args(
            &["old".to_string()],
            &["k=v".to_string(), "k=w".to_string()],
        )
        .unwrap();
        assert_eq!(delta.removals, vec!["old"]);
        assert_eq!(delta.updates, labels(&[("k", "w")]));

        assert!(LabelDelta::from_args(&[], &["broken".to_string()]).is_err());
    }
}
