//! Integration test: label mutation through the public runtime API.
//!
//! Drives `LabelMutator` end to end against `InMemoryRegistry`:
//!
//! 1. Seed an image with labels `a=1`, `b=2`
//! 2. Inspect it
//! 3. Remove, update, and retag through the engine
//! 4. Read the results back from the registry
//!
//! No network access is needed.

use std::collections::BTreeMap;
use std::sync::Arc;

use labelmod_runtime::oci::manifest::OCI_MANIFEST_MEDIA_TYPE;
use labelmod_runtime::{
    Credential, ImageReference, InMemoryRegistry, LabelDelta, LabelMutator, StaticAuthenticator,
};
use serde_json::json;

const REPO: &str = "registry.example.com/team/service";

fn seed(registry: &InMemoryRegistry, tag: &str) -> String {
    let config = serde_json::to_vec_pretty(&json!({
        "created": "2024-01-01T00:00:00Z",
        "architecture": "arm64",
        "os": "linux",
        "config": {
            "Entrypoint": ["/service"],
            "Labels": {"a": "1", "b": "2"}
        },
        "rootfs": {"type": "layers", "diff_ids": ["sha256:0000"]}
    }))
    .unwrap();
    let config_digest = registry.insert_blob(REPO, &config);

    let manifest = serde_json::to_vec_pretty(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_MANIFEST_MEDIA_TYPE,
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": config.len()
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": format!("sha256:{}", "1".repeat(64)),
            "size": 4096
        }]
    }))
    .unwrap();
    let reference = ImageReference::parse(&format!("{}:{}", REPO, tag)).unwrap();
    registry.insert_manifest(&reference, &manifest, OCI_MANIFEST_MEDIA_TYPE)
}

fn engine(registry: &Arc<InMemoryRegistry>) -> LabelMutator {
    LabelMutator::new(
        registry.clone(),
        Arc::new(StaticAuthenticator::new(Credential::basic("ci", "token"))),
    )
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_remove_then_inspect() {
    let registry = Arc::new(InMemoryRegistry::new());
    let original = seed(&registry, "1.0");
    let image = format!("{}:1.0", REPO);

    let inspected = engine(&registry).inspect(&image).await;
    assert!(inspected.success);
    assert_eq!(inspected.current, labels(&[("a", "1"), ("b", "2")]));
    assert_eq!(inspected.new_digest.as_deref(), Some(original.as_str()));

    let outcome = engine(&registry)
        .mutate(&image, &LabelDelta::remove(["a"]), &[])
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.removed, vec!["a"]);
    assert_eq!(outcome.old_digest.as_deref(), Some(original.as_str()));

    let inspected = engine(&registry).inspect(&image).await;
    assert_eq!(inspected.current, labels(&[("b", "2")]));
    assert_eq!(inspected.new_digest, outcome.new_digest);
}

#[tokio::test]
async fn test_remove_absent_changes_nothing() {
    let registry = Arc::new(InMemoryRegistry::new());
    let original = seed(&registry, "1.0");
    let image = format!("{}:1.0", REPO);

    let outcome = engine(&registry)
        .mutate(&image, &LabelDelta::remove(["c"]), &[])
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(
        outcome.error.as_deref(),
        Some("No labels were removed (none of [c] present)")
    );
    assert_eq!(registry.push_count(), 0);
    assert_eq!(engine(&registry).inspect(&image).await.new_digest, Some(original));
}

#[tokio::test]
async fn test_update_and_retag() {
    let registry = Arc::new(InMemoryRegistry::new());
    seed(&registry, "1.0");
    let image = format!("{}:1.0", REPO);

    let delta = LabelDelta::from_args(
        &["b".to_string()],
        &["version=1.0.1".to_string(), "a=one".to_string()],
    )
    .unwrap();
    let outcome = engine(&registry)
        .mutate(&image, &delta, &["1.0.1".to_string(), "stable".to_string()])
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(
        outcome.tagged_as,
        vec![format!("{}:1.0.1", REPO), format!("{}:stable", REPO)]
    );

    for tag in ["1.0", "1.0.1", "stable"] {
        let inspected = engine(&registry).inspect(&format!("{}:{}", REPO, tag)).await;
        assert_eq!(
            inspected.current,
            labels(&[("a", "one"), ("version", "1.0.1")]),
            "tag {}",
            tag
        );
        assert_eq!(inspected.new_digest, outcome.new_digest);
    }

    let json: serde_json::Value =
        serde_json::from_str(&outcome.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["updated"], json!({"a": "one", "version": "1.0.1"}));
    assert_eq!(json["removed"], json!(["b"]));
}

#[tokio::test]
async fn test_digest_reference_publishes_only_to_new_tag() {
    let registry = Arc::new(InMemoryRegistry::new());
    let original = seed(&registry, "1.0");
    let by_digest = format!("{}@{}", REPO, original);

    let refused = engine(&registry)
        .mutate(&by_digest, &LabelDelta::remove(["a"]), &[])
        .await;
    assert_eq!(refused.error_kind.as_deref(), Some("digest_without_tag"));
    assert_eq!(registry.push_count(), 0);

    let outcome = engine(&registry)
        .mutate(&by_digest, &LabelDelta::remove(["a"]), &["v2".to_string()])
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.tagged_as, vec![format!("{}:v2", REPO)]);

    let v1 = engine(&registry).inspect(&format!("{}:1.0", REPO)).await;
    assert_eq!(v1.new_digest, Some(original));
    assert_eq!(v1.current, labels(&[("a", "1"), ("b", "2")]));

    let v2 = engine(&registry).inspect(&format!("{}:v2", REPO)).await;
    assert_eq!(v2.current, labels(&[("b", "2")]));
}

#[tokio::test]
async fn test_layers_are_never_uploaded() {
    let registry = Arc::new(InMemoryRegistry::new());
    seed(&registry, "1.0");

    engine(&registry)
        .mutate(
            &format!("{}:1.0", REPO),
            &LabelDelta::update([("x", "y")]),
            &[],
        )
        .await;

    let layer = format!("sha256:{}", "1".repeat(64));
    assert!(registry.blob(REPO, &layer).is_none());
}
