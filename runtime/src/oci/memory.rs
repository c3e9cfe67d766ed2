//! In-memory registry.
//!
//! Implements [`RegistryClient`] over plain maps. It behaves like a
//! content-addressed registry (blob uploads are verified against their
//! digest, manifests are stored by digest and tags point at digests) and
//! records every push so callers can assert on them. Failures and delays can
//! be injected per manifest reference.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use labelmod_core::error::{LabelModError, Result};
use parking_lot::Mutex;

use super::auth::Credential;
use super::digest::{sha256_digest, verify_digest};
use super::manifest::ConfigDescriptor;
use super::reference::{ImageReference, ReferenceTarget};
use super::registry::{FetchedManifest, RegistryClient};

/// A push observed by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRecord {
    Blob { repository: String, digest: String },
    Manifest { reference: String, digest: String },
}

#[derive(Debug, Clone)]
struct StoredManifest {
    bytes: Vec<u8>,
    media_type: String,
}

#[derive(Default)]
struct State {
    /// repository coordinate -> digest -> bytes
    blobs: HashMap<String, HashMap<String, Vec<u8>>>,
    /// repository coordinate -> digest -> manifest
    manifests: HashMap<String, HashMap<String, StoredManifest>>,
    /// repository coordinate -> tag -> digest
    tags: HashMap<String, BTreeMap<String, String>>,
    pushes: Vec<PushRecord>,
    failing_manifests: HashSet<String>,
    failing_blobs: bool,
    mismatched_blobs: bool,
    corrupt_blobs: HashSet<String>,
    delays: HashMap<String, Duration>,
    fetch_delays: HashMap<String, Duration>,
}

/// Registry held entirely in memory.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob in `repository` (a `host/path` coordinate). Returns its digest.
    pub fn insert_blob(&self, repository: &str, data: &[u8]) -> String {
        let digest = sha256_digest(data);
        self.state
            .lock()
            .blobs
            .entry(repository.to_string())
            .or_default()
            .insert(digest.clone(), data.to_vec());
        digest
    }

    /// Store a manifest and, for a tag reference, point the tag at it.
    /// Returns the manifest digest.
    pub fn insert_manifest(&self, reference: &ImageReference, bytes: &[u8], media_type: &str) -> String {
        let mut state = self.state.lock();
        store_manifest(&mut state, reference, bytes, media_type)
    }

    /// Digest a tag or digest reference currently resolves to.
    pub fn resolve(&self, reference: &ImageReference) -> Option<String> {
        let state = self.state.lock();
        resolve_digest(&state, reference)
    }

    /// Manifest bytes a reference currently resolves to.
    pub fn manifest(&self, reference: &ImageReference) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let digest = resolve_digest(&state, reference)?;
        state
            .manifests
            .get(&reference.repository_coordinate())?
            .get(&digest)
            .map(|m| m.bytes.clone())
    }

    /// Blob bytes by digest.
    pub fn blob(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .blobs
            .get(repository)?
            .get(digest)
            .cloned()
    }

    /// Tags present in `repository`, sorted.
    pub fn tags(&self, repository: &str) -> Vec<String> {
        self.state
            .lock()
            .tags
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every push seen so far, in arrival order.
    pub fn pushes(&self) -> Vec<PushRecord> {
        self.state.lock().pushes.clone()
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().pushes.len()
    }

    /// Make manifest pushes to `reference` fail with a transport error.
    pub fn fail_manifest_push(&self, reference: &str) {
        self.state
            .lock()
            .failing_manifests
            .insert(reference.to_string());
    }

    /// Make every blob push fail with a transport error.
    pub fn fail_blob_pushes(&self) {
        self.state.lock().failing_blobs = true;
    }

    /// Reject every blob push as if the upload hashed to a different digest.
    pub fn reject_blob_digests(&self) {
        self.state.lock().mismatched_blobs = true;
    }

    /// Serve altered bytes for the blob `digest` on fetch.
    pub fn corrupt_blob(&self, digest: &str) {
        self.state.lock().corrupt_blobs.insert(digest.to_string());
    }

    /// Hold manifest fetches of `reference` for `delay` before answering.
    pub fn delay_manifest_fetch(&self, reference: &str, delay: Duration) {
        self.state
            .lock()
            .fetch_delays
            .insert(reference.to_string(), delay);
    }

    /// Hold manifest pushes to `reference` for `delay` before completing.
    pub fn delay_manifest_push(&self, reference: &str, delay: Duration) {
        self.state
            .lock()
            .delays
            .insert(reference.to_string(), delay);
    }
}

fn store_manifest(
    state: &mut State,
    reference: &ImageReference,
    bytes: &[u8],
    media_type: &str,
) -> String {
    let repository = reference.repository_coordinate();
    let digest = sha256_digest(bytes);
    state
        .manifests
        .entry(repository.clone())
        .or_default()
        .insert(
            digest.clone(),
            StoredManifest {
                bytes: bytes.to_vec(),
                media_type: media_type.to_string(),
            },
        );
    if let ReferenceTarget::Tag(tag) = &reference.target {
        state
            .tags
            .entry(repository)
            .or_default()
            .insert(tag.clone(), digest.clone());
    }
    digest
}

fn resolve_digest(state: &State, reference: &ImageReference) -> Option<String> {
    match &reference.target {
        ReferenceTarget::Digest(digest) => Some(digest.clone()),
        ReferenceTarget::Tag(tag) => state
            .tags
            .get(&reference.repository_coordinate())?
            .get(tag)
            .cloned(),
    }
}

fn transport(reference: &ImageReference, message: &str) -> LabelModError {
    LabelModError::Transport {
        registry: reference.registry.clone(),
        message: message.to_string(),
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        _credential: &Credential,
    ) -> Result<FetchedManifest> {
        let delay = self
            .state
            .lock()
            .fetch_delays
            .get(&reference.full_reference())
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        let manifest = resolve_digest(&state, reference)
            .and_then(|digest| {
                state
                    .manifests
                    .get(&reference.repository_coordinate())?
                    .get(&digest)
                    .cloned()
            })
            .ok_or_else(|| LabelModError::NotFound(reference.full_reference()))?;

        Ok(FetchedManifest {
            bytes: manifest.bytes,
            media_type: Some(manifest.media_type),
        })
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &ConfigDescriptor,
        _credential: &Credential,
    ) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let mut data = state
            .blobs
            .get(&reference.repository_coordinate())
            .and_then(|blobs| blobs.get(&descriptor.digest))
            .cloned()
            .ok_or_else(|| LabelModError::NotFound(descriptor.digest.clone()))?;
        if state.corrupt_blobs.contains(&descriptor.digest) {
            data.extend_from_slice(b" ");
        }
        Ok(data)
    }

    async fn push_blob(
        &self,
        reference: &ImageReference,
        data: &[u8],
        digest: &str,
        _credential: &Credential,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_blobs {
            return Err(transport(reference, "blob upload rejected"));
        }
        if state.mismatched_blobs || !verify_digest(data, digest) {
            return Err(LabelModError::RegistryIntegrity {
                digest: digest.to_string(),
                message: format!("content hashes to {}", sha256_digest(data)),
            });
        }

        let repository = reference.repository_coordinate();
        state
            .blobs
            .entry(repository.clone())
            .or_default()
            .insert(digest.to_string(), data.to_vec());
        state.pushes.push(PushRecord::Blob {
            repository,
            digest: digest.to_string(),
        });
        Ok(())
    }

    async fn push_manifest(
        &self,
        reference: &ImageReference,
        bytes: &[u8],
        media_type: &str,
        _credential: &Credential,
    ) -> Result<String> {
        let key = reference.full_reference();
        let delay = self.state.lock().delays.get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.failing_manifests.contains(&key) {
            return Err(transport(reference, "manifest upload rejected"));
        }
        if let ReferenceTarget::Digest(expected) = &reference.target {
            if !verify_digest(bytes, expected) {
                return Err(LabelModError::RegistryIntegrity {
                    digest: expected.clone(),
                    message: "manifest does not match digest reference".to_string(),
                });
            }
        }

        let digest = store_manifest(&mut state, reference, bytes, media_type);
        state.pushes.push(PushRecord::Manifest {
            reference: key,
            digest: digest.clone(),
        });
        Ok(format!(
            "/v2/{}/manifests/{}",
            reference.repository, digest
        ))
    }
}
