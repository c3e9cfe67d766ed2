//! Label mutation engine.
//!
//! A mutation fetches an image, rewrites its config labels, and republishes
//! it as a new manifest. Layers are never transferred: only the config blob
//! and the manifest are uploaded.
//!
//! ```text
//! Resolved ─▶ Fetched ─▶ DiffComputed ─▶ ConfigPushed ─▶ ManifestDecided ─▶ TagsPushed ─▶ Done
//!     │          │             │               │                 │               │
//!     └──────────┴─────────────┴───────────────┴─────────────────┴───────────────┴─▶ Failed
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Notify;
use labelmod_core::config::EngineConfig;
use labelmod_core::error::{LabelModError, Result};

use super::auth::{Authenticator, Credential};
use super::digest::{sha256_digest, verify_digest};
use super::image_config::ImageConfig;
use super::labels::LabelDelta;
use super::manifest::ImageManifest;
use super::outcome::{InspectOutcome, MutationOutcome};
use super::reference::{ImageReference, ReferenceKind};
use super::registry::RegistryClient;

/// Shared flag that stops a running mutation from issuing further pushes.
///
/// Pushes already in flight complete; nothing is rolled back. Reads that are
/// still waiting on the registry are abandoned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        loop {
            // registered before the check so a concurrent cancel() is not missed
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationState {
    Resolved,
    Fetched,
    DiffComputed,
    ConfigPushed,
    ManifestDecided,
    TagsPushed,
    Done,
    Failed,
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolved => "resolved",
            Self::Fetched => "fetched",
            Self::DiffComputed => "diff_computed",
            Self::ConfigPushed => "config_pushed",
            Self::ManifestDecided => "manifest_decided",
            Self::TagsPushed => "tags_pushed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and logs each transition.
struct Progress<'a> {
    image_ref: &'a str,
    state: Option<MutationState>,
}

impl<'a> Progress<'a> {
    fn new(image_ref: &'a str) -> Self {
        Self {
            image_ref,
            state: None,
        }
    }

    fn advance(&mut self, next: MutationState) {
        match self.state {
            Some(from) => {
                tracing::debug!(image = self.image_ref, from = %from, to = %next, "Mutation state")
            }
            None => tracing::debug!(image = self.image_ref, to = %next, "Mutation state"),
        }
        self.state = Some(next);
    }
}

/// An image as fetched: manifest, config, and the digest it was served under.
struct FetchedImage {
    manifest: ImageManifest,
    config: ImageConfig,
    digest: String,
}

/// Reads and rewrites image labels through a [`RegistryClient`].
///
/// Credentials are resolved once per operation through the injected
/// [`Authenticator`]; nothing is cached between operations.
pub struct LabelMutator {
    registry: Arc<dyn RegistryClient>,
    authenticator: Arc<dyn Authenticator>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl LabelMutator {
    pub fn new(registry: Arc<dyn RegistryClient>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            registry,
            authenticator,
            config: EngineConfig::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that cancels this mutator's pushes when set.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Read the labels of `image` without writing anything.
    pub async fn inspect(&self, image: &str) -> InspectOutcome {
        let mut outcome = InspectOutcome::new(image);
        match self.read_labels(image).await {
            Ok((labels, digest)) => {
                outcome.success = true;
                outcome.current = labels;
                outcome.new_digest = Some(digest);
            }
            Err(e) => {
                tracing::debug!(image, error = %e, "Inspect failed");
                outcome.fail(&e);
            }
        }
        outcome
    }

    /// Current labels and manifest digest of `image`.
    pub async fn read_labels(&self, image: &str) -> Result<(BTreeMap<String, String>, String)> {
        let reference = ImageReference::parse(image)?;
        let credential = self.resolve_credential(&reference).await?;
        let fetched = self.fetch(&reference, &credential).await?;
        Ok((fetched.config.labels().clone(), fetched.digest))
    }

    /// Apply `delta` to `image` and republish it, then push it under every
    /// extra tag in `extra_tags` (same repository, in the given order).
    ///
    /// Failures are reported in the outcome, together with whatever progress
    /// was made before them.
    pub async fn mutate(
        &self,
        image: &str,
        delta: &LabelDelta,
        extra_tags: &[String],
    ) -> MutationOutcome {
        let mut outcome = MutationOutcome::new(image);
        let mut progress = Progress::new(image);

        match self
            .run_mutation(image, delta, extra_tags, &mut outcome, &mut progress)
            .await
        {
            Ok(()) => {
                outcome.success = true;
                progress.advance(MutationState::Done);
            }
            Err(e) => {
                tracing::debug!(image, error = %e, "Mutation failed");
                outcome.fail(&e);
                progress.advance(MutationState::Failed);
            }
        }
        outcome
    }

    async fn run_mutation(
        &self,
        image: &str,
        delta: &LabelDelta,
        extra_tags: &[String],
        outcome: &mut MutationOutcome,
        progress: &mut Progress<'_>,
    ) -> Result<()> {
        let reference = ImageReference::parse(image)?;
        let kind = reference.kind();
        let tag_refs = extra_tags
            .iter()
            .map(|tag| reference.with_tag(tag))
            .collect::<Result<Vec<_>>>()?;
        progress.advance(MutationState::Resolved);

        let credential = self.resolve_credential(&reference).await?;
        let fetched = self.fetch(&reference, &credential).await?;
        outcome.old_digest = Some(fetched.digest.clone());
        progress.advance(MutationState::Fetched);

        if kind == ReferenceKind::Digest && tag_refs.is_empty() {
            return Err(LabelModError::DigestWithoutTag(reference.full_reference()));
        }

        let change = delta.apply(fetched.config.labels());
        outcome.removed = change.removed.clone();
        outcome.updated = change.updated.clone();
        if delta.is_pure_removal() && change.removed.is_empty() {
            return Err(LabelModError::NoOpMutation(delta.removals.clone()));
        }
        progress.advance(MutationState::DiffComputed);

        let new_config = fetched.config.with_labels(change.labels);
        let config_bytes = new_config.to_bytes()?;
        let config_digest = sha256_digest(&config_bytes);
        let config_size = config_bytes.len() as u64;

        if config_digest == fetched.manifest.config().digest {
            tracing::debug!(image, digest = %config_digest, "Config unchanged, skipping blob upload");
        } else {
            self.check_cancelled()?;
            tracing::info!(reference = %reference, digest = %config_digest, size = config_size, "Pushing config blob");
            self.with_timeout(
                &reference,
                "config blob push",
                self.registry
                    .push_blob(&reference, &config_bytes, &config_digest, &credential),
            )
            .await?;
        }
        progress.advance(MutationState::ConfigPushed);

        let new_manifest = fetched.manifest.with_config(&config_digest, config_size);
        let manifest_bytes = new_manifest.to_bytes()?;
        let new_digest = sha256_digest(&manifest_bytes);
        outcome.new_digest = Some(new_digest.clone());

        if kind == ReferenceKind::Tag {
            self.check_cancelled()?;
            tracing::info!(reference = %reference, digest = %new_digest, "Publishing manifest");
            self.with_timeout(
                &reference,
                "manifest push",
                self.registry.push_manifest(
                    &reference,
                    &manifest_bytes,
                    new_manifest.media_type(),
                    &credential,
                ),
            )
            .await?;
        }
        progress.advance(MutationState::ManifestDecided);

        self.push_tags(
            &tag_refs,
            &manifest_bytes,
            new_manifest.media_type(),
            &credential,
            &mut outcome.tagged_as,
        )
        .await?;
        progress.advance(MutationState::TagsPushed);

        tracing::info!(
            reference = %reference,
            old_digest = %fetched.digest,
            new_digest = %new_digest,
            tags = outcome.tagged_as.len(),
            "Labels updated"
        );
        Ok(())
    }

    /// Push the same manifest under every tag reference.
    ///
    /// Up to `tag_concurrency` pushes run at once, but results are taken in
    /// the order the tags were given: `tagged_as` only ever holds the prefix
    /// of tags that succeeded before the first failure.
    async fn push_tags(
        &self,
        tag_refs: &[ImageReference],
        manifest_bytes: &[u8],
        media_type: &str,
        credential: &Credential,
        tagged_as: &mut Vec<String>,
    ) -> Result<()> {
        let concurrency = self.config.tag_concurrency.max(1);

        let mut results = stream::iter(tag_refs.iter().map(|tag_ref| async move {
            self.check_cancelled()?;
            tracing::info!(reference = %tag_ref, "Pushing tag");
            self.with_timeout(
                tag_ref,
                "tag push",
                self.registry
                    .push_manifest(tag_ref, manifest_bytes, media_type, credential),
            )
            .await?;
            Ok::<_, LabelModError>(tag_ref.full_reference())
        }))
        .buffered(concurrency);

        while let Some(result) = results.next().await {
            tagged_as.push(result?);
        }
        Ok(())
    }

    async fn resolve_credential(&self, reference: &ImageReference) -> Result<Credential> {
        self.authenticator
            .resolve(&reference.registry, &reference.repository)
            .await
    }

    /// Fetch manifest and config, giving up as soon as the cancel flag is set.
    async fn fetch(&self, reference: &ImageReference, credential: &Credential) -> Result<FetchedImage> {
        tokio::select! {
            fetched = self.fetch_image(reference, credential) => fetched,
            _ = self.cancel.cancelled() => Err(LabelModError::Cancelled(format!(
                "interrupted while reading {}",
                reference
            ))),
        }
    }

    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<FetchedImage> {
        let fetched = self.registry.fetch_manifest(reference, credential).await?;
        let digest = sha256_digest(&fetched.bytes);

        if let Some(expected) = reference.digest() {
            if digest != expected {
                return Err(LabelModError::RegistryIntegrity {
                    digest: expected.to_string(),
                    message: format!("registry served a manifest hashing to {}", digest),
                });
            }
        }

        let manifest = ImageManifest::from_bytes(&fetched.bytes, fetched.media_type.as_deref())?;
        tracing::debug!(
            reference = %reference,
            digest = %digest,
            media_type = manifest.media_type(),
            layers = manifest.layer_count(),
            "Fetched manifest"
        );

        let descriptor = manifest.config();
        let config_bytes = self
            .registry
            .fetch_blob(reference, descriptor, credential)
            .await?;
        if !verify_digest(&config_bytes, &descriptor.digest) {
            return Err(LabelModError::RegistryIntegrity {
                digest: descriptor.digest.clone(),
                message: format!(
                    "config blob hashes to {}",
                    sha256_digest(&config_bytes)
                ),
            });
        }
        let config = ImageConfig::from_bytes(&config_bytes)?;

        Ok(FetchedImage {
            manifest,
            config,
            digest,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LabelModError::Cancelled(
                "interrupted before all pushes were issued".to_string(),
            ));
        }
        Ok(())
    }

    async fn with_timeout<T, F>(&self, reference: &ImageReference, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.push_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                LabelModError::Transport {
                    registry: reference.registry.clone(),
                    message: format!("{} timed out after {}s", what, limit.as_secs()),
                }
            })?,
            None => fut.await,
        }
    }
}
