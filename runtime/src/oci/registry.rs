//! Registry access.
//!
//! [`RegistryClient`] is the seam between the mutation engine and the
//! network. [`OciRegistryClient`] implements it on top of the
//! `oci-distribution` crate and maps its failures onto [`LabelModError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use labelmod_core::config::RegistryConfig;
use labelmod_core::error::{LabelModError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use parking_lot::Mutex;

use super::auth::Credential;
use super::manifest::{ConfigDescriptor, ACCEPTED_MANIFEST_MEDIA_TYPES};
use super::reference::ImageReference;

/// Manifest bytes exactly as served, with the media type the registry
/// reported when it is known.
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

/// Operations the mutation engine needs from a registry.
///
/// Implementations must not retry; every error is reported as is.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the manifest `reference` points at.
    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<FetchedManifest>;

    /// Fetch a blob from the repository of `reference`.
    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &ConfigDescriptor,
        credential: &Credential,
    ) -> Result<Vec<u8>>;

    /// Upload a blob whose content digest is `digest`.
    async fn push_blob(
        &self,
        reference: &ImageReference,
        data: &[u8],
        digest: &str,
        credential: &Credential,
    ) -> Result<()>;

    /// Upload a manifest under the tag of `reference`. Returns its location.
    async fn push_manifest(
        &self,
        reference: &ImageReference,
        bytes: &[u8],
        media_type: &str,
        credential: &Credential,
    ) -> Result<String>;
}

/// [`RegistryClient`] backed by `oci-distribution`.
///
/// One client is kept per registry host so bearer tokens obtained for the
/// first request are reused by the following ones.
pub struct OciRegistryClient {
    config: RegistryConfig,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl OciRegistryClient {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, registry: &str) -> Arc<Client> {
        let mut clients = self.clients.lock();
        clients
            .entry(registry.to_string())
            .or_insert_with(|| {
                let protocol = if self.config.is_insecure(registry) {
                    tracing::debug!(registry, "Using plain HTTP for registry");
                    ClientProtocol::Http
                } else {
                    ClientProtocol::Https
                };
                Arc::new(Client::new(ClientConfig {
                    protocol,
                    ..Default::default()
                }))
            })
            .clone()
    }

    async fn authenticate(
        &self,
        client: &Client,
        oci_ref: &Reference,
        reference: &ImageReference,
        credential: &Credential,
        operation: RegistryOperation,
    ) -> Result<()> {
        client
            .auth(oci_ref, &to_oci_auth(credential), operation)
            .await
            .map_err(|e| map_oci_error(&reference.registry, &reference.full_reference(), e))?;
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<FetchedManifest> {
        let oci_ref = to_oci_reference(reference)?;
        let client = self.client_for(&reference.registry);

        tracing::debug!(reference = %reference, "Fetching manifest");
        let (bytes, _digest) = client
            .pull_manifest_raw(&oci_ref, &to_oci_auth(credential), ACCEPTED_MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|e| map_oci_error(&reference.registry, &reference.full_reference(), e))?;

        Ok(FetchedManifest {
            bytes,
            media_type: None,
        })
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &ConfigDescriptor,
        credential: &Credential,
    ) -> Result<Vec<u8>> {
        let oci_ref = to_oci_reference(reference)?;
        let client = self.client_for(&reference.registry);
        self.authenticate(&client, &oci_ref, reference, credential, RegistryOperation::Pull)
            .await?;

        let oci_descriptor = OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: descriptor.size.try_into().map_err(|_| {
                LabelModError::InvalidDocument(format!(
                    "blob size {} out of range",
                    descriptor.size
                ))
            })?,
            ..Default::default()
        };

        tracing::debug!(reference = %reference, digest = %descriptor.digest, "Fetching blob");
        let mut data: Vec<u8> = Vec::new();
        client
            .pull_blob(&oci_ref, &oci_descriptor, &mut data)
            .await
            .map_err(|e| map_oci_error(&reference.registry, &descriptor.digest, e))?;
        Ok(data)
    }

    async fn push_blob(
        &self,
        reference: &ImageReference,
        data: &[u8],
        digest: &str,
        credential: &Credential,
    ) -> Result<()> {
        let oci_ref = to_oci_reference(reference)?;
        let client = self.client_for(&reference.registry);
        self.authenticate(&client, &oci_ref, reference, credential, RegistryOperation::Push)
            .await?;

        let location = client
            .push_blob(&oci_ref, data, digest)
            .await
            .map_err(|e| map_oci_error(&reference.registry, digest, e))?;

        tracing::debug!(reference = %reference, digest, location = %location, "Blob pushed");
        Ok(())
    }

    async fn push_manifest(
        &self,
        reference: &ImageReference,
        bytes: &[u8],
        media_type: &str,
        credential: &Credential,
    ) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let client = self.client_for(&reference.registry);
        self.authenticate(&client, &oci_ref, reference, credential, RegistryOperation::Push)
            .await?;

        let content_type = media_type.parse().map_err(|_| {
            LabelModError::InvalidDocument(format!(
                "Manifest media type '{}' is not a valid header value",
                media_type
            ))
        })?;

        let location = client
            .push_manifest_raw(&oci_ref, bytes.to_vec(), content_type)
            .await
            .map_err(|e| map_oci_error(&reference.registry, &reference.full_reference(), e))?;

        Ok(location)
    }
}

fn to_oci_auth(credential: &Credential) -> OciRegistryAuth {
    match credential {
        Credential::Anonymous => OciRegistryAuth::Anonymous,
        Credential::Basic { username, password } => {
            OciRegistryAuth::Basic(username.clone(), password.clone())
        }
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = reference.full_reference();
    ref_str.parse::<Reference>().map_err(|e| {
        LabelModError::InvalidReference(format!("Invalid OCI reference '{}': {}", ref_str, e))
    })
}

/// Translate an `oci-distribution` failure. `subject` names what was being
/// fetched or pushed (a reference or a digest).
fn map_oci_error(registry: &str, subject: &str, err: OciDistributionError) -> LabelModError {
    match err {
        OciDistributionError::AuthenticationFailure(message) => LabelModError::Authentication {
            registry: registry.to_string(),
            message,
        },
        OciDistributionError::UnauthorizedError { .. } => LabelModError::Authentication {
            registry: registry.to_string(),
            message: err.to_string(),
        },
        OciDistributionError::ImageManifestNotFoundError(_) => {
            LabelModError::NotFound(subject.to_string())
        }
        OciDistributionError::RegistryError { ref envelope, .. } => {
            let codes: Vec<&OciErrorCode> = envelope.errors.iter().map(|e| &e.code).collect();
            if codes
                .iter()
                .any(|c| matches!(c, OciErrorCode::DigestInvalid | OciErrorCode::SizeInvalid))
            {
                LabelModError::RegistryIntegrity {
                    digest: subject.to_string(),
                    message: err.to_string(),
                }
            } else if codes.iter().any(|c| {
                matches!(
                    c,
                    OciErrorCode::ManifestUnknown
                        | OciErrorCode::BlobUnknown
                        | OciErrorCode::NameUnknown
                )
            }) {
                LabelModError::NotFound(subject.to_string())
            } else if codes
                .iter()
                .any(|c| matches!(c, OciErrorCode::Unauthorized | OciErrorCode::Denied))
            {
                LabelModError::Authentication {
                    registry: registry.to_string(),
                    message: err.to_string(),
                }
            } else {
                LabelModError::Transport {
                    registry: registry.to_string(),
                    message: err.to_string(),
                }
            }
        }
        OciDistributionError::ServerError { code, .. } if code == 404 => {
            LabelModError::NotFound(subject.to_string())
        }
        OciDistributionError::ServerError { code, .. } if code == 401 || code == 403 => {
            LabelModError::Authentication {
                registry: registry.to_string(),
                message: err.to_string(),
            }
        }
        other => LabelModError::Transport {
            registry: registry.to_string(),
            message: other.to_string(),
        },
    }
}
