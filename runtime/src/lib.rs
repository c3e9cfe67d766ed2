//! label-mod runtime: registry-side image label mutation.
//!
//! Reads an image's manifest and config from a registry, rewrites the config
//! labels, and republishes the result without touching layers.

#![allow(clippy::result_large_err)]

pub mod oci;

pub use oci::{
    Authenticator, CancelFlag, Credential, CredentialStore, ImageReference, InspectOutcome,
    KeychainAuthenticator, LabelDelta, LabelMutator, MutationOutcome, OciRegistryClient,
    RegistryClient, StaticAuthenticator,
};

#[cfg(any(test, feature = "testing"))]
pub use oci::InMemoryRegistry;

/// label-mod runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
