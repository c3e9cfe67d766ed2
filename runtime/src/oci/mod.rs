//! OCI image label mutation.
//!
//! Everything needed to read and rewrite the labels of an image that lives
//! in a registry:
//!
//! - reference parsing and digest helpers
//! - manifest and config documents as immutable values
//! - credential sources and the [`Authenticator`] seam
//! - the [`RegistryClient`] seam and its `oci-distribution` implementation
//! - the [`LabelMutator`] engine and the outcomes it reports
//!
//! # Flow
//!
//! ```text
//! ┌───────────┐  resolve   ┌───────────────┐  fetch   ┌──────────────┐
//! │ reference │ ─────────▶ │ Authenticator │ ───────▶ │   Registry   │
//! └───────────┘            └───────────────┘          │   Client     │
//!                                                     └──────┬───────┘
//!                                  manifest + config         │
//!                     ┌──────────────────────────────────────┘
//!                     ▼
//!              ┌─────────────┐  new config + manifest   ┌──────────────┐
//!              │ LabelDelta  │ ───────────────────────▶ │ push blob,   │
//!              │   apply     │                          │ manifest,    │
//!              └─────────────┘                          │ extra tags   │
//!                                                       └──────────────┘
//! ```

pub mod auth;
pub mod credentials;
pub mod digest;
pub mod engine;
pub mod image_config;
pub mod labels;
pub mod manifest;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod outcome;
pub mod reference;
pub mod registry;

pub use auth::{Authenticator, Credential, KeychainAuthenticator, StaticAuthenticator};
pub use credentials::{CredentialStore, DockerConfig, StoredLogin};
pub use engine::{CancelFlag, LabelMutator};
pub use image_config::ImageConfig;
pub use labels::{parse_label_assignment, LabelChange, LabelDelta};
pub use manifest::{ConfigDescriptor, ImageManifest};
#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryRegistry;
pub use outcome::{InspectOutcome, MutationOutcome};
pub use reference::{ImageReference, ReferenceKind};
pub use registry::{FetchedManifest, OciRegistryClient, RegistryClient};
