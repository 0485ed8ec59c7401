//! Artifact references: the addressing scheme stages use to find each
//! other's outputs.
//!
//! An artifact is a named, versioned object (dataset, trained model) held
//! by the external artifact store. The driver never talks to the store
//! itself — it only constructs `name:version_or_tag` strings and passes
//! them to stages as parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbolic tag for the most recent version of an artifact.
pub const TAG_LATEST: &str = "latest";

/// Symbolic tag for the pinned reference version used by data validation.
pub const TAG_REFERENCE: &str = "reference";

/// Symbolic tag for a model that was promoted to production.
pub const TAG_PROD: &str = "prod";

/// An immutable `(name, version_or_tag)` pair addressing one artifact.
///
/// A new version of an artifact is a new `ArtifactRef`, never a mutation
/// of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact name as registered in the store (e.g. `clean_sample.csv`).
    pub name: String,
    /// Monotonic version identifier or symbolic tag (`latest`, `reference`, `prod`).
    pub version: String,
}

impl ArtifactRef {
    /// Creates a reference to an explicit version or tag.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        debug_assert!(!name.is_empty(), "artifact name must be non-empty");
        Self { name, version }
    }

    /// References the most recent version of `name`.
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, TAG_LATEST)
    }

    /// References the pinned `reference` version of `name`.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, TAG_REFERENCE)
    }

    /// References the production-promoted version of `name`.
    pub fn prod(name: impl Into<String>) -> Self {
        Self::new(name, TAG_PROD)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Static declaration of a stage output: what the stage publishes to the
/// artifact store on success.
///
/// Used for parameter resolution (output name, type and description are
/// passed to the stage) and for structural upstream validation (a later
/// stage may only consume names declared by an earlier one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Artifact name under which the output is published.
    pub name: &'static str,
    /// Artifact-store type string (e.g. `raw_data`, `model_export`).
    pub kind: &'static str,
    /// Human-readable description logged alongside the artifact.
    pub description: &'static str,
}

impl ArtifactSpec {
    /// Returns a `latest`-tagged reference to this output.
    pub fn as_latest(&self) -> ArtifactRef {
        ArtifactRef::latest(self.name)
    }
}
