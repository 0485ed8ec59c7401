//! mlforge: configuration-driven ML pipeline orchestrator.
//!
//! This library drives a fixed, ordered sequence of data-processing and
//! model-training stages, each invoked as an isolated external unit with
//! a flat resolved parameter set. Artifacts flow between stages through
//! an external store, addressed by `name:version_or_tag` strings; any
//! stage failure aborts the remaining sequence.

// Core modules
pub mod artifact;
pub mod cli;
pub mod config;
pub mod params;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod stage;

// Re-export commonly used types
pub use artifact::{ArtifactRef, ArtifactSpec};
pub use config::{ConfigError, PipelineSettings, StepSelection};
pub use params::{ParamResolver, ParamValue, ResolveError, ResolvedParams};
pub use pipeline::{PipelineDriver, PipelineError, RunReport};
pub use registry::{StageDescriptor, StageKind, StageRegistry};
pub use scope::RunScope;
pub use stage::{ProcessExecutor, StageError, StageExecutor};
