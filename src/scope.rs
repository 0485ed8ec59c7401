//! Run scope: the shared execution context established once per run.
//!
//! The scope carries the project/run grouping identifiers and the shared
//! data directory every stage may read. It is an explicit value passed by
//! reference to each stage invocation rather than ambient process
//! environment, so the driver stays testable; the executor exports it to
//! child processes as environment variables at spawn time only.
//!
//! The scope is read-only after establishment. Cross-stage data flows
//! exclusively through the artifact store, never through the scope.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::PipelineSettings;

/// Environment variable naming the tracking project for child stages.
pub const ENV_PROJECT: &str = "WANDB_PROJECT";

/// Environment variable naming the run group for child stages.
pub const ENV_RUN_GROUP: &str = "WANDB_RUN_GROUP";

/// Environment variable naming the shared data directory for child stages.
pub const ENV_DATA_DIR: &str = "PATH_DATA";

/// Default shared data directory, relative to the project root.
const DEFAULT_DATA_DIR: &str = "data";

/// Shared, read-only execution context for one pipeline run.
#[derive(Debug)]
pub struct RunScope {
    /// Project grouping identifier, shared by every stage run.
    pub project: String,
    /// Run grouping (experiment) identifier.
    pub run_group: String,
    /// Shared data directory stages read from and write to. Side-channel
    /// parameter files also land here; they are not cleaned up with the
    /// scope.
    pub data_dir: PathBuf,
    /// Scratch working directory for stage processes, removed when the
    /// scope is dropped.
    scratch: TempDir,
}

impl RunScope {
    /// Establishes the scope for a run: resolves identifiers from
    /// configuration, creates the shared data directory if absent and
    /// allocates a scratch working directory.
    ///
    /// Called once before the first stage; the scratch directory is
    /// released on drop whatever the run outcome.
    pub fn establish(settings: &PipelineSettings, data_dir: Option<PathBuf>) -> io::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        if !data_dir.exists() {
            info!("Creating data directory {}", data_dir.display());
            fs::create_dir_all(&data_dir)?;
        }
        // Absolute so stages keep finding it after chdir into scratch.
        let data_dir = data_dir.canonicalize()?;

        let scratch = TempDir::new()?;
        debug!(
            "Run scope established (scratch: {})",
            scratch.path().display()
        );

        Ok(Self {
            project: settings.main.project_name.clone(),
            run_group: settings.main.experiment_name.clone(),
            data_dir,
            scratch,
        })
    }

    /// The scratch working directory stage processes run in.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// The scope as `(key, value)` environment pairs for a child stage.
    pub fn stage_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_PROJECT, self.project.clone()),
            (ENV_RUN_GROUP, self.run_group.clone()),
            (ENV_DATA_DIR, self.data_dir.display().to_string()),
        ]
    }
}
