//! The stage contract: the boundary between the driver and the external
//! executable units it orchestrates.
//!
//! Each stage is opaque to the driver. The contract is: flat scalar named
//! parameters in, a success/failure signal out. On success the stage has
//! published its declared output artifacts; on failure it has published
//! nothing. The driver never inspects stage internals.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::params::ResolvedParams;
use crate::registry::StageDescriptor;
use crate::scope::RunScope;

/// Errors signalled by a stage invocation.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage process could not be started.
    #[error("Failed to spawn stage process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The stage terminated with a non-success status.
    #[error("Stage process exited with status {status}")]
    ExitStatus { status: String },
}

/// Executes one stage as an isolated unit.
///
/// The call blocks (from the driver's perspective) until the stage
/// signals completion; there is no mid-stage cancellation point.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Invokes `stage` with `params` inside the run `scope`.
    async fn invoke(
        &self,
        stage: &StageDescriptor,
        params: &ResolvedParams,
        scope: &RunScope,
    ) -> Result<(), StageError>;
}

#[async_trait]
impl<T: StageExecutor + ?Sized> StageExecutor for std::sync::Arc<T> {
    async fn invoke(
        &self,
        stage: &StageDescriptor,
        params: &ResolvedParams,
        scope: &RunScope,
    ) -> Result<(), StageError> {
        (**self).invoke(stage, params, scope).await
    }
}

/// Default executor: runs each stage as an MLflow project via the
/// `mlflow run` CLI, one blocking subprocess per stage.
pub struct ProcessExecutor {
    /// Root directory containing the per-stage project subdirectories.
    project_root: PathBuf,
    /// Binary used to launch stage projects.
    mlflow_bin: PathBuf,
}

impl ProcessExecutor {
    /// Creates an executor resolving stage targets under `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            mlflow_bin: PathBuf::from("mlflow"),
        }
    }

    /// Overrides the launcher binary (e.g. a wrapper script in tests).
    pub fn with_mlflow_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.mlflow_bin = bin.into();
        self
    }
}

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn invoke(
        &self,
        stage: &StageDescriptor,
        params: &ResolvedParams,
        scope: &RunScope,
    ) -> Result<(), StageError> {
        let target = self.project_root.join(stage.target);

        let mut command = tokio::process::Command::new(&self.mlflow_bin);
        command
            .arg("run")
            .arg(&target)
            .arg("-e")
            .arg(stage.entry_point)
            .current_dir(scope.scratch_dir())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        for (key, value) in params.iter() {
            command.arg("-P").arg(format!("{}={}", key, value));
        }
        for (key, value) in scope.stage_env() {
            command.env(key, value);
        }

        debug!(
            "Invoking stage '{}' at {} with {} parameters",
            stage.name(),
            target.display(),
            params.len()
        );

        let status = command.status().await?;
        if !status.success() {
            return Err(StageError::ExitStatus {
                status: status.to_string(),
            });
        }

        info!("Stage process for '{}' exited cleanly", stage.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_settings;
    use crate::params::ParamResolver;
    use crate::registry::StageRegistry;
    use tempfile::TempDir;

    // `/bin/true` and `/bin/false` stand in for the mlflow launcher: the
    // contract only cares about the exit status.

    #[tokio::test]
    async fn test_successful_process_signals_success() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = RunScope::establish(&settings, Some(root.path().join("data"))).unwrap();
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("download").unwrap();
        let params = resolver.resolve(stage).unwrap();

        let executor = ProcessExecutor::new(root.path()).with_mlflow_bin("true");
        assert!(executor.invoke(stage, &params, &scope).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_process_signals_exit_status() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = RunScope::establish(&settings, Some(root.path().join("data"))).unwrap();
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("download").unwrap();
        let params = resolver.resolve(stage).unwrap();

        let executor = ProcessExecutor::new(root.path()).with_mlflow_bin("false");
        let err = executor.invoke(stage, &params, &scope).await.unwrap_err();
        assert!(matches!(err, StageError::ExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_missing_launcher_signals_spawn_error() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = RunScope::establish(&settings, Some(root.path().join("data"))).unwrap();
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("download").unwrap();
        let params = resolver.resolve(stage).unwrap();

        let executor =
            ProcessExecutor::new(root.path()).with_mlflow_bin("/nonexistent/mlflow-launcher");
        let err = executor.invoke(stage, &params, &scope).await.unwrap_err();
        assert!(matches!(err, StageError::Spawn(_)));
    }
}
