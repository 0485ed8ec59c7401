//! The pipeline driver: sequential, fail-fast execution of the active
//! stage set.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{ConfigError, PipelineSettings};
use crate::params::{ParamResolver, ResolveError};
use crate::registry::StageRegistry;
use crate::scope::RunScope;
use crate::stage::{StageError, StageExecutor};

use super::selection::ActiveStageSet;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration: unknown stage name, malformed selection or
    /// bad value. Raised before any stage executes.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Parameter resolution failed for a stage. Raised before that stage
    /// is invoked.
    #[error("Parameter resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// The run scope could not be established.
    #[error("Failed to establish run scope: {0}")]
    Scope(#[source] std::io::Error),

    /// A stage signalled failure. Later stages never ran; earlier
    /// stages' artifacts stay published.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// The failing stage's name, when the run got as far as executing one.
    pub fn failing_stage(&self) -> Option<&str> {
        match self {
            PipelineError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Final status of one registry stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage ran and signalled success.
    Completed,
    /// Stage ran and signalled failure; the run stopped here.
    Failed,
    /// Stage was not in the active set.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one registry stage within a run.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Registry name of the stage.
    pub stage: &'static str,
    /// Final status.
    pub status: StageStatus,
    /// Wall-clock duration, zero for skipped stages.
    pub duration: Duration,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Per-stage outcomes, in registry order.
    pub outcomes: Vec<StageOutcome>,
}

impl RunReport {
    /// Number of stages that ran and completed.
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == StageStatus::Completed)
            .count()
    }
}

/// Drives one pipeline run: selection, scope, sequential invocation,
/// fail-fast propagation.
pub struct PipelineDriver<E: StageExecutor> {
    registry: StageRegistry,
    executor: E,
    data_dir: Option<PathBuf>,
}

impl<E: StageExecutor> PipelineDriver<E> {
    /// Creates a driver over the built-in registry.
    pub fn new(executor: E) -> Self {
        Self {
            registry: StageRegistry::builtin(),
            executor,
            data_dir: None,
        }
    }

    /// Overrides the shared data directory (default: `./data`).
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Runs the active stage set to completion or first failure.
    ///
    /// Stages execute strictly sequentially in registry ordinal order;
    /// each invocation blocks until the stage signals completion. The
    /// first failure aborts the remainder — artifacts already published
    /// by completed stages are never rolled back. An empty active set
    /// completes successfully with zero invocations.
    ///
    /// # Errors
    ///
    /// `PipelineError::Config` and `PipelineError::Resolve` are raised
    /// before any (respectively, the affected) stage executes;
    /// `PipelineError::Stage` carries the failing stage's name and its
    /// underlying error.
    pub async fn run(&self, settings: &PipelineSettings) -> Result<RunReport, PipelineError> {
        settings.validate()?;
        let active = ActiveStageSet::from_selection(&settings.main.steps, &self.registry)?;

        let run_id = Uuid::new_v4();
        info!(
            "Starting run {} with {} active stage(s): [{}]",
            run_id,
            active.len(),
            active.names().collect::<Vec<_>>().join(", ")
        );

        // Scope teardown is RAII: the scratch directory is released when
        // `scope` drops, on the error paths below included.
        let scope = RunScope::establish(settings, self.data_dir.clone())
            .map_err(PipelineError::Scope)?;
        let resolver = ParamResolver::new(&self.registry, settings, &scope);

        let mut report = RunReport {
            run_id,
            started_at: Utc::now(),
            outcomes: Vec::with_capacity(self.registry.stages().len()),
        };

        for stage in self.registry.stages() {
            if !active.contains(stage) {
                debug!("Skipping stage '{}'", stage.name());
                report.outcomes.push(StageOutcome {
                    stage: stage.name(),
                    status: StageStatus::Skipped,
                    duration: Duration::ZERO,
                });
                continue;
            }

            let params = resolver.resolve(stage)?;
            info!("Running stage '{}'", stage.name());
            let start = Instant::now();

            match self.executor.invoke(stage, &params, &scope).await {
                Ok(()) => {
                    let duration = start.elapsed();
                    info!(
                        "SUCCESS: Finished {} step in {:.1?}",
                        stage.name(),
                        duration
                    );
                    report.outcomes.push(StageOutcome {
                        stage: stage.name(),
                        status: StageStatus::Completed,
                        duration,
                    });
                }
                Err(source) => {
                    error!("Stage '{}' failed: {}", stage.name(), source);
                    return Err(PipelineError::Stage {
                        stage: stage.name().to_string(),
                        source,
                    });
                }
            }
        }

        info!(
            "Run {} completed: {} stage(s) executed",
            run_id,
            report.completed()
        );
        Ok(report)
    }
}
