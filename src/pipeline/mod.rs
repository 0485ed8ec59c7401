//! Pipeline orchestration: stage selection and the sequential driver.
//!
//! # Architecture
//!
//! - **Selection**: derives the active stage set for a run from the
//!   configured `steps` value, validated against the registry before
//!   anything executes
//! - **Driver**: iterates the registry in fixed ordinal order, resolves
//!   each active stage's parameters, invokes it through the stage
//!   contract and aborts on the first failure
//!
//! # Run flow
//!
//! 1. Validate configuration and compute the active stage set (fail-fast)
//! 2. Establish the run scope (grouping identifiers, shared data dir)
//! 3. For each active stage, in registry order: resolve parameters, then
//!    invoke the stage and block until it signals completion
//! 4. On failure, stop; completed stages' artifacts stay published
//! 5. Tear down the run scope whatever the outcome
//!
//! # Example
//!
//! ```rust,ignore
//! use mlforge::config::PipelineSettings;
//! use mlforge::pipeline::PipelineDriver;
//! use mlforge::stage::ProcessExecutor;
//!
//! let settings = PipelineSettings::from_file("config.yaml")?;
//! let driver = PipelineDriver::new(ProcessExecutor::new("."));
//! let report = driver.run(&settings).await?;
//! println!("run {} completed {} stages", report.run_id, report.completed());
//! ```

pub mod driver;
pub mod selection;

pub use driver::{PipelineDriver, PipelineError, RunReport, StageOutcome, StageStatus};
pub use selection::ActiveStageSet;
