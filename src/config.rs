//! Run configuration for the pipeline driver.
//!
//! Configuration is a hierarchical YAML document with four recognized
//! groups: `main` (project/run grouping and stage selection), `etl`
//! (cleaning thresholds), `data_check` (validation threshold) and
//! `modeling` (split ratios, seed, nested hyperparameter block).
//!
//! Loading is strict: unknown keys and missing required keys fail before
//! any stage executes.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Sentinel stage-selection value meaning "every stage included in the
/// `all` shorthand".
pub const SELECT_ALL: &str = "all";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is malformed or missing required keys.
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A stage name in the selection does not exist in the registry.
    #[error("Unknown stage '{0}' in steps selection")]
    UnknownStage(String),
}

/// Which stages to run: the `all` shorthand or an explicit set of names.
///
/// Accepted YAML forms: the string `all`, a comma-separated string
/// (`"basic_cleaning,data_check"`), or a list of names. Names are
/// validated against the registry by the driver before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSelection {
    /// Every stage flagged as included in the `all` shorthand.
    All,
    /// Exactly the named stages, executed in registry order.
    Explicit(Vec<String>),
}

impl StepSelection {
    /// Parses a selection from a single string: the `all` sentinel or a
    /// comma-separated list. Empty segments are ignored, so `""` is the
    /// valid empty selection.
    pub fn parse(value: &str) -> Self {
        if value.trim() == SELECT_ALL {
            return StepSelection::All;
        }
        let names = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        StepSelection::Explicit(names)
    }
}

impl<'de> Deserialize<'de> for StepSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::One(s) => Ok(StepSelection::parse(&s)),
            Raw::Many(names) => Ok(StepSelection::Explicit(
                names
                    .into_iter()
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
            )),
        }
    }
}

/// `main` group: project/run grouping identifiers and stage selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainSettings {
    /// Project under which all runs are grouped in the tracking backend.
    pub project_name: String,
    /// Run group (experiment) identifier for this pipeline run.
    pub experiment_name: String,
    /// Stages to execute this run.
    pub steps: StepSelection,
}

/// `etl` group: thresholds applied by the cleaning stage and re-checked
/// by the validation stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtlSettings {
    /// Fraction of the raw dataset to sample at download time.
    pub sample: f64,
    /// Price floor: rows below are clipped.
    pub min_price: f64,
    /// Price cap: rows above are clipped.
    pub max_price: f64,
    /// Southern latitude bound for valid rows.
    pub min_lat: f64,
    /// Northern latitude bound for valid rows.
    pub max_lat: f64,
    /// Western longitude bound for valid rows.
    pub min_lon: f64,
    /// Eastern longitude bound for valid rows.
    pub max_lon: f64,
}

/// `data_check` group: distribution-drift validation threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataCheckSettings {
    /// Maximum allowed KL divergence between the new and reference data.
    pub kl_threshold: f64,
}

/// `modeling` group: split ratios, seed and the model hyperparameter block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelingSettings {
    /// Fraction of the data held out as the test set.
    pub test_size: f64,
    /// Fraction of the remaining data held out for validation.
    pub val_size: f64,
    /// Seed shared by every randomized stage.
    pub random_seed: i64,
    /// Column used for stratified splitting.
    pub stratify_by: String,
    /// Cap on the number of TF-IDF features extracted from text columns.
    pub max_tfidf_features: i64,
    /// Nested hyperparameter block, kept opaque and forwarded to the
    /// training stage through a side-channel file (the stage boundary
    /// only accepts flat scalars).
    pub random_forest: serde_yaml::Value,
}

/// Complete, validated run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    pub main: MainSettings,
    pub etl: EtlSettings,
    pub data_check: DataCheckSettings,
    pub modeling: ModelingSettings,
}

impl PipelineSettings {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, the document is
    /// malformed, a required key is missing, an unknown key is present,
    /// or a value is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses and validates configuration from a YAML string.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.project_name.is_empty() {
            return Err(invalid("main.project_name", "cannot be empty"));
        }
        if self.main.experiment_name.is_empty() {
            return Err(invalid("main.experiment_name", "cannot be empty"));
        }

        if !(0.0..=1.0).contains(&self.etl.sample) {
            return Err(invalid("etl.sample", "must be a fraction in [0, 1]"));
        }
        if self.etl.min_price >= self.etl.max_price {
            return Err(invalid("etl.min_price", "must be below etl.max_price"));
        }
        if self.etl.min_lat >= self.etl.max_lat {
            return Err(invalid("etl.min_lat", "must be below etl.max_lat"));
        }
        if self.etl.min_lon >= self.etl.max_lon {
            return Err(invalid("etl.min_lon", "must be below etl.max_lon"));
        }

        if self.data_check.kl_threshold <= 0.0 {
            return Err(invalid("data_check.kl_threshold", "must be positive"));
        }

        if !(0.0..1.0).contains(&self.modeling.test_size) || self.modeling.test_size == 0.0 {
            return Err(invalid("modeling.test_size", "must be in (0, 1)"));
        }
        if !(0.0..1.0).contains(&self.modeling.val_size) || self.modeling.val_size == 0.0 {
            return Err(invalid("modeling.val_size", "must be in (0, 1)"));
        }
        if self.modeling.stratify_by.is_empty() {
            return Err(invalid("modeling.stratify_by", "cannot be empty"));
        }
        if self.modeling.max_tfidf_features <= 0 {
            return Err(invalid("modeling.max_tfidf_features", "must be positive"));
        }
        if !self.modeling.random_forest.is_mapping() {
            return Err(invalid("modeling.random_forest", "must be a mapping"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
