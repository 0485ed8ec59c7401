//! Per-stage parameter resolution.
//!
//! The stage boundary only accepts flat scalar named parameters. The
//! resolver builds that flat map for each stage from three sources:
//! literals tied to the stage (output artifact names and types), paths
//! into the global configuration (thresholds, ratios, seed), and
//! artifact references to upstream outputs rendered as `name:tag`
//! strings.
//!
//! Nested structured configuration (the model hyperparameter block) is
//! serialized to a uniquely named JSON file and passed by path — the
//! marshal/unmarshal pair lives here so it can be tested independently
//! of the driver. The file is written into the shared data directory and
//! is not deleted automatically.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::artifact::ArtifactRef;
use crate::config::PipelineSettings;
use crate::registry::{StageDescriptor, StageKind, StageRegistry};
use crate::scope::RunScope;

/// Errors raised while building a stage's parameter set.
///
/// All variants are configuration-time failures: they are raised before
/// the stage is invoked and abort the run.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A consumed artifact name is not declared by any earlier stage.
    #[error("Stage '{stage}' consumes artifact '{artifact}' which no earlier stage produces")]
    UnresolvedArtifact { stage: String, artifact: String },

    /// The side-channel parameter file could not be written or read.
    #[error("Side-channel file error at '{path}': {source}")]
    SideChannel {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The structured parameter block could not be serialized.
    #[error("Failed to serialize structured parameters: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One scalar parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Path(PathBuf),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl From<&ArtifactRef> for ParamValue {
    fn from(artifact: &ArtifactRef) -> Self {
        ParamValue::Str(artifact.to_string())
    }
}

/// The flat, ordered parameter map for one stage invocation.
///
/// Built fresh per invocation and discarded afterwards; deterministic for
/// a given configuration except for the side-channel file path, which is
/// unique per resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParams(BTreeMap<String, ParamValue>);

impl ResolvedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<PathBuf> for ParamValue {
    fn from(p: PathBuf) -> Self {
        ParamValue::Path(p)
    }
}

/// Serializes a structured parameter block to a uniquely named JSON file
/// under `dir` and returns the file's absolute path.
///
/// The caller passes the path to the stage in place of the nested value;
/// the file is not deleted automatically.
pub fn marshal_side_channel<T: Serialize>(value: &T, dir: &Path) -> Result<PathBuf, ResolveError> {
    let path = dir.join(format!("rf_config-{}.json", Uuid::new_v4()));
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).map_err(|source| ResolveError::SideChannel {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Serialized structured parameters to {}", path.display());
    Ok(path)
}

/// Reads a side-channel file back into a JSON value. Counterpart of
/// [`marshal_side_channel`]; stages use the equivalent of this to recover
/// the structure behind the path parameter.
pub fn unmarshal_side_channel(path: &Path) -> Result<serde_json::Value, ResolveError> {
    let raw = fs::read_to_string(path).map_err(|source| ResolveError::SideChannel {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Builds the exact parameter set for each stage of a run.
pub struct ParamResolver<'a> {
    registry: &'a StageRegistry,
    settings: &'a PipelineSettings,
    scope: &'a RunScope,
}

impl<'a> ParamResolver<'a> {
    pub fn new(
        registry: &'a StageRegistry,
        settings: &'a PipelineSettings,
        scope: &'a RunScope,
    ) -> Self {
        Self {
            registry,
            settings,
            scope,
        }
    }

    /// Resolves the full parameter set for `stage`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::UnresolvedArtifact` if the stage consumes
    /// an artifact name no earlier registry stage declares, or a
    /// serialization error if the side-channel file cannot be produced.
    /// Either way the stage is never invoked.
    pub fn resolve(&self, stage: &StageDescriptor) -> Result<ResolvedParams, ResolveError> {
        self.check_upstream(stage)?;

        let etl = &self.settings.etl;
        let modeling = &self.settings.modeling;
        let mut params = ResolvedParams::new();

        match stage.kind {
            StageKind::Download => {
                let output = &stage.produces[0];
                params.insert("sample", etl.sample);
                params.insert("artifact_name", output.name);
                params.insert("artifact_type", output.kind);
                params.insert("artifact_description", output.description);
            }
            StageKind::BasicCleaning => {
                let output = &stage.produces[0];
                params.insert("input_artifact", &ArtifactRef::latest(stage.consumes[0]));
                params.insert("output_artifact", output.name);
                params.insert("output_type", output.kind);
                params.insert("output_description", output.description);
                self.insert_bounds(&mut params);
            }
            StageKind::DataCheck => {
                params.insert("csv", &ArtifactRef::latest(stage.consumes[0]));
                params.insert("ref", &ArtifactRef::reference(stage.consumes[0]));
                params.insert("kl_threshold", self.settings.data_check.kl_threshold);
                self.insert_bounds(&mut params);
            }
            StageKind::DataSplit => {
                params.insert("input", &ArtifactRef::latest(stage.consumes[0]));
                params.insert("test_size", modeling.test_size);
                params.insert("random_seed", modeling.random_seed);
                params.insert("stratify_by", modeling.stratify_by.as_str());
            }
            StageKind::TrainRandomForest => {
                let rf_config =
                    marshal_side_channel(&modeling.random_forest, &self.scope.data_dir)?;
                params.insert(
                    "trainval_artifact",
                    &ArtifactRef::latest(stage.consumes[0]),
                );
                params.insert("val_size", modeling.val_size);
                params.insert("random_seed", modeling.random_seed);
                params.insert("stratify_by", modeling.stratify_by.as_str());
                params.insert("rf_config", rf_config);
                params.insert("max_tfidf_features", modeling.max_tfidf_features);
                params.insert("output_artifact", stage.produces[0].name);
            }
            StageKind::TestRegressionModel => {
                params.insert("mlflow_model", &ArtifactRef::prod(stage.consumes[0]));
                params.insert("test_dataset", &ArtifactRef::latest(stage.consumes[1]));
            }
        }

        debug_assert!(
            stage
                .required_params()
                .iter()
                .all(|key| params.contains_key(key)),
            "resolved parameter set for '{}' is incomplete",
            stage.name()
        );

        Ok(params)
    }

    /// Checks that every artifact the stage consumes was declared as an
    /// output by a strictly-earlier registry stage. Structural only: tag
    /// existence is the artifact store's concern.
    fn check_upstream(&self, stage: &StageDescriptor) -> Result<(), ResolveError> {
        for consumed in stage.consumes {
            let declared = self
                .registry
                .upstream_of(stage)
                .flat_map(|s| s.produces.iter())
                .any(|spec| spec.name == *consumed);
            if !declared {
                return Err(ResolveError::UnresolvedArtifact {
                    stage: stage.name().to_string(),
                    artifact: (*consumed).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Price and geolocation bounds shared by cleaning and validation.
    fn insert_bounds(&self, params: &mut ResolvedParams) {
        let etl = &self.settings.etl;
        params.insert("min_price", etl.min_price);
        params.insert("max_price", etl.max_price);
        params.insert("min_lat", etl.min_lat);
        params.insert("max_lat", etl.max_lat);
        params.insert("min_lon", etl.min_lon);
        params.insert("max_lon", etl.max_lon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactSpec;
    use crate::config::tests::sample_settings;
    use tempfile::TempDir;

    fn scope_for(settings: &PipelineSettings, root: &TempDir) -> RunScope {
        RunScope::establish(settings, Some(root.path().join("data"))).unwrap()
    }

    #[test]
    fn test_every_stage_resolves_all_required_params() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        for stage in registry.stages() {
            let params = resolver.resolve(stage).unwrap();
            for key in stage.required_params() {
                assert!(
                    params.contains_key(key),
                    "stage '{}' missing parameter '{}'",
                    stage.name(),
                    key
                );
            }
            assert_eq!(params.len(), stage.required_params().len());
        }
    }

    #[test]
    fn test_basic_cleaning_params_match_contract() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("basic_cleaning").unwrap();
        let params = resolver.resolve(stage).unwrap();
        assert_eq!(
            params.get("input_artifact"),
            Some(&ParamValue::Str("sample.csv:latest".to_string()))
        );
        assert_eq!(
            params.get("output_artifact"),
            Some(&ParamValue::Str("clean_sample.csv".to_string()))
        );
        assert_eq!(params.get("min_price"), Some(&ParamValue::Float(10.0)));
        assert_eq!(params.get("max_price"), Some(&ParamValue::Float(350.0)));
    }

    #[test]
    fn test_data_check_references_latest_and_reference_tags() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("data_check").unwrap();
        let params = resolver.resolve(stage).unwrap();
        assert_eq!(
            params.get("csv"),
            Some(&ParamValue::Str("clean_sample.csv:latest".to_string()))
        );
        assert_eq!(
            params.get("ref"),
            Some(&ParamValue::Str("clean_sample.csv:reference".to_string()))
        );
    }

    #[test]
    fn test_test_regression_model_uses_prod_tag() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("test_regression_model").unwrap();
        let params = resolver.resolve(stage).unwrap();
        assert_eq!(
            params.get("mlflow_model"),
            Some(&ParamValue::Str("random_forest_export:prod".to_string()))
        );
        assert_eq!(
            params.get("test_dataset"),
            Some(&ParamValue::Str("test_data.csv:latest".to_string()))
        );
    }

    #[test]
    fn test_side_channel_round_trip() {
        let dir = TempDir::new().unwrap();
        let block = serde_json::json!({"n_estimators": 100, "max_depth": 10});
        let path = marshal_side_channel(&block, dir.path()).unwrap();
        assert!(path.is_absolute() || path.starts_with(dir.path()));
        assert_eq!(unmarshal_side_channel(&path).unwrap(), block);
    }

    #[test]
    fn test_rf_config_param_is_readable_file_path() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("train_random_forest").unwrap();
        let params = resolver.resolve(stage).unwrap();
        let path = match params.get("rf_config").unwrap() {
            ParamValue::Path(p) => p.clone(),
            other => panic!("rf_config should be a path, got {:?}", other),
        };

        let recovered = unmarshal_side_channel(&path).unwrap();
        assert_eq!(recovered["n_estimators"], serde_json::json!(100));
        assert_eq!(recovered["max_depth"], serde_json::json!(10));
    }

    #[test]
    fn test_side_channel_file_survives_scope_drop() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("train_random_forest").unwrap();
        let params = resolver.resolve(stage).unwrap();
        let path = match params.get("rf_config").unwrap() {
            ParamValue::Path(p) => p.clone(),
            other => panic!("rf_config should be a path, got {:?}", other),
        };

        drop(scope);
        assert!(path.exists(), "side-channel file must not be auto-deleted");
    }

    #[test]
    fn test_resolution_is_idempotent_modulo_side_channel_path() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        let stage = registry.find("data_split").unwrap();
        let first = resolver.resolve(stage).unwrap();
        let second = resolver.resolve(stage).unwrap();
        assert_eq!(first, second);

        // The training stage differs only in the generated file path.
        let train = registry.find("train_random_forest").unwrap();
        let a = resolver.resolve(train).unwrap();
        let b = resolver.resolve(train).unwrap();
        for (key, value) in a.iter() {
            if key == "rf_config" {
                assert_ne!(Some(value), b.get(key));
            } else {
                assert_eq!(Some(value), b.get(key), "parameter '{}' drifted", key);
            }
        }
    }

    #[test]
    fn test_unresolved_upstream_artifact_fails_fast() {
        let settings = sample_settings();
        let root = TempDir::new().unwrap();
        let scope = scope_for(&settings, &root);
        let registry = StageRegistry::builtin();
        let resolver = ParamResolver::new(&registry, &settings, &scope);

        // A drifted descriptor consuming a name nothing upstream declares.
        let rogue = StageDescriptor {
            consumes: &["missing.csv"],
            produces: &[ArtifactSpec {
                name: "unused",
                kind: "unused",
                description: "",
            }],
            ..*registry.find("data_check").unwrap()
        };

        let err = resolver.resolve(&rogue).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnresolvedArtifact { ref artifact, .. } if artifact == "missing.csv"
        ));
    }
}
