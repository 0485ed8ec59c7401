//! The fixed, ordered catalog of pipeline stages.
//!
//! The registry is static for the process lifetime: stage names, their
//! execution order, invocation targets and declared artifacts never
//! change at runtime. The driver iterates this catalog in ordinal order
//! and runs the subset selected by configuration.

use std::fmt;

use crate::artifact::ArtifactSpec;

/// Tagged-variant catalog of every known stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Fetch the raw dataset and publish it to the artifact store.
    Download,
    /// Clip prices and drop rows outside the geolocation bounds.
    BasicCleaning,
    /// Validate the cleaned data against the pinned reference.
    DataCheck,
    /// Split the cleaned data into trainval and test sets.
    DataSplit,
    /// Train the random forest and export the model.
    TrainRandomForest,
    /// Evaluate the production-promoted model on the holdout set.
    TestRegressionModel,
}

impl StageKind {
    /// The stage's registry name, as used in the `steps` selection.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Download => "download",
            StageKind::BasicCleaning => "basic_cleaning",
            StageKind::DataCheck => "data_check",
            StageKind::DataSplit => "data_split",
            StageKind::TrainRandomForest => "train_random_forest",
            StageKind::TestRegressionModel => "test_regression_model",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the stage catalog.
///
/// Immutable after process start. `ordinal` defines the fixed execution
/// order; `consumes`/`produces` declare the artifact names flowing in and
/// out, which the resolver checks structurally before anything runs.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    /// Which stage this is.
    pub kind: StageKind,
    /// Position in the fixed execution order, strictly increasing.
    pub ordinal: usize,
    /// Invocation target: project subdirectory holding the stage's
    /// executable unit.
    pub target: &'static str,
    /// Entry point name within the target.
    pub entry_point: &'static str,
    /// Whether the `all` selection shorthand includes this stage.
    ///
    /// The post-production evaluation stage is deliberately excluded: it
    /// must only run after a model export has been promoted to `prod`,
    /// so it has to be requested explicitly by name.
    pub included_in_all: bool,
    /// Artifact names this stage consumes from earlier stages.
    pub consumes: &'static [&'static str],
    /// Artifacts this stage publishes on success.
    pub produces: &'static [ArtifactSpec],
}

impl StageDescriptor {
    /// The stage's registry name.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Parameter keys the stage's contract requires. Every key listed
    /// here is present in the resolved parameter set.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self.kind {
            StageKind::Download => &[
                "sample",
                "artifact_name",
                "artifact_type",
                "artifact_description",
            ],
            StageKind::BasicCleaning => &[
                "input_artifact",
                "output_artifact",
                "output_type",
                "output_description",
                "min_price",
                "max_price",
                "min_lat",
                "max_lat",
                "min_lon",
                "max_lon",
            ],
            StageKind::DataCheck => &[
                "csv",
                "ref",
                "kl_threshold",
                "min_price",
                "max_price",
                "min_lat",
                "max_lat",
                "min_lon",
                "max_lon",
            ],
            StageKind::DataSplit => &["input", "test_size", "random_seed", "stratify_by"],
            StageKind::TrainRandomForest => &[
                "trainval_artifact",
                "val_size",
                "random_seed",
                "stratify_by",
                "rf_config",
                "max_tfidf_features",
                "output_artifact",
            ],
            StageKind::TestRegressionModel => &["mlflow_model", "test_dataset"],
        }
    }
}

/// The fixed catalog, in execution order.
static STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        kind: StageKind::Download,
        ordinal: 0,
        target: "components/get_data",
        entry_point: "main",
        included_in_all: true,
        consumes: &[],
        produces: &[ArtifactSpec {
            name: "sample.csv",
            kind: "raw_data",
            description: "Raw file as downloaded",
        }],
    },
    StageDescriptor {
        kind: StageKind::BasicCleaning,
        ordinal: 1,
        target: "src/basic_cleaning",
        entry_point: "main",
        included_in_all: true,
        consumes: &["sample.csv"],
        produces: &[ArtifactSpec {
            name: "clean_sample.csv",
            kind: "clean_sample",
            description: "Data with outliers and null values removed",
        }],
    },
    StageDescriptor {
        kind: StageKind::DataCheck,
        ordinal: 2,
        target: "src/data_check",
        entry_point: "main",
        included_in_all: true,
        consumes: &["clean_sample.csv"],
        produces: &[],
    },
    StageDescriptor {
        kind: StageKind::DataSplit,
        ordinal: 3,
        target: "components/train_val_test_split",
        entry_point: "main",
        included_in_all: true,
        consumes: &["clean_sample.csv"],
        produces: &[
            ArtifactSpec {
                name: "trainval_data.csv",
                kind: "trainval_data",
                description: "Train + validation split",
            },
            ArtifactSpec {
                name: "test_data.csv",
                kind: "test_data",
                description: "Holdout test split",
            },
        ],
    },
    StageDescriptor {
        kind: StageKind::TrainRandomForest,
        ordinal: 4,
        target: "src/train_random_forest",
        entry_point: "main",
        included_in_all: true,
        consumes: &["trainval_data.csv"],
        produces: &[ArtifactSpec {
            name: "random_forest_export",
            kind: "model_export",
            description: "Trained random forest pipeline export",
        }],
    },
    StageDescriptor {
        kind: StageKind::TestRegressionModel,
        ordinal: 5,
        target: "components/test_regression_model",
        entry_point: "main",
        included_in_all: false,
        consumes: &["random_forest_export", "test_data.csv"],
        produces: &[],
    },
];

/// Read-only access to the fixed stage catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRegistry;

impl StageRegistry {
    /// Returns the registry of built-in stages.
    pub fn builtin() -> Self {
        Self
    }

    /// All stages, in execution order.
    pub fn stages(&self) -> &'static [StageDescriptor] {
        STAGES
    }

    /// Looks up a stage by its registry name.
    pub fn find(&self, name: &str) -> Option<&'static StageDescriptor> {
        STAGES.iter().find(|s| s.name() == name)
    }

    /// Stages with a lower ordinal than `descriptor`, in execution order.
    pub fn upstream_of(
        &self,
        descriptor: &StageDescriptor,
    ) -> impl Iterator<Item = &'static StageDescriptor> {
        let ordinal = descriptor.ordinal;
        STAGES.iter().filter(move |s| s.ordinal < ordinal)
    }
}
