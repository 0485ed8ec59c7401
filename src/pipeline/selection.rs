//! Active stage set: which registry stages a run will execute.

use std::collections::BTreeSet;

use crate::config::{ConfigError, StepSelection};
use crate::registry::{StageDescriptor, StageRegistry};

/// The validated subset of the registry selected for one run.
///
/// Derived once per run, before anything executes. Membership only —
/// execution order is always the registry's ordinal order, whatever
/// order the selection named the stages in. The empty set is valid: the
/// run completes successfully having executed zero stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStageSet {
    names: BTreeSet<&'static str>,
}

impl ActiveStageSet {
    /// Derives the active set from a selection, validated against the
    /// registry.
    ///
    /// The `all` sentinel expands to every stage flagged
    /// `included_in_all`; the post-production evaluation stage must be
    /// named explicitly. Explicit selections are taken verbatim, with
    /// duplicates collapsed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownStage` for any name missing from the
    /// registry. Nothing executes in that case.
    pub fn from_selection(
        selection: &StepSelection,
        registry: &StageRegistry,
    ) -> Result<Self, ConfigError> {
        let names = match selection {
            StepSelection::All => registry
                .stages()
                .iter()
                .filter(|s| s.included_in_all)
                .map(|s| s.name())
                .collect(),
            StepSelection::Explicit(requested) => {
                let mut names = BTreeSet::new();
                for name in requested {
                    let stage = registry
                        .find(name)
                        .ok_or_else(|| ConfigError::UnknownStage(name.clone()))?;
                    names.insert(stage.name());
                }
                names
            }
        };
        Ok(Self { names })
    }

    /// Whether `stage` runs this time.
    pub fn contains(&self, stage: &StageDescriptor) -> bool {
        self.names.contains(stage.name())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The selected names, for logging.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.iter().copied()
    }
}
