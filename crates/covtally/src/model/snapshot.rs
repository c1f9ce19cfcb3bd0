//! Batch snapshot: the complete coverage model of one run or merge result.

use super::class::ClassRecord;
use super::summary::CoverageSummary;
use super::weights::InstructionWeights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Class name → [`ClassRecord`], plus the parallel instruction weights
///
/// A snapshot is owned by whoever builds it (a loader, the live store or the
/// merge engine) and is treated as read-only once handed to aggregation or
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    classes: BTreeMap<String, ClassRecord>,
    #[serde(default)]
    weights: InstructionWeights,
}

impl Snapshot {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Class record for `name`
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.get(name)
    }

    /// Mutable class record for `name`
    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassRecord> {
        self.classes.get_mut(name)
    }

    /// Class record for `name`, created empty if absent
    pub fn get_or_create(&mut self, name: &str) -> &mut ClassRecord {
        self.classes
            .entry(name.to_string())
            .or_insert_with(|| ClassRecord::new(name))
    }

    /// Insert or replace a class record
    pub fn insert(&mut self, class: ClassRecord) {
        let _ = self.classes.insert(class.name().to_string(), class);
    }

    /// Builder form of [`Self::insert`]
    #[must_use]
    pub fn with_class(mut self, class: ClassRecord) -> Self {
        self.insert(class);
        self
    }

    /// Remove a class and its weights
    pub fn remove(&mut self, name: &str) -> Option<ClassRecord> {
        let _ = self.weights.remove(name);
        self.classes.remove(name)
    }

    /// Keep only classes accepted by `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.classes.retain(|name, _| keep(name));
        let classes = &self.classes;
        self.weights.retain(|name| classes.contains_key(name));
    }

    /// True if `name` is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Classes in name order
    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> + '_ {
        self.classes.values()
    }

    /// Mutable classes in name order
    pub fn classes_mut(&mut self) -> impl Iterator<Item = &mut ClassRecord> + '_ {
        self.classes.values_mut()
    }

    /// Class names in name order
    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.keys().map(String::as_str)
    }

    /// Number of classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True if there are no classes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Instruction weights
    #[must_use]
    pub fn weights(&self) -> &InstructionWeights {
        &self.weights
    }

    /// Mutable instruction weights
    pub fn weights_mut(&mut self) -> &mut InstructionWeights {
        &mut self.weights
    }

    /// Sum of all line hit counts
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.classes.values().map(ClassRecord::total_hits).sum()
    }

    /// Zero-hit copy with the same structure and weights
    #[must_use]
    pub fn zeroed(&self) -> Self {
        Self {
            classes: self
                .classes
                .iter()
                .map(|(name, class)| (name.clone(), class.zeroed()))
                .collect(),
            weights: self.weights.clone(),
        }
    }

    /// Totals over every class
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for class in self.classes.values() {
            summary += CoverageSummary::of_class(class, self.weights.class(class.name()));
        }
        summary
    }
}
