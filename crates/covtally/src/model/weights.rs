//! Static instruction weights.
//!
//! Weights mirror the line/branch/switch shape of the hit records but hold the
//! number of low-level instructions attributed to each part. They describe the
//! compiled artifact, not an execution, so they never accumulate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instructions attributed to the two arms of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchWeight {
    /// Instructions on the true arm
    pub true_arm: u32,
    /// Instructions on the false arm
    pub false_arm: u32,
}

/// Instructions attributed to each arm of a switch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchWeight {
    /// Instructions on the default arm
    pub default_arm: u32,
    /// Instructions per case, parallel to the switch keys
    pub keys: Vec<u32>,
}

/// Instructions attributed to one line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineWeight {
    /// Instructions on the line itself
    pub instructions: u32,
    /// Per-branch arm weights
    pub branches: Vec<BranchWeight>,
    /// Per-switch arm weights
    pub switches: Vec<SwitchWeight>,
}

impl LineWeight {
    /// Weight with only a line instruction count
    #[must_use]
    pub fn new(instructions: u32) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// Sum of line and arm instructions
    #[must_use]
    pub fn total(&self) -> u64 {
        let branches: u64 = self
            .branches
            .iter()
            .map(|b| u64::from(b.true_arm) + u64::from(b.false_arm))
            .sum();
        let switches: u64 = self
            .switches
            .iter()
            .map(|s| u64::from(s.default_arm) + s.keys.iter().map(|&k| u64::from(k)).sum::<u64>())
            .sum();
        u64::from(self.instructions) + branches + switches
    }
}

/// Line-indexed weights for one class
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassWeights {
    lines: Vec<Option<LineWeight>>,
}

impl ClassWeights {
    /// Create empty class weights
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight for `line`
    pub fn set(&mut self, line: u32, weight: LineWeight) {
        let idx = line as usize;
        if self.lines.len() <= idx {
            self.lines.resize(idx + 1, None);
        }
        self.lines[idx] = Some(weight);
    }

    /// Builder form of [`Self::set`]
    #[must_use]
    pub fn with(mut self, line: u32, weight: LineWeight) -> Self {
        self.set(line, weight);
        self
    }

    /// Weight for `line`
    #[must_use]
    pub fn get(&self, line: u32) -> Option<&LineWeight> {
        self.lines.get(line as usize).and_then(Option::as_ref)
    }

    /// `(line, weight)` pairs in ascending line order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &LineWeight)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, w)| w.as_ref().map(|w| (idx as u32, w)))
    }

    /// Sum of all instructions in the class
    #[must_use]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, w)| w.total()).sum()
    }

    pub(crate) fn slots_mut(&mut self) -> &mut Vec<Option<LineWeight>> {
        &mut self.lines
    }

    pub(crate) fn slots(&self) -> &[Option<LineWeight>] {
        &self.lines
    }
}

/// Weights for every class of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstructionWeights {
    classes: BTreeMap<String, ClassWeights>,
}

impl InstructionWeights {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights for `class`
    #[must_use]
    pub fn class(&self, class: &str) -> Option<&ClassWeights> {
        self.classes.get(class)
    }

    /// Mutable weights for `class`, created if absent
    pub fn class_mut(&mut self, class: &str) -> &mut ClassWeights {
        self.classes.entry(class.to_string()).or_default()
    }

    /// Replace the weights for `class`
    pub fn insert(&mut self, class: impl Into<String>, weights: ClassWeights) {
        let _ = self.classes.insert(class.into(), weights);
    }

    /// Drop the weights for `class`
    pub fn remove(&mut self, class: &str) -> Option<ClassWeights> {
        self.classes.remove(class)
    }

    /// Keep only classes accepted by `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.classes.retain(|name, _| keep(name));
    }

    /// `(class, weights)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassWeights)> + '_ {
        self.classes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of classes with weights
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True if no class has weights
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Sum of all instructions across classes
    #[must_use]
    pub fn total(&self) -> u64 {
        self.classes.values().map(ClassWeights::total).sum()
    }
}
