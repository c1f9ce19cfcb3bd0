//! Static class structure and counter slot assignment.
//!
//! A [`ClassLayout`] lists the lines of a class together with their branch
//! and switch shape. It assigns every countable item a dense slot id, in
//! ascending line order:
//!
//! ```text
//! line hits | branch0 true | branch0 false | ... | switch0 key0 | ... | switch0 default | ...
//! ```
//!
//! The same slot order is used by live counter arrays and by flat raw-hits
//! arrays, which is what lets offline recordings be attributed to lines.

use super::class::ClassRecord;
use super::line::{BranchRecord, LineRecord, SwitchRecord};
use super::weights::ClassWeights;
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};

/// Structure of one line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineLayout {
    /// Line number
    pub line: u32,
    /// Owning method signature
    pub method: String,
    /// Number of binary branches
    #[serde(default)]
    pub branches: usize,
    /// Case keys of each switch
    #[serde(default)]
    pub switches: Vec<Vec<i32>>,
}

impl LineLayout {
    /// Plain line without decisions
    #[must_use]
    pub fn new(line: u32, method: impl Into<String>) -> Self {
        Self {
            line,
            method: method.into(),
            ..Self::default()
        }
    }

    /// Set the number of branches
    #[must_use]
    pub fn with_branches(mut self, branches: usize) -> Self {
        self.branches = branches;
        self
    }

    /// Append a switch
    #[must_use]
    pub fn with_switch(mut self, keys: Vec<i32>) -> Self {
        self.switches.push(keys);
        self
    }

    fn slot_count(&self) -> usize {
        1 + self.branches * 2 + self.switches.iter().map(|k| k.len() + 1).sum::<usize>()
    }
}

/// Slot ids of one line, resolved against a layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSlots {
    /// Slot of the line hit counter
    pub hit: usize,
    /// First slot of the branch pairs
    pub branch_base: usize,
    /// Number of branches
    pub branch_count: usize,
    /// `(first slot, key count)` per switch; the default arm follows the keys
    pub switches: Vec<(usize, usize)>,
    switch_keys: Vec<Vec<i32>>,
}

impl LineSlots {
    /// Slot of a branch arm
    #[must_use]
    pub fn branch_slot(&self, branch: usize, taken: bool) -> Option<usize> {
        if branch >= self.branch_count {
            return None;
        }
        Some(self.branch_base + branch * 2 + usize::from(!taken))
    }

    /// Slot of the arm `key` dispatches to in switch `switch`
    #[must_use]
    pub fn switch_slot(&self, switch: usize, key: i32) -> Option<usize> {
        let (base, key_count) = *self.switches.get(switch)?;
        let keys = &self.switch_keys[switch];
        let offset = keys.iter().position(|&k| k == key).unwrap_or(key_count);
        Some(base + offset)
    }
}

/// Static structure of one class
///
/// Lines are kept sorted and unique; deserialized layouts go through
/// [`ClassLayout::new`] as well.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "LayoutFields")]
pub struct ClassLayout {
    lines: Vec<LineLayout>,
    source_file: Option<String>,
    weights: Option<ClassWeights>,
}

#[derive(Deserialize)]
struct LayoutFields {
    lines: Vec<LineLayout>,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    weights: Option<ClassWeights>,
}

impl From<LayoutFields> for ClassLayout {
    fn from(fields: LayoutFields) -> Self {
        Self {
            source_file: fields.source_file,
            weights: fields.weights,
            ..Self::new(fields.lines)
        }
    }
}

impl ClassLayout {
    /// Create a layout from line structures; lines are sorted and deduplicated
    #[must_use]
    pub fn new(mut lines: Vec<LineLayout>) -> Self {
        lines.sort_by_key(|l| l.line);
        lines.dedup_by_key(|l| l.line);
        Self {
            lines,
            source_file: None,
            weights: None,
        }
    }

    /// Layout without any lines
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the layout of an existing class record
    #[must_use]
    pub fn from_record(class: &ClassRecord) -> Self {
        let lines = class
            .lines()
            .map(|l| LineLayout {
                line: l.line,
                method: l.method.clone(),
                branches: l.branches.len(),
                switches: l.switches.iter().map(|s| s.keys().to_vec()).collect(),
            })
            .collect();
        Self {
            lines,
            source_file: class.source_file().map(String::from),
            weights: None,
        }
    }

    /// Attach a source file name
    #[must_use]
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Attach instruction weights
    #[must_use]
    pub fn with_weights(mut self, weights: ClassWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Line structures in ascending order
    #[must_use]
    pub fn lines(&self) -> &[LineLayout] {
        &self.lines
    }

    /// Source file name
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Instruction weights
    #[must_use]
    pub fn weights(&self) -> Option<&ClassWeights> {
        self.weights.as_ref()
    }

    /// Total number of counter slots
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.lines.iter().map(LineLayout::slot_count).sum()
    }

    /// Resolve slot ids for every line, indexed by line number
    #[must_use]
    pub fn resolve(&self) -> Vec<Option<LineSlots>> {
        let len = self.lines.last().map_or(0, |l| l.line as usize + 1);
        let mut table = vec![None; len];
        let mut next = 0;
        for layout in &self.lines {
            let hit = next;
            let branch_base = hit + 1;
            next = branch_base + layout.branches * 2;
            let mut switches = Vec::with_capacity(layout.switches.len());
            for keys in &layout.switches {
                switches.push((next, keys.len()));
                next += keys.len() + 1;
            }
            table[layout.line as usize] = Some(LineSlots {
                hit,
                branch_base,
                branch_count: layout.branches,
                switches,
                switch_keys: layout.switches.clone(),
            });
        }
        table
    }

    /// Attribute a flat counter array to lines, producing a class record.
    ///
    /// Fails with [`CovError::StructuralMismatch`] when `counts` does not have
    /// exactly [`Self::slot_count`] entries.
    pub fn attribute(&self, class: &str, counts: &[u32]) -> CovResult<ClassRecord> {
        let expected = self.slot_count();
        if counts.len() != expected {
            return Err(CovError::structural(
                class,
                format!(
                    "hit array has {} entries, structure needs {}",
                    counts.len(),
                    expected
                ),
            ));
        }
        let mut record = ClassRecord::new(class);
        if let Some(source_file) = &self.source_file {
            record.set_source_file(source_file.clone());
        }
        let mut cursor = counts.iter().copied();
        let mut next = || cursor.next().unwrap_or(0);
        for layout in &self.lines {
            let mut line = LineRecord::new(layout.line, layout.method.clone()).with_hits(next());
            for _ in 0..layout.branches {
                let true_hits = next();
                let false_hits = next();
                line.branches.push(BranchRecord::new(true_hits, false_hits));
            }
            for keys in &layout.switches {
                let pairs: Vec<(i32, u32)> = keys.iter().map(|&k| (k, next())).collect();
                let default_hits = next();
                line.switches.push(SwitchRecord::from_pairs(default_hits, pairs));
            }
            record.insert_line(line);
        }
        Ok(record)
    }
}
