//! Merge engine.
//!
//! Hit counts from independent executions are added (saturating). Instruction
//! weights describe the compiled artifact and are combined with `max`, so
//! merging a snapshot into itself doubles every hit but leaves weight totals
//! unchanged.

use crate::model::{
    saturating_hits, BranchRecord, BranchWeight, ClassRecord, ClassWeights, InstructionWeights,
    LineRecord, LineWeight, Snapshot, SwitchRecord, SwitchWeight,
};

/// Fold another value of the same kind into `self`
pub trait Merge {
    /// Merge `other` into `self`
    fn merge_from(&mut self, other: &Self);
}

impl Merge for BranchRecord {
    fn merge_from(&mut self, other: &Self) {
        self.true_hits = saturating_hits(self.true_hits, other.true_hits);
        self.false_hits = saturating_hits(self.false_hits, other.false_hits);
    }
}

impl Merge for SwitchRecord {
    fn merge_from(&mut self, other: &Self) {
        self.widen_keys(other.keys());
        for (slot, &hits) in other.hits().iter().enumerate() {
            self.add_slot_hits(slot, hits);
        }
        self.add_default_hits(other.default_hits());
    }
}

impl Merge for LineRecord {
    fn merge_from(&mut self, other: &Self) {
        self.hits = saturating_hits(self.hits, other.hits);
        merge_vec(&mut self.branches, &other.branches);
        merge_vec(&mut self.switches, &other.switches);
        if self.test_tag.is_none() {
            self.test_tag.clone_from(&other.test_tag);
        }
    }
}

impl Merge for ClassRecord {
    fn merge_from(&mut self, other: &Self) {
        self.grow_to(other.slot_len());
        for line in other.lines() {
            if let Some(target) = self.ensure_line(line.line, &line.method) {
                target.merge_from(line);
            }
        }
        if self.source_file().is_none() {
            if let Some(source_file) = other.source_file() {
                self.set_source_file(source_file);
            }
        }
    }
}

impl Merge for BranchWeight {
    fn merge_from(&mut self, other: &Self) {
        self.true_arm = self.true_arm.max(other.true_arm);
        self.false_arm = self.false_arm.max(other.false_arm);
    }
}

impl Merge for SwitchWeight {
    fn merge_from(&mut self, other: &Self) {
        self.default_arm = self.default_arm.max(other.default_arm);
        if self.keys.len() < other.keys.len() {
            self.keys.resize(other.keys.len(), 0);
        }
        for (mine, &theirs) in self.keys.iter_mut().zip(&other.keys) {
            *mine = (*mine).max(theirs);
        }
    }
}

impl Merge for LineWeight {
    fn merge_from(&mut self, other: &Self) {
        self.instructions = self.instructions.max(other.instructions);
        merge_vec(&mut self.branches, &other.branches);
        merge_vec(&mut self.switches, &other.switches);
    }
}

impl Merge for ClassWeights {
    fn merge_from(&mut self, other: &Self) {
        let slots = self.slots_mut();
        if slots.len() < other.slots().len() {
            slots.resize(other.slots().len(), None);
        }
        for (mine, theirs) in slots.iter_mut().zip(other.slots()) {
            match (mine.as_mut(), theirs) {
                (Some(mine), Some(theirs)) => mine.merge_from(theirs),
                (None, Some(theirs)) => *mine = Some(theirs.clone()),
                (_, None) => {}
            }
        }
    }
}

impl Merge for InstructionWeights {
    fn merge_from(&mut self, other: &Self) {
        for (name, weights) in other.iter() {
            self.class_mut(name).merge_from(weights);
        }
    }
}

impl Merge for Snapshot {
    fn merge_from(&mut self, other: &Self) {
        for class in other.classes() {
            self.get_or_create(class.name()).merge_from(class);
        }
        self.weights_mut().merge_from(other.weights());
    }
}

/// Grow `into` to the length of `from`, then merge slot by slot
fn merge_vec<T: Merge + Clone>(into: &mut Vec<T>, from: &[T]) {
    for (idx, item) in from.iter().enumerate() {
        match into.get_mut(idx) {
            Some(existing) => existing.merge_from(item),
            None => into.push(item.clone()),
        }
    }
}

/// Merge every snapshot into a fresh one
#[must_use]
pub fn merge_all<'a>(snapshots: impl IntoIterator<Item = &'a Snapshot>) -> Snapshot {
    let mut merged = Snapshot::new();
    for snapshot in snapshots {
        merged.merge_from(snapshot);
    }
    merged
}

/// Merge only the classes of `from` that already exist in `into`.
///
/// Returns the names of classes that were skipped.
pub fn merge_known(into: &mut Snapshot, from: &Snapshot) -> Vec<String> {
    let mut skipped = Vec::new();
    for class in from.classes() {
        match into.class_mut(class.name()) {
            Some(target) => target.merge_from(class),
            None => skipped.push(class.name().to_string()),
        }
    }
    for (name, weights) in from.weights().iter() {
        if into.contains(name) {
            into.weights_mut().class_mut(name).merge_from(weights);
        }
    }
    skipped
}
