//! Per-class coverage records.

use super::line::LineRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coverage of one class: a sparse, line-indexed sequence of [`LineRecord`]s
///
/// The slot at index `n` holds line `n`. The sequence only ever grows, so a
/// line keeps its index across merges. Equality compares present lines, not
/// the length of the slot sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassRecord {
    name: String,
    source_file: Option<String>,
    lines: Vec<Option<LineRecord>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    ignored: BTreeSet<u32>,
}

impl ClassRecord {
    /// Create an empty class record
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Fully-qualified class name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file name, if known
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Set the source file name
    pub fn set_source_file(&mut self, source_file: impl Into<String>) {
        self.source_file = Some(source_file.into());
    }

    /// Builder form of [`Self::set_source_file`]
    #[must_use]
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.set_source_file(source_file);
        self
    }

    /// Builder form of [`Self::insert_line`]
    #[must_use]
    pub fn with_line(mut self, line: LineRecord) -> Self {
        self.insert_line(line);
        self
    }

    /// Raw slot view, index = line number
    #[must_use]
    pub fn slots(&self) -> &[Option<LineRecord>] {
        &self.lines
    }

    /// Length of the slot sequence (one past the highest line ever seen)
    #[must_use]
    pub fn slot_len(&self) -> usize {
        self.lines.len()
    }

    /// Grow the slot sequence to at least `len`
    pub fn grow_to(&mut self, len: usize) {
        if self.lines.len() < len {
            self.lines.resize(len, None);
        }
    }

    /// Line record for `line`
    #[must_use]
    pub fn line(&self, line: u32) -> Option<&LineRecord> {
        self.lines.get(line as usize).and_then(Option::as_ref)
    }

    /// Mutable line record for `line`
    pub fn line_mut(&mut self, line: u32) -> Option<&mut LineRecord> {
        self.lines.get_mut(line as usize).and_then(Option::as_mut)
    }

    /// Insert or replace a line record at its own line number.
    ///
    /// Ignored lines are not stored.
    pub fn insert_line(&mut self, record: LineRecord) {
        if self.ignored.contains(&record.line) {
            return;
        }
        let idx = record.line as usize;
        self.grow_to(idx + 1);
        self.lines[idx] = Some(record);
    }

    /// Remove a line record without shrinking the sequence
    pub fn remove_line(&mut self, line: u32) -> Option<LineRecord> {
        self.lines.get_mut(line as usize).and_then(Option::take)
    }

    /// Line record for `line`, created with zero hits if absent.
    ///
    /// Returns `None` for ignored lines.
    pub fn ensure_line(&mut self, line: u32, method: &str) -> Option<&mut LineRecord> {
        if self.ignored.contains(&line) {
            return None;
        }
        let idx = line as usize;
        self.grow_to(idx + 1);
        Some(self.lines[idx].get_or_insert_with(|| LineRecord::new(line, method)))
    }

    /// Exclude a line from this class; later merges will not recreate it
    pub fn ignore_line(&mut self, line: u32) {
        let _ = self.ignored.insert(line);
        let _ = self.remove_line(line);
    }

    /// True if the line was excluded with [`Self::ignore_line`]
    #[must_use]
    pub fn is_ignored(&self, line: u32) -> bool {
        self.ignored.contains(&line)
    }

    /// Excluded line numbers in ascending order
    pub fn ignored_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.ignored.iter().copied()
    }

    /// Present line records in ascending line order
    pub fn lines(&self) -> impl Iterator<Item = &LineRecord> + '_ {
        self.lines.iter().flatten()
    }

    /// Mutable present line records in ascending line order
    pub fn lines_mut(&mut self) -> impl Iterator<Item = &mut LineRecord> + '_ {
        self.lines.iter_mut().flatten()
    }

    /// Number of present lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines().count()
    }

    /// Lines grouped by method signature, methods in order of first line
    #[must_use]
    pub fn methods(&self) -> Vec<(&str, Vec<&LineRecord>)> {
        let mut methods: Vec<(&str, Vec<&LineRecord>)> = Vec::new();
        for line in self.lines() {
            match methods.iter_mut().find(|(sig, _)| *sig == line.method) {
                Some((_, lines)) => lines.push(line),
                None => methods.push((line.method.as_str(), vec![line])),
            }
        }
        methods
    }

    /// Sum of line hit counts
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.lines().map(|l| u64::from(l.hits)).sum()
    }

    /// Zero-hit copy that keeps structure, source file and ignored lines
    #[must_use]
    pub fn zeroed(&self) -> Self {
        Self {
            name: self.name.clone(),
            source_file: self.source_file.clone(),
            lines: self
                .lines
                .iter()
                .map(|slot| slot.as_ref().map(LineRecord::zeroed))
                .collect(),
            ignored: self.ignored.clone(),
        }
    }

    pub(crate) fn replace_slots(&mut self, slots: Vec<Option<LineRecord>>) {
        let len = self.lines.len().max(slots.len());
        self.lines = slots;
        self.grow_to(len);
        let ignored: Vec<u32> = self.ignored.iter().copied().collect();
        for line in ignored {
            let _ = self.remove_line(line);
        }
    }
}

impl PartialEq for ClassRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source_file == other.source_file
            && self.ignored == other.ignored
            && self.lines().eq(other.lines())
    }
}

impl Eq for ClassRecord {}
