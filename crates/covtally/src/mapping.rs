//! Line mapper: folds compiled line ranges back onto source lines.
//!
//! Inlined or generated code is compiled to line numbers that do not exist
//! in the source file. A [`LineMapping`] declares which compiled lines stand
//! for which source line; [`apply_mapping`] sums their counters into the
//! source line and drops the compiled lines.

use crate::merge::Merge;
use crate::model::{ClassRecord, LineRecord};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// `count` source lines starting at `source_start`, each represented by
/// `increment` compiled lines starting at `mapped_start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineMapping {
    /// First source line
    pub source_start: u32,
    /// Number of source lines
    pub count: u32,
    /// First compiled line
    pub mapped_start: u32,
    /// Compiled lines per source line
    pub increment: u32,
}

impl LineMapping {
    /// Create a mapping
    #[must_use]
    pub const fn new(source_start: u32, count: u32, mapped_start: u32, increment: u32) -> Self {
        Self {
            source_start,
            count,
            mapped_start,
            increment,
        }
    }

    /// Source line for index `i`
    #[must_use]
    pub fn source_line(&self, i: u32) -> Option<u32> {
        if i >= self.count {
            return None;
        }
        self.source_start.checked_add(i)
    }

    /// Compiled lines that represent source line index `i`
    #[must_use]
    pub fn compiled_range(&self, i: u32) -> Option<Range<u32>> {
        if i >= self.count || self.increment == 0 {
            return None;
        }
        let start = self
            .mapped_start
            .checked_add(i.checked_mul(self.increment)?)?;
        Some(start..start.checked_add(self.increment)?)
    }

    /// Every compiled line covered by this mapping
    #[must_use]
    pub fn compiled_lines(&self) -> Option<Range<u32>> {
        if self.count == 0 || self.increment == 0 {
            return None;
        }
        let len = self.count.checked_mul(self.increment)?;
        Some(self.mapped_start..self.mapped_start.checked_add(len)?)
    }
}

/// Fold `source` lines into a copy of `target` according to `mappings`.
///
/// Compiled lines inside any mapped range are removed from the result first;
/// then every compiled line present in `source` is merged into the source
/// line it maps to, which is created with zero hits if absent. Mappings with
/// a zero increment or a range that overflows are ignored.
#[must_use]
pub fn apply_mapping(
    mappings: &[LineMapping],
    source: &[Option<LineRecord>],
    target: &[Option<LineRecord>],
) -> Vec<Option<LineRecord>> {
    let mut result = target.to_vec();

    for range in mappings.iter().filter_map(LineMapping::compiled_lines) {
        let end = (range.end as usize).min(result.len());
        for slot in result.iter_mut().take(end).skip(range.start as usize) {
            *slot = None;
        }
    }

    for mapping in mappings {
        for i in 0..mapping.count {
            let (Some(logical), Some(range)) = (mapping.source_line(i), mapping.compiled_range(i))
            else {
                continue;
            };
            let end = (range.end as usize).min(source.len());
            for compiled in source.iter().take(end).skip(range.start as usize).flatten() {
                let idx = logical as usize;
                if result.len() <= idx {
                    result.resize(idx + 1, None);
                }
                result[idx]
                    .get_or_insert_with(|| LineRecord::new(logical, compiled.method.clone()))
                    .merge_from(compiled);
            }
        }
    }
    result
}

/// Apply `mappings` to a class in place, using its own lines as the source
pub fn remap_class(class: &mut ClassRecord, mappings: &[LineMapping]) {
    if mappings.is_empty() {
        return;
    }
    let remapped = apply_mapping(mappings, class.slots(), class.slots());
    class.replace_slots(remapped);
}
