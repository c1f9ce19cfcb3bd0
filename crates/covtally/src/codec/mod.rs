//! Persistent formats: the binary snapshot and raw hit arrays.

mod dictionary;
pub mod raw;
pub mod snapshot;
pub mod varint;

pub use dictionary::ClassDictionary;
pub use raw::{is_raw_file, is_raw_format, reconcile, RawHits, RAW_MAGIC};
pub use snapshot::{load_from_file, save_to_file, SNAPSHOT_VERSION};

use crate::diagnostics::DiagnosticSink;
use crate::model::Snapshot;
use crate::result::CovResult;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Contents of a recorded coverage file, in whichever format it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// Structured snapshot
    Snapshot(Snapshot),
    /// Flat arrays that still need a structural baseline
    Raw(RawHits),
}

impl Recorded {
    /// Resolve to a snapshot, attributing raw arrays against `baseline`
    #[must_use]
    pub fn into_snapshot(self, baseline: &Snapshot, sink: &DiagnosticSink) -> Snapshot {
        match self {
            Self::Snapshot(snapshot) => snapshot,
            Self::Raw(raw) => reconcile(&raw, baseline, sink),
        }
    }
}

/// Load a recorded coverage file, detecting its format from the first bytes
pub fn load_recorded(path: impl AsRef<Path>, sink: &DiagnosticSink) -> CovResult<Recorded> {
    let mut reader = BufReader::new(File::open(path)?);
    if is_raw_format(reader.fill_buf()?) {
        Ok(Recorded::Raw(raw::read_raw_hits_with(reader, sink)?))
    } else {
        Ok(Recorded::Snapshot(snapshot::read_snapshot_with(reader, sink)?))
    }
}
