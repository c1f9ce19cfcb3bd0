//! Coverage data model and live hit store.
//!
//! ```text
//! Snapshot ─┬─ ClassRecord ── LineRecord ─┬─ BranchRecord
//!           │                             └─ SwitchRecord
//!           └─ InstructionWeights (static, parallel shape)
//!
//! HitStore ── LiveClass (ClassLayout + atomic counter slots)
//! ```

mod class;
pub mod counter;
mod layout;
mod line;
pub mod runtime;
mod snapshot;
mod store;
mod summary;
mod weights;

pub use class::ClassRecord;
pub use counter::{saturating_hits, HitCounter, HIT_CEILING};
pub use layout::{ClassLayout, LineLayout, LineSlots};
pub use line::{BranchRecord, LineRecord, LineStatus, SwitchRecord};
pub use runtime::CoverageRuntime;
pub use snapshot::Snapshot;
pub use store::{HitStore, LiveClass};
pub use summary::{CoverageSummary, Totals};
pub use weights::{BranchWeight, ClassWeights, InstructionWeights, LineWeight, SwitchWeight};
