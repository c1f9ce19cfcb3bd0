//! Covtally: code coverage recording, aggregation and verification.
//!
//! Instrumented code bumps per-slot hit counters through a
//! [`CoverageRuntime`]. Recorded hits are persisted as compact snapshots
//! (or flat raw-hit arrays), merged across processes and test runs, scoped
//! by class filters, remapped through inlining line tables and finally
//! checked against coverage rules.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Instrumented │   │   HitStore   │   │  Aggregator  │   │   Verifier   │
//! │     code     │──►│ (atomic hit  │──►│ (filter,     │──►│ (rules over  │
//! │              │   │   counters)  │   │  merge)      │   │  scopes)     │
//! └──────────────┘   └──────┬───────┘   └──────▲───────┘   └──────────────┘
//!                           │  snapshot / raw  │
//!                           └────── codec ─────┘
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod mapping;
pub mod merge;
pub mod model;
mod result;
pub mod verify;

pub use aggregate::{
    Aggregator, ClassFilter, Request, SnapshotFileScanner, StaticStructure, StructureScanner,
};
pub use codec::{load_recorded, RawHits, Recorded};
pub use config::{
    AggregatorConfig, OutputFormat, RecorderConfig, RecorderConfigBuilder, RequestConfig,
    VerifierConfig,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use mapping::{apply_mapping, remap_class, LineMapping};
pub use merge::{merge_all, Merge};
pub use model::{
    BranchRecord, ClassLayout, ClassRecord, ClassWeights, CoverageRuntime, CoverageSummary,
    HitStore, InstructionWeights, LineLayout, LineRecord, LineStatus, LineWeight, LiveClass,
    Snapshot, SwitchRecord, Totals,
};
pub use result::{CovError, CovResult};
pub use verify::{Bound, Counter, Decimal, Rule, RuleResult, Target, ValueType, Verifier};
