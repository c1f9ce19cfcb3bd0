//! Aggregator: merges recorded reports into one snapshot per request.
//!
//! The class structure of every request comes from the module output roots,
//! so classes that never ran still appear with zero hits. Recorded data is
//! then merged only for classes present in that baseline.

mod filter;

pub use filter::{outer_class, ClassFilter};

use crate::codec::{load_recorded, reconcile, save_to_file, RawHits, Recorded};
use crate::config::AggregatorConfig;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::merge::Merge;
use crate::model::Snapshot;
use crate::result::{CovError, CovResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One aggregation request: a class filter and where its result goes
#[derive(Debug, Clone)]
pub struct Request {
    filter: ClassFilter,
    output: Option<PathBuf>,
}

impl Request {
    /// Compile a request from patterns
    pub fn new(include: &[String], exclude: &[String], output: Option<PathBuf>) -> CovResult<Self> {
        Ok(Self::with_filter(ClassFilter::new(include, exclude)?, output))
    }

    /// Request with an already compiled filter
    #[must_use]
    pub fn with_filter(filter: ClassFilter, output: Option<PathBuf>) -> Self {
        Self { filter, output }
    }

    /// Class filter
    #[must_use]
    pub fn filter(&self) -> &ClassFilter {
        &self.filter
    }

    /// Output path, if the result should be written
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

/// Source of the static class structure under one output root
pub trait StructureScanner {
    /// Every class found under `root`, with zero hits
    fn scan(&self, root: &Path) -> CovResult<Snapshot>;
}

/// Structure supplied in memory, keyed by root
#[derive(Debug, Clone, Default)]
pub struct StaticStructure {
    roots: BTreeMap<PathBuf, Snapshot>,
}

impl StaticStructure {
    /// Create an empty structure table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the structure found under `root`
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>, structure: Snapshot) -> Self {
        let _ = self.roots.insert(root.into(), structure);
        self
    }
}

impl StructureScanner for StaticStructure {
    fn scan(&self, root: &Path) -> CovResult<Snapshot> {
        self.roots.get(root).map(Snapshot::zeroed).ok_or_else(|| {
            CovError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no structure registered for {}", root.display()),
            ))
        })
    }
}

/// Structure stored as a snapshot file.
///
/// A root that is a file is loaded directly; a directory root is expected to
/// contain `file_name`.
#[derive(Debug, Clone)]
pub struct SnapshotFileScanner {
    file_name: PathBuf,
}

impl SnapshotFileScanner {
    /// Default structure file name inside a directory root
    pub const DEFAULT_FILE_NAME: &'static str = "coverage-structure.bin";

    /// Scanner looking for `file_name` inside directory roots
    #[must_use]
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for SnapshotFileScanner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FILE_NAME)
    }
}

impl StructureScanner for SnapshotFileScanner {
    fn scan(&self, root: &Path) -> CovResult<Snapshot> {
        let path = if root.is_file() {
            root.to_path_buf()
        } else {
            root.join(&self.file_name)
        };
        Ok(crate::codec::load_from_file(path)?.zeroed())
    }
}

/// Aggregation driver
pub struct Aggregator {
    requests: Vec<Request>,
    reports: Vec<PathBuf>,
    output_roots: Vec<PathBuf>,
    scanner: Box<dyn StructureScanner>,
    sink: DiagnosticSink,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("requests", &self.requests)
            .field("reports", &self.reports)
            .field("output_roots", &self.output_roots)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Aggregator with no requests, reading structure through `scanner`
    pub fn new(scanner: impl StructureScanner + 'static) -> Self {
        Self {
            requests: Vec::new(),
            reports: Vec::new(),
            output_roots: Vec::new(),
            scanner: Box::new(scanner),
            sink: DiagnosticSink::default(),
        }
    }

    /// Aggregator configured from `config`
    pub fn from_config(
        config: &AggregatorConfig,
        scanner: impl StructureScanner + 'static,
    ) -> CovResult<Self> {
        let mut aggregator = Self::new(scanner);
        aggregator.requests = config.compile_requests()?;
        aggregator.reports.clone_from(&config.reports);
        aggregator.output_roots.clone_from(&config.output_roots);
        aggregator.sink = DiagnosticSink::new(config.diagnostic_threshold);
        Ok(aggregator)
    }

    /// Add a request
    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    /// Add a recorded report file
    #[must_use]
    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports.push(path.into());
        self
    }

    /// Add a module output root
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_roots.push(root.into());
        self
    }

    /// Requests in order
    #[must_use]
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Diagnostics collected so far
    #[must_use]
    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    /// Load every report file, aggregate, and write each request's output.
    ///
    /// Returns one snapshot per request, in request order.
    pub fn run(&self) -> CovResult<Vec<Snapshot>> {
        let recorded = self
            .reports
            .iter()
            .map(|path| load_recorded(path, &self.sink))
            .collect::<CovResult<Vec<_>>>()?;
        let results = self.aggregate(&recorded)?;
        for (request, snapshot) in self.requests.iter().zip(&results) {
            if let Some(output) = request.output() {
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                save_to_file(snapshot, output)?;
                info!(
                    output = %output.display(),
                    classes = snapshot.len(),
                    "wrote aggregated coverage"
                );
            }
        }
        Ok(results)
    }

    /// Aggregate already loaded reports; one snapshot per request
    pub fn aggregate(&self, recorded: &[Recorded]) -> CovResult<Vec<Snapshot>> {
        self.requests
            .iter()
            .map(|request| self.aggregate_request(request, recorded))
            .collect()
    }

    /// Raw arrays are attributed against the structure as scanned, never
    /// against a baseline already grown by earlier reports, so the result
    /// does not depend on report order.
    fn aggregate_request(&self, request: &Request, recorded: &[Recorded]) -> CovResult<Snapshot> {
        let structure = self.baseline(request.filter())?;
        debug!(classes = structure.len(), "structural baseline built");
        let mut merged = structure.clone();
        for report in recorded {
            match report {
                Recorded::Snapshot(snapshot) => {
                    merge_filtered(&mut merged, snapshot, request.filter(), &self.sink);
                }
                Recorded::Raw(raw) => {
                    let accepted: RawHits = raw
                        .iter()
                        .filter(|(name, _)| request.filter().accepts(name))
                        .map(|(name, counts)| (name.clone(), counts.clone()))
                        .collect();
                    let attributed = reconcile(&accepted, &structure, &self.sink);
                    merge_filtered(&mut merged, &attributed, request.filter(), &self.sink);
                }
            }
        }
        Ok(merged)
    }

    fn baseline(&self, filter: &ClassFilter) -> CovResult<Snapshot> {
        let mut baseline = Snapshot::new();
        for root in &self.output_roots {
            let mut structure = self.scanner.scan(root)?;
            structure.retain(|name| filter.accepts(name));
            baseline.merge_from(&structure);
        }
        Ok(baseline)
    }
}

/// Merge the classes of `report` that pass `filter` into `baseline`.
///
/// Filtered-out classes are dropped silently; accepted classes missing from
/// the baseline are reported and skipped.
fn merge_filtered(
    baseline: &mut Snapshot,
    report: &Snapshot,
    filter: &ClassFilter,
    sink: &DiagnosticSink,
) {
    for class in report.classes().filter(|c| filter.accepts(c.name())) {
        match baseline.class_mut(class.name()) {
            Some(target) => target.merge_from(class),
            None => sink.report(
                DiagnosticKind::MissingClass,
                format!("{}: recorded but not part of the structural baseline", class.name()),
            ),
        }
    }
    for (name, weights) in report.weights().iter() {
        if baseline.contains(name) {
            baseline.weights_mut().class_mut(name).merge_from(weights);
        }
    }
}
