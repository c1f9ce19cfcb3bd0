//! Live hit store.
//!
//! Runs inside the measured program. Classes are published once per name
//! (double-checked under an `RwLock`); after that, every counting call on a
//! [`LiveClass`] handle is lock-free. Recording never panics and never
//! returns an error to the caller: unknown lines or slots are ignored and
//! reported once per class to the [`DiagnosticSink`].

use super::counter::{counter_array, HitCounter};
use super::layout::{ClassLayout, LineSlots};
use super::snapshot::Snapshot;
use crate::codec::raw::{write_raw_hits, RawHits};
use crate::codec::snapshot::write_snapshot;
use crate::config::{OutputFormat, RecorderConfig};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::merge::Merge;
use crate::result::CovResult;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Counters of one class in the running program
#[derive(Debug)]
pub struct LiveClass {
    name: String,
    layout: Option<ClassLayout>,
    slots: Vec<Option<LineSlots>>,
    counters: Box<[HitCounter]>,
    mismatch_reported: AtomicBool,
    sink: Arc<DiagnosticSink>,
}

impl LiveClass {
    fn with_layout(name: &str, layout: ClassLayout, sink: Arc<DiagnosticSink>) -> Self {
        let slots = layout.resolve();
        let counters = counter_array(layout.slot_count());
        Self {
            name: name.to_string(),
            layout: Some(layout),
            slots,
            counters,
            mismatch_reported: AtomicBool::new(false),
            sink,
        }
    }

    fn raw(name: &str, len: usize, sink: Arc<DiagnosticSink>) -> Self {
        Self {
            name: name.to_string(),
            layout: None,
            slots: Vec::new(),
            counters: counter_array(len),
            mismatch_reported: AtomicBool::new(false),
            sink,
        }
    }

    /// Class name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout, absent for classes recorded in offline (flat array) mode
    #[must_use]
    pub fn layout(&self) -> Option<&ClassLayout> {
        self.layout.as_ref()
    }

    /// Number of counter slots
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.counters.len()
    }

    /// Count one execution of counter `slot`
    #[inline]
    pub fn touch(&self, slot: usize) {
        match self.counters.get(slot) {
            Some(counter) => counter.bump(),
            None => self.report_mismatch(|| format!("counter id {slot} out of range")),
        }
    }

    /// Count one execution of `line`
    #[inline]
    pub fn record_hit(&self, line: u32) {
        match self.line_slots(line) {
            Some(slots) => self.counters[slots.hit].bump(),
            None => self.report_mismatch(|| format!("line {line} is not instrumented")),
        }
    }

    /// Count one outcome of branch `branch` on `line`
    #[inline]
    pub fn record_branch(&self, line: u32, branch: usize, taken: bool) {
        match self
            .line_slots(line)
            .and_then(|s| s.branch_slot(branch, taken))
        {
            Some(slot) => self.counters[slot].bump(),
            None => self.report_mismatch(|| format!("line {line} has no branch {branch}")),
        }
    }

    /// Count one dispatch of switch `switch` on `line` to `key`
    #[inline]
    pub fn record_switch(&self, line: u32, switch: usize, key: i32) {
        match self
            .line_slots(line)
            .and_then(|s| s.switch_slot(switch, key))
        {
            Some(slot) => self.counters[slot].bump(),
            None => self.report_mismatch(|| format!("line {line} has no switch {switch}")),
        }
    }

    /// Current counter values in slot order
    #[must_use]
    pub fn counts(&self) -> Vec<u32> {
        self.counters.iter().map(HitCounter::get).collect()
    }

    /// Read and zero every counter
    pub fn take_counts(&self) -> Vec<u32> {
        self.counters.iter().map(HitCounter::take).collect()
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.counters.iter().for_each(HitCounter::reset);
    }

    fn line_slots(&self, line: u32) -> Option<&LineSlots> {
        self.slots.get(line as usize).and_then(Option::as_ref)
    }

    #[cold]
    fn report_mismatch(&self, message: impl FnOnce() -> String) {
        if !self.mismatch_reported.swap(true, Ordering::Relaxed) {
            self.sink.report(
                DiagnosticKind::StructuralMismatch,
                format!("{}: {}", self.name, message()),
            );
        }
    }
}

/// Process-wide set of live class counters
///
/// Not a singleton: construct one per measured process (or per test) and
/// hand it to the instrumentation side through [`crate::CoverageRuntime`].
#[derive(Debug)]
pub struct HitStore {
    config: RecorderConfig,
    sink: Arc<DiagnosticSink>,
    classes: RwLock<HashMap<String, Arc<LiveClass>>>,
    boundary: Mutex<TestBoundary>,
}

#[derive(Debug, Default)]
struct TestBoundary {
    current_test: Option<String>,
    completed: Snapshot,
    completed_raw: RawHits,
}

impl HitStore {
    /// Create a store with its own diagnostic sink
    #[must_use]
    pub fn new(config: RecorderConfig) -> Self {
        let sink = Arc::new(DiagnosticSink::new(config.diagnostic_threshold));
        Self::with_sink(config, sink)
    }

    /// Create a store reporting into an existing sink
    #[must_use]
    pub fn with_sink(config: RecorderConfig, sink: Arc<DiagnosticSink>) -> Self {
        Self {
            config,
            sink,
            classes: RwLock::new(HashMap::new()),
            boundary: Mutex::new(TestBoundary::default()),
        }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Diagnostic sink
    #[must_use]
    pub fn sink(&self) -> &Arc<DiagnosticSink> {
        &self.sink
    }

    /// Class handle for `name`, created with an empty layout on first touch
    pub fn get_or_create(&self, name: &str) -> Arc<LiveClass> {
        self.get_or_create_with(name, ClassLayout::empty)
    }

    /// Class handle for `name`, built from `layout` on first touch.
    ///
    /// Exactly one handle is published per name even when several threads
    /// race on first touch; `layout` is only invoked by the winner.
    pub fn get_or_create_with(
        &self,
        name: &str,
        layout: impl FnOnce() -> ClassLayout,
    ) -> Arc<LiveClass> {
        self.publish(name, || LiveClass::with_layout(name, layout(), Arc::clone(&self.sink)))
    }

    /// Flat counter array for `name` (offline mode), `len` slots on first touch.
    ///
    /// A later registration with a different length keeps the original
    /// array and reports a structural mismatch.
    pub fn register_raw(&self, name: &str, len: usize) -> Arc<LiveClass> {
        let class = self.publish(name, || LiveClass::raw(name, len, Arc::clone(&self.sink)));
        if class.slot_count() != len {
            self.sink.report(
                DiagnosticKind::StructuralMismatch,
                format!(
                    "{name}: registered with {} counters, later with {len}",
                    class.slot_count()
                ),
            );
        }
        class
    }

    fn publish(&self, name: &str, create: impl FnOnce() -> LiveClass) -> Arc<LiveClass> {
        if let Some(class) = self.lookup(name) {
            return class;
        }
        let mut classes = self
            .classes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            classes
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(create())),
        )
    }

    /// Class handle for `name`, if registered
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<LiveClass>> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Count one execution of `line` in `class`.
    ///
    /// Looks the class up by name; instrumented code should keep the
    /// [`LiveClass`] handle instead.
    pub fn record_hit(&self, class: &str, line: u32) {
        if let Some(live) = self.lookup(class) {
            live.record_hit(line);
        }
    }

    /// Count one outcome of a branch in `class`
    pub fn record_branch(&self, class: &str, line: u32, branch: usize, taken: bool) {
        if let Some(live) = self.lookup(class) {
            live.record_branch(line, branch, taken);
        }
    }

    /// Count one dispatch of a switch in `class`
    pub fn record_switch(&self, class: &str, line: u32, switch: usize, key: i32) {
        if let Some(live) = self.lookup(class) {
            live.record_switch(line, switch, key);
        }
    }

    /// Number of registered classes
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn all_classes(&self) -> Vec<Arc<LiveClass>> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Start a test: counters recorded from now on belong to `name`
    pub fn begin_test(&self, name: &str) {
        let mut boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self.fold_counters(&mut boundary);
        boundary.current_test = Some(name.to_string());
    }

    /// Finish the current test.
    ///
    /// Returns what was recorded since [`Self::begin_test`] and resets the
    /// live counters; the totals remain part of [`Self::snapshot`].
    pub fn end_test(&self) -> Snapshot {
        let mut boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        let per_test = self.fold_counters(&mut boundary);
        boundary.current_test = None;
        per_test
    }

    fn fold_counters(&self, boundary: &mut TestBoundary) -> Snapshot {
        let tag = if self.config.tag_tests {
            boundary.current_test.clone()
        } else {
            None
        };
        let mut recorded = Snapshot::new();
        for class in self.all_classes() {
            let counts = class.take_counts();
            match class.layout() {
                Some(layout) => {
                    self.attribute_into(&mut recorded, &class, layout, &counts, tag.as_deref());
                }
                None => {
                    let total = boundary
                        .completed_raw
                        .entry(class.name().to_string())
                        .or_default();
                    merge_raw(total, &counts);
                }
            }
        }
        boundary.completed.merge_from(&recorded);
        recorded
    }

    fn attribute_into(
        &self,
        snapshot: &mut Snapshot,
        class: &LiveClass,
        layout: &ClassLayout,
        counts: &[u32],
        tag: Option<&str>,
    ) {
        match layout.attribute(class.name(), counts) {
            Ok(mut record) => {
                if let Some(tag) = tag {
                    for line in record.lines_mut().filter(|l| l.hits > 0) {
                        line.test_tag = Some(tag.to_string());
                    }
                }
                snapshot.insert(record);
                if let Some(weights) = layout.weights() {
                    snapshot.weights_mut().insert(class.name(), weights.clone());
                }
            }
            Err(err) => self.sink.report_error(&err),
        }
    }

    /// Zero every counter and forget completed tests
    pub fn clear(&self) {
        let mut boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        for class in self.all_classes() {
            class.reset();
        }
        *boundary = TestBoundary::default();
    }

    /// Everything recorded so far, for classes with a layout
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = boundary.completed.clone();
        let tag = if self.config.tag_tests {
            boundary.current_test.as_deref()
        } else {
            None
        };
        let mut live = Snapshot::new();
        for class in self.all_classes() {
            if let Some(layout) = class.layout() {
                self.attribute_into(&mut live, &class, layout, &class.counts(), tag);
            }
        }
        snapshot.merge_from(&live);
        snapshot
    }

    /// Everything recorded so far as flat arrays, for every class
    #[must_use]
    pub fn raw_hits(&self) -> RawHits {
        let boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        let mut raw = boundary.completed_raw.clone();
        for class in boundary.completed.classes() {
            let counts = flatten(class);
            merge_raw(raw.entry(class.name().to_string()).or_default(), &counts);
        }
        for class in self.all_classes() {
            merge_raw(raw.entry(class.name().to_string()).or_default(), &class.counts());
        }
        raw
    }

    /// Persist everything recorded so far to the configured output path.
    ///
    /// Best effort: failures are reported to the sink and `false` is
    /// returned, nothing propagates into the measured program.
    pub fn save_on_exit(&self) -> bool {
        let Some(path) = self.config.output_path.clone() else {
            self.sink.report(
                DiagnosticKind::Io,
                "no output path configured, coverage discarded",
            );
            return false;
        };
        match self.save_to(&path) {
            Ok(()) => true,
            Err(err) => {
                self.sink.report(
                    DiagnosticKind::Io,
                    format!("failed to write {}: {err}", path.display()),
                );
                false
            }
        }
    }

    fn save_to(&self, path: &Path) -> CovResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        match self.config.output_format {
            OutputFormat::Snapshot => write_snapshot(&self.snapshot(), &mut writer)?,
            OutputFormat::RawHits => write_raw_hits(&self.raw_hits(), &mut writer)?,
        }
        std::io::Write::flush(&mut writer)?;
        Ok(())
    }
}

impl Default for HitStore {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

fn merge_raw(total: &mut Vec<u32>, counts: &[u32]) {
    if total.len() < counts.len() {
        total.resize(counts.len(), 0);
    }
    for (slot, &n) in total.iter_mut().zip(counts) {
        *slot = super::counter::saturating_hits(*slot, n);
    }
}

fn flatten(class: &super::class::ClassRecord) -> Vec<u32> {
    let mut counts = Vec::new();
    for line in class.lines() {
        counts.push(line.hits);
        for branch in &line.branches {
            counts.push(branch.true_hits);
            counts.push(branch.false_hits);
        }
        for switch in &line.switches {
            counts.extend_from_slice(switch.hits());
            counts.push(switch.default_hits());
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layout::LineLayout;
    use crate::model::line::LineStatus;

    fn layout() -> ClassLayout {
        ClassLayout::new(vec![
            LineLayout::new(5, "run()V").with_branches(1),
            LineLayout::new(6, "run()V").with_switch(vec![1, 2]),
            LineLayout::new(9, "stop()V"),
        ])
    }

    fn store() -> HitStore {
        HitStore::new(RecorderConfig::builder().tag_tests(true).build())
    }

    #[test]
    fn test_get_or_create_publishes_one_instance() {
        let store = store();
        let a = store.get_or_create_with("a.Foo", layout);
        let b = store.get_or_create_with("a.Foo", || panic!("layout built twice"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn test_concurrent_first_touch_publishes_one_instance() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_or_create_with("a.Race", layout))
            })
            .collect();
        let classes: Vec<Arc<LiveClass>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(classes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_recording_builds_snapshot() {
        let store = store();
        let class = store.get_or_create_with("a.Foo", layout);
        class.record_hit(5);
        class.record_hit(5);
        class.record_branch(5, 0, true);
        class.record_hit(6);
        class.record_switch(6, 0, 2);
        class.record_switch(6, 0, 77);

        let snapshot = store.snapshot();
        let record = snapshot.class("a.Foo").unwrap();
        let line5 = record.line(5).unwrap();
        assert_eq!(line5.hits, 2);
        assert_eq!(line5.branches[0].true_hits, 1);
        assert_eq!(line5.status(), LineStatus::Partial);
        let switch = &record.line(6).unwrap().switches[0];
        assert_eq!(switch.hits(), &[0, 1]);
        assert_eq!(switch.default_hits(), 1);
        assert_eq!(record.line(9).unwrap().status(), LineStatus::None);
    }

    #[test]
    fn test_deserialized_unsorted_layout_records() {
        let store = store();
        let parsed: ClassLayout = serde_json::from_str(
            r#"{ "lines": [
                { "line": 5, "method": "b()V" },
                { "line": 2, "method": "a()V" }
            ] }"#,
        )
        .unwrap();
        let class = store.get_or_create_with("a.Loaded", || parsed);
        class.record_hit(5);
        class.record_hit(2);
        class.record_hit(2);

        let snapshot = store.snapshot();
        let record = snapshot.class("a.Loaded").unwrap();
        assert_eq!(record.line(2).unwrap().hits, 2);
        assert_eq!(record.line(5).unwrap().hits, 1);
        assert!(store.sink().is_empty());
    }

    #[test]
    fn test_record_by_name() {
        let store = store();
        let _ = store.get_or_create_with("a.Foo", layout);
        store.record_hit("a.Foo", 9);
        store.record_branch("a.Foo", 5, 0, false);
        store.record_switch("a.Foo", 6, 0, 1);
        store.record_hit("a.Unknown", 1);
        let snapshot = store.snapshot();
        let record = snapshot.class("a.Foo").unwrap();
        assert_eq!(record.line(9).unwrap().hits, 1);
        assert_eq!(record.line(5).unwrap().branches[0].false_hits, 1);
        assert_eq!(record.line(6).unwrap().switches[0].hits(), &[1, 0]);
    }

    #[test]
    fn test_unknown_line_is_reported_once() {
        let store = store();
        let class = store.get_or_create_with("a.Foo", layout);
        class.record_hit(100);
        class.record_hit(101);
        class.record_branch(9, 0, true);
        assert_eq!(store.sink().count(DiagnosticKind::StructuralMismatch), 1);
    }

    #[test]
    fn test_test_boundaries_tag_and_reset() {
        let store = store();
        let class = store.get_or_create_with("a.Foo", layout);

        store.begin_test("first");
        class.record_hit(5);
        let first = store.end_test();
        assert_eq!(first.class("a.Foo").unwrap().line(5).unwrap().hits, 1);
        assert_eq!(
            first.class("a.Foo").unwrap().line(5).unwrap().test_tag.as_deref(),
            Some("first")
        );
        assert_eq!(class.counts().iter().sum::<u32>(), 0);

        store.begin_test("second");
        class.record_hit(5);
        class.record_hit(9);
        let second = store.end_test();
        assert_eq!(second.class("a.Foo").unwrap().line(5).unwrap().hits, 1);

        let total = store.snapshot();
        let record = total.class("a.Foo").unwrap();
        assert_eq!(record.line(5).unwrap().hits, 2);
        assert_eq!(record.line(9).unwrap().hits, 1);
        assert_eq!(record.line(9).unwrap().test_tag.as_deref(), Some("second"));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let store = store();
        let class = store.get_or_create_with("a.Foo", layout);
        store.begin_test("t");
        class.record_hit(5);
        let _ = store.end_test();
        class.record_hit(9);
        store.clear();
        assert_eq!(store.snapshot().total_hits(), 0);
    }

    #[test]
    fn test_raw_registration_and_hits() {
        let store = store();
        let raw = store.register_raw("a.Flat", 3);
        raw.touch(0);
        raw.touch(2);
        raw.touch(2);
        raw.touch(9);
        let again = store.register_raw("a.Flat", 4);
        assert_eq!(again.slot_count(), 3);
        assert_eq!(store.sink().count(DiagnosticKind::StructuralMismatch), 2);

        let hits = store.raw_hits();
        assert_eq!(hits.get("a.Flat"), Some(&vec![1, 0, 2]));
        assert!(store.snapshot().class("a.Flat").is_none());
    }

    #[test]
    fn test_raw_hits_include_layout_classes_in_slot_order() {
        let store = store();
        let class = store.get_or_create_with("a.Foo", layout);
        class.record_hit(5);
        class.record_branch(5, 0, false);
        class.record_switch(6, 0, 99);
        let hits = store.raw_hits();
        assert_eq!(hits.get("a.Foo"), Some(&vec![1, 0, 1, 0, 0, 0, 1, 0]));
    }

    #[test]
    fn test_save_on_exit_without_path_is_reported() {
        let store = HitStore::default();
        assert!(!store.save_on_exit());
        assert_eq!(store.sink().count(DiagnosticKind::Io), 1);
    }

    #[test]
    fn test_save_on_exit_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("coverage.bin");
        let store = HitStore::new(RecorderConfig::builder().output_path(&path).build());
        let class = store.get_or_create_with("a.Foo", layout);
        class.record_hit(9);
        assert!(store.save_on_exit());
        let loaded = crate::codec::snapshot::load_from_file(&path).unwrap();
        assert_eq!(loaded.class("a.Foo").unwrap().line(9).unwrap().hits, 1);
    }

    #[test]
    fn test_save_on_exit_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = HitStore::new(
            RecorderConfig::builder()
                .output_path(blocker.join("nested.bin"))
                .build(),
        );
        assert!(!store.save_on_exit());
        assert_eq!(store.sink().count(DiagnosticKind::Io), 1);
    }
}
