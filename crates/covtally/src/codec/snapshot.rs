//! Binary snapshot format.
//!
//! ```text
//! version
//! class count, class names (dictionary-compressed)
//! per class:   class id, method count
//!   per method: signature, line count
//!     per line: line number, test tag, hits
//!               [hits > 0] branch count, (true, false)*,
//!                          switch count, (default, key count, (key, hits)*)*
//! [version >= 2] extension count, (tag, byte length, payload)*
//! ```
//!
//! All integers are varints; switch keys are zigzag-encoded. Hit counts are
//! clamped to the counter ceiling on read and line numbers above
//! [`MAX_LINE_NUMBER`](super::varint::MAX_LINE_NUMBER) are rejected.
//! Extensions carry data older readers may skip: instruction weights, source
//! file names, the decision shape of lines that were never executed, and
//! lines excluded from their class.

use super::dictionary::ClassDictionary;
use super::raw::is_raw_format;
use super::varint::{
    read_bytes, read_hits, read_len, read_line_number, read_signed, read_str, read_u32,
    read_varint, write_len, write_signed, write_str, write_varint, PREALLOC_LIMIT,
};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, Severity};
use crate::model::{
    BranchRecord, BranchWeight, ClassRecord, ClassWeights, LineRecord, LineWeight, Snapshot,
    SwitchRecord, SwitchWeight,
};
use crate::result::{CovError, CovResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Version written by this build
pub const SNAPSHOT_VERSION: u64 = 2;

/// Oldest version this build reads
pub const MIN_SNAPSHOT_VERSION: u64 = 1;

const EXT_WEIGHTS: u64 = 1;
const EXT_SOURCE_FILES: u64 = 2;
const EXT_IDLE_DECISIONS: u64 = 3;
const EXT_IGNORED_LINES: u64 = 4;

/// Serialize `snapshot` to `w`
pub fn write_snapshot<W: Write + ?Sized>(snapshot: &Snapshot, w: &mut W) -> CovResult<()> {
    write_varint(w, SNAPSHOT_VERSION)?;
    let classes: Vec<&ClassRecord> = snapshot.classes().collect();
    write_len(w, classes.len())?;
    let mut dict = ClassDictionary::new();
    for class in &classes {
        let _ = dict.write_class_name(w, class.name())?;
    }
    for (id, class) in classes.iter().enumerate() {
        write_len(w, id)?;
        let methods = class.methods();
        write_len(w, methods.len())?;
        for (signature, lines) in methods {
            dict.write_text(w, signature)?;
            write_len(w, lines.len())?;
            for line in lines {
                write_varint(w, u64::from(line.line))?;
                dict.write_text(w, line.test_tag.as_deref().unwrap_or(""))?;
                write_varint(w, u64::from(line.hits))?;
                if line.hits > 0 {
                    write_decisions(w, line)?;
                }
            }
        }
    }
    write_extensions(w, snapshot, &classes)
}

/// Serialize `snapshot` to a new file at `path`
pub fn save_to_file(snapshot: &Snapshot, path: impl AsRef<Path>) -> CovResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_snapshot(snapshot, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Deserialize a snapshot, dropping diagnostics about skipped extensions
pub fn read_snapshot<R: BufRead>(r: R) -> CovResult<Snapshot> {
    read_snapshot_with(r, &DiagnosticSink::new(Severity::Error))
}

/// Deserialize a snapshot, reporting skipped data to `sink`
pub fn read_snapshot_with<R: BufRead>(mut r: R, sink: &DiagnosticSink) -> CovResult<Snapshot> {
    if is_raw_format(r.fill_buf()?) {
        return Err(CovError::format("stream holds raw hit arrays, not a snapshot"));
    }
    let version = read_varint(&mut r, "version")?;
    if version < MIN_SNAPSHOT_VERSION {
        return Err(CovError::UnsupportedVersion {
            found: version,
            supported: SNAPSHOT_VERSION,
        });
    }
    if version > SNAPSHOT_VERSION {
        sink.report(
            DiagnosticKind::SkippedData,
            format!(
                "snapshot version {version} is newer than {SNAPSHOT_VERSION}, \
                 unknown extensions skipped"
            ),
        );
    }

    let mut snapshot = Snapshot::new();
    let mut dict = ClassDictionary::new();
    let class_count = read_len(&mut r, "class count")?;
    let mut names = Vec::with_capacity(class_count.min(PREALLOC_LIMIT));
    for _ in 0..class_count {
        let (_, name) = dict.read_class_name(&mut r)?;
        snapshot.insert(ClassRecord::new(name.clone()));
        names.push(name);
    }

    for _ in 0..class_count {
        let name = class_by_id(&names, &mut r)?;
        let method_count = read_len(&mut r, "method count")?;
        for _ in 0..method_count {
            let signature = dict.read_text(&mut r)?;
            let line_count = read_len(&mut r, "line count")?;
            for _ in 0..line_count {
                let line = read_line(&mut r, &dict, &signature)?;
                snapshot.get_or_create(name).insert_line(line);
            }
        }
    }

    if version >= 2 {
        read_extensions(&mut r, &mut snapshot, &names, sink)?;
    }
    Ok(snapshot)
}

/// Load a snapshot file
pub fn load_from_file(path: impl AsRef<Path>) -> CovResult<Snapshot> {
    read_snapshot(BufReader::new(File::open(path)?))
}

/// Load a snapshot file, reporting skipped data to `sink`
pub fn load_from_file_with(path: impl AsRef<Path>, sink: &DiagnosticSink) -> CovResult<Snapshot> {
    read_snapshot_with(BufReader::new(File::open(path)?), sink)
}

fn class_by_id<'a, R: Read + ?Sized>(names: &'a [String], r: &mut R) -> CovResult<&'a str> {
    let id = read_len(r, "class id")?;
    names
        .get(id)
        .map(String::as_str)
        .ok_or_else(|| CovError::format(format!("class id {id} out of range")))
}

fn read_line<R: Read + ?Sized>(
    r: &mut R,
    dict: &ClassDictionary,
    signature: &str,
) -> CovResult<LineRecord> {
    let number = read_line_number(r, "line number")?;
    let tag = dict.read_text(r)?;
    let hits = read_hits(r, "line hits")?;
    let mut line = LineRecord::new(number, signature).with_hits(hits);
    if !tag.is_empty() {
        line.test_tag = Some(tag);
    }
    if hits > 0 {
        read_decisions(r, &mut line)?;
    }
    Ok(line)
}

fn write_decisions<W: Write + ?Sized>(w: &mut W, line: &LineRecord) -> CovResult<()> {
    write_len(w, line.branches.len())?;
    for branch in &line.branches {
        write_varint(w, u64::from(branch.true_hits))?;
        write_varint(w, u64::from(branch.false_hits))?;
    }
    write_len(w, line.switches.len())?;
    for switch in &line.switches {
        write_varint(w, u64::from(switch.default_hits()))?;
        write_len(w, switch.keys().len())?;
        for (key, hits) in switch.pairs() {
            write_signed(w, key)?;
            write_varint(w, u64::from(hits))?;
        }
    }
    Ok(())
}

fn read_decisions<R: Read + ?Sized>(r: &mut R, line: &mut LineRecord) -> CovResult<()> {
    let branch_count = read_len(r, "branch count")?;
    line.branches = Vec::with_capacity(branch_count.min(PREALLOC_LIMIT));
    for _ in 0..branch_count {
        let true_hits = read_hits(r, "branch hits")?;
        let false_hits = read_hits(r, "branch hits")?;
        line.branches.push(BranchRecord::new(true_hits, false_hits));
    }
    let switch_count = read_len(r, "switch count")?;
    line.switches = Vec::with_capacity(switch_count.min(PREALLOC_LIMIT));
    for _ in 0..switch_count {
        let default_hits = read_hits(r, "switch default hits")?;
        let key_count = read_len(r, "switch key count")?;
        let mut pairs = Vec::with_capacity(key_count.min(PREALLOC_LIMIT));
        for _ in 0..key_count {
            let key = read_signed(r, "switch key")?;
            let hits = read_hits(r, "switch hits")?;
            pairs.push((key, hits));
        }
        line.switches.push(SwitchRecord::from_pairs(default_hits, pairs));
    }
    Ok(())
}

fn write_extensions<W: Write + ?Sized>(
    w: &mut W,
    snapshot: &Snapshot,
    classes: &[&ClassRecord],
) -> CovResult<()> {
    let mut extensions: Vec<(u64, Vec<u8>)> = Vec::new();

    let weighted: Vec<(usize, &ClassWeights)> = classes
        .iter()
        .enumerate()
        .filter_map(|(id, c)| snapshot.weights().class(c.name()).map(|w| (id, w)))
        .collect();
    if !weighted.is_empty() {
        let mut payload = Vec::new();
        write_len(&mut payload, weighted.len())?;
        for (id, weights) in weighted {
            write_len(&mut payload, id)?;
            write_class_weights(&mut payload, weights)?;
        }
        extensions.push((EXT_WEIGHTS, payload));
    }

    let sourced: Vec<(usize, &str)> = classes
        .iter()
        .enumerate()
        .filter_map(|(id, c)| c.source_file().map(|s| (id, s)))
        .collect();
    if !sourced.is_empty() {
        let mut payload = Vec::new();
        write_len(&mut payload, sourced.len())?;
        for (id, source_file) in sourced {
            write_len(&mut payload, id)?;
            write_str(&mut payload, source_file)?;
        }
        extensions.push((EXT_SOURCE_FILES, payload));
    }

    let idle: Vec<(usize, &LineRecord)> = classes
        .iter()
        .enumerate()
        .flat_map(|(id, c)| c.lines().map(move |l| (id, l)))
        .filter(|(_, l)| l.hits == 0 && l.has_decisions())
        .collect();
    if !idle.is_empty() {
        let mut payload = Vec::new();
        write_len(&mut payload, idle.len())?;
        for (id, line) in idle {
            write_len(&mut payload, id)?;
            write_varint(&mut payload, u64::from(line.line))?;
            write_decisions(&mut payload, line)?;
        }
        extensions.push((EXT_IDLE_DECISIONS, payload));
    }

    let ignoring: Vec<(usize, &ClassRecord)> = classes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.ignored_lines().next().is_some())
        .map(|(id, c)| (id, *c))
        .collect();
    if !ignoring.is_empty() {
        let mut payload = Vec::new();
        write_len(&mut payload, ignoring.len())?;
        for (id, class) in ignoring {
            write_len(&mut payload, id)?;
            write_len(&mut payload, class.ignored_lines().count())?;
            for line in class.ignored_lines() {
                write_varint(&mut payload, u64::from(line))?;
            }
        }
        extensions.push((EXT_IGNORED_LINES, payload));
    }

    write_len(w, extensions.len())?;
    for (tag, payload) in extensions {
        write_varint(w, tag)?;
        write_len(w, payload.len())?;
        w.write_all(&payload)?;
    }
    Ok(())
}

fn read_extensions<R: Read + ?Sized>(
    r: &mut R,
    snapshot: &mut Snapshot,
    names: &[String],
    sink: &DiagnosticSink,
) -> CovResult<()> {
    let count = read_len(r, "extension count")?;
    for _ in 0..count {
        let tag = read_varint(r, "extension tag")?;
        let len = read_len(r, "extension length")?;
        let payload = read_bytes(r, len, "extension payload")?;
        let mut p = payload.as_slice();
        match tag {
            EXT_WEIGHTS => read_weights(&mut p, snapshot, names)?,
            EXT_SOURCE_FILES => {
                let entries = read_len(&mut p, "source file count")?;
                for _ in 0..entries {
                    let name = class_by_id(names, &mut p)?;
                    let source_file = read_str(&mut p, "source file")?;
                    snapshot.get_or_create(name).set_source_file(source_file);
                }
            }
            EXT_IDLE_DECISIONS => read_idle_decisions(&mut p, snapshot, names, sink)?,
            EXT_IGNORED_LINES => {
                let entries = read_len(&mut p, "ignoring class count")?;
                for _ in 0..entries {
                    let class = snapshot.get_or_create(class_by_id(names, &mut p)?);
                    let lines = read_len(&mut p, "ignored line count")?;
                    for _ in 0..lines {
                        class.ignore_line(read_line_number(&mut p, "ignored line")?);
                    }
                }
            }
            other => sink.report(
                DiagnosticKind::SkippedData,
                format!("skipped unknown snapshot extension {other} ({len} bytes)"),
            ),
        }
    }
    Ok(())
}

fn write_class_weights<W: Write + ?Sized>(w: &mut W, weights: &ClassWeights) -> CovResult<()> {
    let lines: Vec<(u32, &LineWeight)> = weights.iter().collect();
    write_len(w, lines.len())?;
    for (line, weight) in lines {
        write_varint(w, u64::from(line))?;
        write_varint(w, u64::from(weight.instructions))?;
        write_len(w, weight.branches.len())?;
        for branch in &weight.branches {
            write_varint(w, u64::from(branch.true_arm))?;
            write_varint(w, u64::from(branch.false_arm))?;
        }
        write_len(w, weight.switches.len())?;
        for switch in &weight.switches {
            write_varint(w, u64::from(switch.default_arm))?;
            write_len(w, switch.keys.len())?;
            for &key in &switch.keys {
                write_varint(w, u64::from(key))?;
            }
        }
    }
    Ok(())
}

fn read_weights<R: Read + ?Sized>(
    r: &mut R,
    snapshot: &mut Snapshot,
    names: &[String],
) -> CovResult<()> {
    let classes = read_len(r, "weighted class count")?;
    for _ in 0..classes {
        let name = class_by_id(names, r)?;
        let mut weights = ClassWeights::new();
        let lines = read_len(r, "weighted line count")?;
        for _ in 0..lines {
            let line = read_line_number(r, "weighted line")?;
            let mut weight = LineWeight::new(read_u32(r, "line instructions")?);
            let branches = read_len(r, "branch weight count")?;
            for _ in 0..branches {
                let true_arm = read_u32(r, "branch weight")?;
                let false_arm = read_u32(r, "branch weight")?;
                weight.branches.push(BranchWeight {
                    true_arm,
                    false_arm,
                });
            }
            let switches = read_len(r, "switch weight count")?;
            for _ in 0..switches {
                let default_arm = read_u32(r, "switch default weight")?;
                let key_count = read_len(r, "switch weight key count")?;
                let keys = (0..key_count)
                    .map(|_| read_u32(r, "switch key weight"))
                    .collect::<CovResult<Vec<u32>>>()?;
                weight.switches.push(SwitchWeight { default_arm, keys });
            }
            weights.set(line, weight);
        }
        snapshot.weights_mut().insert(name, weights);
    }
    Ok(())
}

fn read_idle_decisions<R: Read + ?Sized>(
    r: &mut R,
    snapshot: &mut Snapshot,
    names: &[String],
    sink: &DiagnosticSink,
) -> CovResult<()> {
    let entries = read_len(r, "idle line count")?;
    for _ in 0..entries {
        let name = class_by_id(names, r)?;
        let number = read_line_number(r, "idle line number")?;
        let mut decisions = LineRecord::default();
        read_decisions(r, &mut decisions)?;
        match snapshot.class_mut(name).and_then(|c| c.line_mut(number)) {
            Some(line) => {
                line.branches = decisions.branches;
                line.switches = decisions.switches;
            }
            None => sink.report(
                DiagnosticKind::SkippedData,
                format!("{name}: decision shape for unknown line {number} skipped"),
            ),
        }
    }
    Ok(())
}
