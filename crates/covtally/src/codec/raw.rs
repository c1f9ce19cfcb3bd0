//! Raw hit arrays ("offline" format).
//!
//! ```text
//! magic (u32, big-endian)
//! config string
//! (class name, counter count, counter*)*
//! empty class name
//! ```
//!
//! The counters carry no structure of their own; they are attributed to
//! lines by [`reconcile`], using the slot order of [`ClassLayout`] derived
//! from a structural baseline.

use super::varint::{
    read_hits, read_len, read_str, write_len, write_str, write_varint, PREALLOC_LIMIT,
};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, Severity};
use crate::model::{saturating_hits, ClassLayout, Snapshot};
use crate::result::{CovError, CovResult};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Leading bytes of a raw-hits stream
pub const RAW_MAGIC: u32 = 284_996_684;

/// Class name → flat counter array
pub type RawHits = BTreeMap<String, Vec<u32>>;

/// True if `prefix` starts with [`RAW_MAGIC`]
#[must_use]
pub fn is_raw_format(prefix: &[u8]) -> bool {
    prefix.get(..4) == Some(RAW_MAGIC.to_be_bytes().as_slice())
}

/// True if the file at `path` starts with [`RAW_MAGIC`]
pub fn is_raw_file(path: impl AsRef<Path>) -> CovResult<bool> {
    let mut prefix = Vec::with_capacity(4);
    let _ = File::open(path)?.take(4).read_to_end(&mut prefix)?;
    Ok(is_raw_format(&prefix))
}

/// Serialize raw hit arrays.
///
/// An empty class name would read back as the end of the stream, so it is a
/// [`CovError::Format`] error.
pub fn write_raw_hits<W: Write + ?Sized>(hits: &RawHits, w: &mut W) -> CovResult<()> {
    if hits.contains_key("") {
        return Err(CovError::format("raw hits entry with an empty class name"));
    }
    w.write_all(&RAW_MAGIC.to_be_bytes())?;
    write_str(w, "")?;
    for (name, counts) in hits {
        write_str(w, name)?;
        write_len(w, counts.len())?;
        for &count in counts {
            write_varint(w, u64::from(count))?;
        }
    }
    write_str(w, "")?;
    Ok(())
}

/// Serialize raw hit arrays to a new file at `path`
pub fn save_raw_to_file(hits: &RawHits, path: impl AsRef<Path>) -> CovResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_raw_hits(hits, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Deserialize raw hit arrays, dropping diagnostics
pub fn read_raw_hits<R: Read>(r: R) -> CovResult<RawHits> {
    read_raw_hits_with(r, &DiagnosticSink::new(Severity::Error))
}

/// Deserialize raw hit arrays.
///
/// A class listed twice with the same length has its arrays summed. A class
/// listed again with a different length is a structural mismatch: it is
/// reported and the class is dropped from the result.
pub fn read_raw_hits_with<R: Read>(mut r: R, sink: &DiagnosticSink) -> CovResult<RawHits> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => CovError::truncated("raw hits magic"),
        _ => err.into(),
    })?;
    if u32::from_be_bytes(magic) != RAW_MAGIC {
        return Err(CovError::format(format!(
            "bad raw hits magic {:#010x}",
            u32::from_be_bytes(magic)
        )));
    }
    let _config = read_str(&mut r, "raw hits config")?;

    let mut hits = RawHits::new();
    let mut rejected: Vec<String> = Vec::new();
    loop {
        let name = read_str(&mut r, "class name")?;
        if name.is_empty() {
            break;
        }
        let len = read_len(&mut r, "counter count")?;
        let mut counts = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for _ in 0..len {
            counts.push(read_hits(&mut r, "counter")?);
        }
        if rejected.contains(&name) {
            continue;
        }
        match hits.get_mut(&name) {
            None => {
                let _ = hits.insert(name, counts);
            }
            Some(existing) if existing.len() == counts.len() => {
                for (total, n) in existing.iter_mut().zip(counts) {
                    *total = saturating_hits(*total, n);
                }
            }
            Some(existing) => {
                sink.report_error(&CovError::structural(
                    name.as_str(),
                    format!(
                        "recorded with {} counters and with {}",
                        existing.len(),
                        counts.len()
                    ),
                ));
                let _ = hits.remove(&name);
                rejected.push(name);
            }
        }
    }
    Ok(hits)
}

/// Load a raw hits file, reporting structural problems to `sink`
pub fn load_raw_from_file(path: impl AsRef<Path>, sink: &DiagnosticSink) -> CovResult<RawHits> {
    read_raw_hits_with(BufReader::new(File::open(path)?), sink)
}

/// Attribute raw hit arrays to the lines of `baseline`.
///
/// Classes missing from the baseline and classes whose array length does not
/// match the baseline structure are reported and skipped.
#[must_use]
pub fn reconcile(raw: &RawHits, baseline: &Snapshot, sink: &DiagnosticSink) -> Snapshot {
    let mut reconciled = Snapshot::new();
    for (name, counts) in raw {
        let Some(class) = baseline.class(name) else {
            sink.report(
                DiagnosticKind::MissingClass,
                format!("{name}: recorded but not part of the structural baseline"),
            );
            continue;
        };
        match ClassLayout::from_record(class).attribute(name, counts) {
            Ok(record) => {
                reconciled.insert(record);
                if let Some(weights) = baseline.weights().class(name) {
                    reconciled.weights_mut().insert(name.as_str(), weights.clone());
                }
            }
            Err(err) => sink.report_error(&err),
        }
    }
    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BranchRecord, ClassRecord, LineRecord, SwitchRecord};

    fn encode(hits: &RawHits) -> Vec<u8> {
        let mut buf = Vec::new();
        write_raw_hits(hits, &mut buf).unwrap();
        buf
    }

    fn entry(buf: &mut Vec<u8>, name: &str, counts: &[u32]) {
        write_str(buf, name).unwrap();
        write_len(buf, counts.len()).unwrap();
        for &c in counts {
            write_varint(buf, u64::from(c)).unwrap();
        }
    }

    fn stream(entries: &[(&str, &[u32])]) -> Vec<u8> {
        let mut buf = RAW_MAGIC.to_be_bytes().to_vec();
        write_str(&mut buf, "").unwrap();
        for (name, counts) in entries {
            entry(&mut buf, name, counts);
        }
        write_str(&mut buf, "").unwrap();
        buf
    }

    #[test]
    fn test_magic_detection() {
        let buf = encode(&RawHits::new());
        assert_eq!(&buf[..4], &[0x10, 0xFC, 0xB4, 0x4C]);
        assert!(is_raw_format(&buf));
        assert!(!is_raw_format(&buf[..3]));
        assert!(!is_raw_format(&[2, 0, 0, 0]));
    }

    #[test]
    fn test_round_trip() {
        let mut hits = RawHits::new();
        let _ = hits.insert("a.Foo".into(), vec![1, 0, 7]);
        let _ = hits.insert("a.Empty".into(), vec![]);
        assert_eq!(read_raw_hits(encode(&hits).as_slice()).unwrap(), hits);
    }

    #[test]
    fn test_empty_class_name_is_not_written() {
        let mut hits = RawHits::new();
        let _ = hits.insert("a.Foo".into(), vec![1]);
        let _ = hits.insert(String::new(), vec![2]);
        let mut buf = Vec::new();
        assert!(matches!(
            write_raw_hits(&hits, &mut buf),
            Err(CovError::Format { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_counters_clamped_to_ceiling() {
        let buf = stream(&[("a.Foo", &[u32::MAX, 3])]);
        let hits = read_raw_hits(buf.as_slice()).unwrap();
        assert_eq!(hits["a.Foo"], vec![crate::model::HIT_CEILING, 3]);
    }

    #[test]
    fn test_duplicate_class_same_length_is_summed() {
        let buf = stream(&[("a.Foo", &[1, 2]), ("a.Foo", &[3, 0])]);
        let hits = read_raw_hits(buf.as_slice()).unwrap();
        assert_eq!(hits["a.Foo"], vec![4, 2]);
    }

    #[test]
    fn test_duplicate_class_other_length_is_rejected() {
        let buf = stream(&[
            ("a.Foo", &[1, 2]),
            ("a.Bar", &[5]),
            ("a.Foo", &[3]),
            ("a.Foo", &[1, 1]),
        ]);
        let sink = DiagnosticSink::default();
        let hits = read_raw_hits_with(buf.as_slice(), &sink).unwrap();
        assert!(!hits.contains_key("a.Foo"));
        assert_eq!(hits["a.Bar"], vec![5]);
        assert_eq!(sink.count(DiagnosticKind::StructuralMismatch), 1);
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            read_raw_hits([0u8, 1, 2, 3, 0].as_slice()),
            Err(CovError::Format { .. })
        ));
    }

    #[test]
    fn test_missing_terminator_is_truncated() {
        let mut buf = stream(&[("a.Foo", &[1])]);
        let _ = buf.pop();
        assert!(matches!(
            read_raw_hits(buf.as_slice()),
            Err(CovError::Truncated { .. })
        ));
    }

    fn baseline() -> Snapshot {
        Snapshot::new().with_class(
            ClassRecord::new("a.Foo")
                .with_source_file("Foo.java")
                .with_line(LineRecord::new(3, "run()V").with_branch(BranchRecord::default()))
                .with_line(LineRecord::new(4, "run()V").with_switch(SwitchRecord::new(vec![1, 2])))
                .with_line(LineRecord::new(8, "stop()V")),
        )
    }

    #[test]
    fn test_reconcile_attributes_slots() {
        let mut raw = RawHits::new();
        let _ = raw.insert("a.Foo".into(), vec![2, 1, 1, 1, 0, 1, 0, 0]);
        let sink = DiagnosticSink::default();
        let snapshot = reconcile(&raw, &baseline(), &sink);
        assert!(sink.is_empty());

        let class = snapshot.class("a.Foo").unwrap();
        assert_eq!(class.source_file(), Some("Foo.java"));
        let line3 = class.line(3).unwrap();
        assert_eq!(line3.hits, 2);
        assert_eq!(line3.branches[0], BranchRecord::new(1, 1));
        let line4 = class.line(4).unwrap();
        assert_eq!(line4.hits, 1);
        assert_eq!(line4.switches[0].hits(), &[0, 1]);
        assert_eq!(line4.switches[0].default_hits(), 0);
        assert_eq!(class.line(8).unwrap().hits, 0);
    }

    #[test]
    fn test_reconcile_reports_missing_and_mismatched() {
        let mut raw = RawHits::new();
        let _ = raw.insert("a.Foo".into(), vec![1, 2]);
        let _ = raw.insert("a.Ghost".into(), vec![1]);
        let sink = DiagnosticSink::default();
        let snapshot = reconcile(&raw, &baseline(), &sink);
        assert!(snapshot.is_empty());
        assert_eq!(sink.count(DiagnosticKind::StructuralMismatch), 1);
        assert_eq!(sink.count(DiagnosticKind::MissingClass), 1);
    }

    #[test]
    fn test_raw_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("raw.bin");
        save_raw_to_file(&RawHits::new(), &raw_path).unwrap();
        assert!(is_raw_file(&raw_path).unwrap());

        let other = dir.path().join("snap.bin");
        super::super::snapshot::save_to_file(&Snapshot::new(), &other).unwrap();
        assert!(!is_raw_file(&other).unwrap());
    }
}
