//! End-to-end aggregation: recorded files on disk, structural baseline,
//! per-request filtering and merged output files.

use covtally::codec::{load_from_file, save_to_file};
use covtally::{
    Aggregator, AggregatorConfig, ClassLayout, ClassRecord, DiagnosticKind, HitStore,
    LineLayout, LineRecord, OutputFormat, RecorderConfig, Request, Snapshot, StaticStructure,
};
use std::path::PathBuf;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn structure() -> Snapshot {
    Snapshot::new()
        .with_class(
            ClassRecord::new("a.Foo")
                .with_source_file("Foo.kt")
                .with_line(LineRecord::new(1, "run()V"))
                .with_line(LineRecord::new(2, "run()V")),
        )
        .with_class(ClassRecord::new("a.internal.Bar").with_line(LineRecord::new(1, "go()V")))
        .with_class(ClassRecord::new("b.Baz").with_line(LineRecord::new(3, "idle()V")))
}

fn report_one() -> Snapshot {
    Snapshot::new()
        .with_class(ClassRecord::new("a.Foo").with_line(LineRecord::new(1, "run()V").with_hits(2)))
        .with_class(
            ClassRecord::new("a.internal.Bar").with_line(LineRecord::new(1, "go()V").with_hits(1)),
        )
}

fn report_two() -> Snapshot {
    Snapshot::new().with_class(
        ClassRecord::new("a.Foo")
            .with_line(LineRecord::new(1, "run()V").with_hits(3))
            .with_line(LineRecord::new(2, "run()V").with_hits(1)),
    )
}

fn strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| (*p).to_string()).collect()
}

#[test]
fn test_requests_filter_and_merge_reports() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("run1.bin");
    let second = dir.path().join("run2.bin");
    save_to_file(&report_one(), &first).unwrap();
    save_to_file(&report_two(), &second).unwrap();

    let scoped_out = dir.path().join("out/scoped.bin");
    let everything_out = dir.path().join("out/everything.bin");
    let scoped = Request::new(
        &strings(&[r"a\..*"]),
        &strings(&[r"a\.internal\..*"]),
        Some(scoped_out.clone()),
    )
    .unwrap();
    let everything = Request::new(&strings(&[".*"]), &[], Some(everything_out.clone())).unwrap();

    let root = PathBuf::from("module/classes");
    let aggregator = Aggregator::new(StaticStructure::new().with_root(&root, structure()))
        .with_request(scoped)
        .with_request(everything)
        .with_report(&first)
        .with_report(&second)
        .with_output_root(&root);
    let results = aggregator.run().unwrap();
    assert_eq!(results.len(), 2);

    let scoped_result = &results[0];
    assert_eq!(scoped_result.class_names().collect::<Vec<_>>(), vec!["a.Foo"]);
    let foo = scoped_result.class("a.Foo").unwrap();
    assert_eq!(foo.line(1).unwrap().hits, 5);
    assert_eq!(foo.line(2).unwrap().hits, 1);
    assert_eq!(foo.source_file(), Some("Foo.kt"));

    let everything_result = &results[1];
    assert_eq!(
        everything_result.class_names().collect::<Vec<_>>(),
        vec!["a.Foo", "a.internal.Bar", "b.Baz"]
    );
    assert_eq!(everything_result.class("a.internal.Bar").unwrap().line(1).unwrap().hits, 1);
    assert_eq!(everything_result.class("b.Baz").unwrap().line(3).unwrap().hits, 0);

    assert_eq!(&load_from_file(&scoped_out).unwrap(), scoped_result);
    assert_eq!(&load_from_file(&everything_out).unwrap(), everything_result);
    assert!(aggregator.sink().is_empty());
}

#[test]
fn test_unknown_recorded_class_is_reported_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("run.bin");
    let recorded = report_two()
        .with_class(ClassRecord::new("c.Gone").with_line(LineRecord::new(1, "x()V").with_hits(4)));
    save_to_file(&recorded, &report).unwrap();

    let aggregator = Aggregator::new(StaticStructure::new().with_root("root", structure()))
        .with_request(Request::new(&[], &[], None).unwrap())
        .with_request(Request::new(&strings(&[r"a\..*"]), &[], None).unwrap())
        .with_report(&report)
        .with_output_root("root");
    let results = aggregator.run().unwrap();

    assert!(!results[0].contains("c.Gone"));
    assert_eq!(results[0].class("a.Foo").unwrap().line(1).unwrap().hits, 3);
    // Only the unfiltered request sees the class and complains about it.
    assert_eq!(aggregator.sink().count(DiagnosticKind::MissingClass), 1);
}

#[test]
fn test_raw_report_attributed_against_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("raw.bin");
    let config = RecorderConfig::builder()
        .output_path(&report)
        .output_format(OutputFormat::RawHits)
        .build();
    let store = HitStore::new(config);
    let foo = store.get_or_create_with("a.Foo", || {
        ClassLayout::new(vec![LineLayout::new(1, "run()V"), LineLayout::new(2, "run()V")])
    });
    foo.record_hit(2);
    foo.record_hit(2);
    assert!(store.save_on_exit());
    assert!(covtally::codec::is_raw_file(&report).unwrap());

    let aggregator = Aggregator::new(StaticStructure::new().with_root("root", structure()))
        .with_request(Request::new(&strings(&[r"a\.Foo"]), &[], None).unwrap())
        .with_report(&report)
        .with_output_root("root");
    let results = aggregator.run().unwrap();
    let foo = results[0].class("a.Foo").unwrap();
    assert_eq!(foo.line(1).unwrap().hits, 0);
    assert_eq!(foo.line(2).unwrap().hits, 2);
}

#[test]
fn test_from_config_json() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("run.bin");
    save_to_file(&report_one(), &report).unwrap();
    let json = format!(
        r#"{{
            "requests": [{{ "include": ["a\\..*"], "exclude": ["a\\.internal\\..*"] }}],
            "reports": [{report:?}],
            "output_roots": ["root"],
            "diagnostic_threshold": "debug"
        }}"#,
        report = report.display().to_string()
    );
    let config = AggregatorConfig::from_json_str(&json).unwrap();
    let aggregator =
        Aggregator::from_config(&config, StaticStructure::new().with_root("root", structure()))
            .unwrap();
    assert_eq!(aggregator.requests().len(), 1);
    let results = aggregator.run().unwrap();
    assert_eq!(results[0].len(), 1);
    assert_eq!(results[0].class("a.Foo").unwrap().line(1).unwrap().hits, 2);
}

#[test]
fn test_invalid_pattern_rejected() {
    let err = Request::new(&strings(&["a.(b"]), &[], None).unwrap_err();
    assert!(matches!(err, covtally::CovError::InvalidPattern { .. }));
}

#[test]
fn test_missing_report_file_is_io_error() {
    let aggregator = Aggregator::new(StaticStructure::new())
        .with_request(Request::new(&[], &[], None).unwrap())
        .with_report("/nonexistent/covtally/run.bin");
    assert!(matches!(aggregator.run(), Err(covtally::CovError::Io(_))));
}
