//! End-to-end tests of the build, replace, and stats workflows.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use geoindex_core::{GraphName, IndexerConfig, StatsStrategy, CRS84_URI};
use geoindex_lifecycle::render::render_table;
use geoindex_lifecycle::{
    BuildRequest, Lifecycle, LifecycleError, Notice, PersistError, ReplaceRequest, StatsReport,
    StatsRequest, WorkflowOutcome,
};
use geoindex_store::{GeometryRecord, MemoryDataset, QuadFileDataset};

const G1: &str = "http://example.org/G1";
const G2: &str = "http://example.org/G2";

fn config() -> IndexerConfig {
    IndexerConfig {
        worker_threads: 4,
        ..IndexerConfig::default()
    }
}

fn add_points(ds: &mut MemoryDataset, graph: &str, prefix: &str, count: usize) {
    let graph = GraphName::from(graph);
    ds.add_graph(graph.clone());
    for i in 0..count {
        let x = (i % 360) as f64 - 180.0;
        let y = ((i / 360) % 180) as f64 - 90.0;
        ds.insert(
            Some(&graph),
            GeometryRecord::point(format!("{prefix}:{i}"), x, y),
        );
    }
}

fn sizes(report: &StatsReport) -> Vec<(String, usize)> {
    report
        .rows()
        .iter()
        .map(|row| (row.graph.clone(), row.size))
        .collect()
}

fn stats<D: geoindex_store::Dataset>(lc: &Lifecycle<D>, path: &Path, depth: bool) -> StatsReport {
    let request = StatsRequest {
        include_depth: depth,
        ..StatsRequest::new(path)
    };
    lc.stats(&request).unwrap().completed().unwrap()
}

#[test]
fn test_build_then_replace_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, G1, "urn:g1", 3);
    add_points(&mut ds, G2, "urn:g2", 0);
    let mut lc = Lifecycle::new(ds, config()).unwrap();

    let request = BuildRequest {
        srs: Some(CRS84_URI.to_string()),
        index_per_graph: true,
        ..BuildRequest::new(&path)
    };
    lc.build(&request).unwrap();

    assert_eq!(
        sizes(&stats(&lc, &path, false)),
        vec![
            ("DEFAULT".to_string(), 0),
            (G1.to_string(), 3),
            (G2.to_string(), 0),
        ]
    );

    let g1 = GraphName::from(G1);
    lc.dataset_mut()
        .insert(Some(&g1), GeometryRecord::point("urn:g1:new1", 10.0, 10.0));
    lc.dataset_mut()
        .insert(Some(&g1), GeometryRecord::point("urn:g1:new2", 11.0, 11.0));
    lc.replace(&ReplaceRequest::new(&path, [G1])).unwrap();

    assert_eq!(
        sizes(&stats(&lc, &path, false)),
        vec![
            ("DEFAULT".to_string(), 0),
            (G1.to_string(), 5),
            (G2.to_string(), 0),
        ]
    );
}

#[test]
fn test_overwrite_build_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, "http://example.org/a", "urn:a", 2_000);
    add_points(&mut ds, "http://example.org/b", "urn:b", 17);
    let lc = Lifecycle::new(ds, config()).unwrap();

    let request = BuildRequest {
        srs: Some(CRS84_URI.to_string()),
        overwrite: true,
        ..BuildRequest::new(&path)
    };

    lc.build(&request).unwrap();
    let first = render_table(&stats(&lc, &path, true), true);
    lc.build(&request).unwrap();
    let second = render_table(&stats(&lc, &path, true), true);

    assert_eq!(first, second);
    assert!(first.contains("http://example.org/a"));
}

#[test]
fn test_replace_is_local_to_requested_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, "A", "urn:a", 1_500);
    add_points(&mut ds, "B", "urn:b", 4);
    add_points(&mut ds, "C", "urn:c", 9);
    let mut lc = Lifecycle::new(ds, config()).unwrap();
    lc.build(&BuildRequest::new(&path)).unwrap();
    let before = stats(&lc, &path, true);

    // B shrinks; A also changes in the dataset but is not requested
    let b = GraphName::from("B");
    lc.dataset_mut().clear_graph(&b);
    lc.dataset_mut()
        .insert(Some(&b), GeometryRecord::point("urn:b:only", 0.0, 0.0));
    add_points(lc.dataset_mut(), "A", "urn:a:extra", 10);

    let summary = lc
        .replace(&ReplaceRequest::new(&path, ["B"]))
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(summary.changes.len(), 1);
    assert_eq!(summary.changes[0].previous_size, Some(4));
    assert_eq!(summary.changes[0].new_size, 1);

    let after = stats(&lc, &path, true);
    for graph in ["A", "C", "DEFAULT"] {
        assert_eq!(before.get(graph), after.get(graph), "graph {graph} changed");
    }
    assert_eq!(after.get("B").unwrap().size, 1);
}

#[test]
fn test_stats_rows_sorted_with_default_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, "zeta", "urn:z", 1);
    add_points(&mut ds, "alpha", "urn:a", 1);
    let lc = Lifecycle::new(ds, config()).unwrap();
    lc.build(&BuildRequest::new(&path)).unwrap();

    let report = stats(&lc, &path, false);
    let order: Vec<&str> = report.rows().iter().map(|r| r.graph.as_str()).collect();
    assert_eq!(order, vec!["DEFAULT", "alpha", "zeta"]);
}

#[test]
fn test_missing_index_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never-built.json");

    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notices);
    let lc = Lifecycle::new(MemoryDataset::new(), config())
        .unwrap()
        .with_notifier(move |n| sink.lock().unwrap().push(n.to_string()));

    let replaced = lc.replace(&ReplaceRequest::new(&path, [G1])).unwrap();
    let reported = lc.stats(&StatsRequest::new(&path)).unwrap();

    assert!(matches!(replaced, WorkflowOutcome::Skipped { .. }));
    assert!(matches!(reported, WorkflowOutcome::Skipped { .. }));
    assert!(!path.exists());
    assert_eq!(
        *notices.lock().unwrap(),
        vec![
            "Spatial index does not exist.".to_string(),
            "Spatial index does not exist.".to_string(),
        ]
    );
}

#[test]
fn test_failed_overwrite_keeps_old_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, G1, "urn:g1", 3);
    let mut lc = Lifecycle::new(ds, config()).unwrap();
    lc.build(&BuildRequest::new(&path)).unwrap();
    let old = fs::read(&path).unwrap();

    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&path, perms).unwrap();

    add_points(lc.dataset_mut(), G2, "urn:g2", 5);
    let request = BuildRequest {
        overwrite: true,
        ..BuildRequest::new(&path)
    };
    let err = lc.build(&request).unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Persist(PersistError::NotReplaceable { .. })
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(fs::read(&path).unwrap(), old);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_legacy_direct_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let mut ds = MemoryDataset::new();
    add_points(&mut ds, G1, "urn:g1", 2);
    let legacy = IndexerConfig {
        atomic_writes: false,
        stats_strategy: StatsStrategy::DomainQuery,
        ..config()
    };
    let mut lc = Lifecycle::new(ds, legacy).unwrap();

    let built = lc.build(&BuildRequest::new(&path)).unwrap().completed().unwrap();
    assert!(!built.atomic);

    add_points(lc.dataset_mut(), G1, "urn:g1:more", 3);
    let replaced = lc
        .replace(&ReplaceRequest::new(&path, [G1]))
        .unwrap()
        .completed()
        .unwrap();
    assert!(!replaced.atomic);

    assert_eq!(stats(&lc, &path, false).get(G1).unwrap().size, 5);
}

#[test]
fn test_workflows_over_quad_files() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    let path = dir.path().join("index.json");

    let quad = |subject: &str, wkt: &str, graph: &str| {
        format!(
            "<{subject}> <http://www.opengis.net/ont/geosparql#asWKT> \"{wkt}\"^^<http://www.opengis.net/ont/geosparql#wktLiteral> <{graph}> .\n"
        )
    };
    fs::write(
        data.join("one.nq"),
        [
            quad("urn:p1", "POINT(1 1)", G1),
            quad("urn:p2", "POINT(2 2)", G1),
            "<urn:s> <urn:p> \"text\" <http://example.org/G2> .\n".to_string(),
        ]
        .concat(),
    )
    .unwrap();

    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notices);
    let lc = Lifecycle::new(QuadFileDataset::open(&data).unwrap(), config())
        .unwrap()
        .with_notifier(move |n: &Notice| sink.lock().unwrap().push(n.clone()));
    let summary = lc.build(&BuildRequest::new(&path)).unwrap().completed().unwrap();

    assert!(summary.srs_derived);
    assert_eq!(summary.srs_uri, CRS84_URI);
    assert_eq!(summary.graph_count, 2);
    assert!(notices.lock().unwrap().contains(&Notice::SrsSelected {
        uri: CRS84_URI.to_string(),
        derived: true,
    }));

    fs::write(data.join("two.nq"), quad("urn:p3", "POINT(3 3)", G2)).unwrap();
    let lc = Lifecycle::new(QuadFileDataset::open(&data).unwrap(), config()).unwrap();
    lc.replace(&ReplaceRequest::new(&path, [G2])).unwrap();

    let report = stats(&lc, &path, false);
    assert_eq!(report.get(G1).unwrap().size, 2);
    assert_eq!(report.get(G2).unwrap().size, 1);
}

#[test]
fn test_unreadable_ordinates_are_skipped_at_build() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    let path = dir.path().join("index.json");

    let quad = |subject: &str, wkt: &str| {
        format!(
            "<{subject}> <http://www.opengis.net/ont/geosparql#asWKT> \"{wkt}\"^^<http://www.opengis.net/ont/geosparql#wktLiteral> <{G1}> .\n"
        )
    };
    fs::write(
        data.join("one.nq"),
        [
            quad("urn:huge", "POINT(1 1e400)"),
            quad("urn:nan", "POINT(NaN 1)"),
            quad("urn:ok", "POINT(2 2)"),
        ]
        .concat(),
    )
    .unwrap();

    let lc = Lifecycle::new(QuadFileDataset::open(&data).unwrap(), config()).unwrap();
    lc.build(&BuildRequest::new(&path)).unwrap();

    let report = stats(&lc, &path, false);
    assert_eq!(report.get(G1).unwrap().size, 1);
}

#[test]
fn test_non_finite_geometry_never_reaches_the_index_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");

    let g1 = GraphName::from(G1);
    let mut ds = MemoryDataset::new();
    ds.insert(Some(&g1), GeometryRecord::point("urn:ok", 1.0, 1.0));
    ds.insert(Some(&g1), GeometryRecord::point("urn:far", 1.0, f64::INFINITY));

    for atomic_writes in [true, false] {
        let lc = Lifecycle::new(
            ds.clone(),
            IndexerConfig {
                atomic_writes,
                ..config()
            },
        )
        .unwrap();

        let err = lc.build(&BuildRequest::new(&path)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("urn:far"), "{err}");
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
