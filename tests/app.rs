use std::fs;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};

use pointpack::app::{
    self, App, ConversionOptions, ConversionRequest, RejectedSource, SourceInput, SourceStatus,
};
use pointpack::archive::list_entries;
use pointpack::dataset::FeatureDataset;
use pointpack::domain::{ColumnSelection, CrsPolicy};
use pointpack::encoder::{DatasetEncoder, ShapefileEncoder};
use pointpack::error::PointpackError;
use pointpack::extract::ExtractionStatus;
use pointpack::output::JsonOutput;
use pointpack::table::read_delimited;
use pointpack::workspace::WorkspaceManager;

/// Writes one `.pts` file per dataset and records each stem it saw.
#[derive(Default)]
struct MockEncoder {
    stems: Mutex<Vec<String>>,
}

impl DatasetEncoder for MockEncoder {
    fn encode(&self, dataset: &FeatureDataset, stem: &Utf8Path) -> Result<(), PointpackError> {
        self.stems.lock().unwrap().push(stem.file_name().unwrap().to_string());
        let body: String = dataset
            .features()
            .iter()
            .map(|f| format!("{} {}\n", f.geometry.x(), f.geometry.y()))
            .collect();
        fs::write(format!("{stem}.pts"), body)
            .map_err(|err| PointpackError::Encoding(err.to_string()))
    }
}

/// Succeeds without writing anything.
struct SilentEncoder;

impl DatasetEncoder for SilentEncoder {
    fn encode(&self, _dataset: &FeatureDataset, _stem: &Utf8Path) -> Result<(), PointpackError> {
        Ok(())
    }
}

fn source(name: &str, csv: &str) -> SourceInput {
    SourceInput {
        name: name.to_string(),
        table: read_delimited(csv.as_bytes(), b',').unwrap(),
        columns: ColumnSelection::default(),
        crs: None,
    }
}

fn request(sources: Vec<SourceInput>) -> ConversionRequest {
    ConversionRequest::new(sources, ConversionOptions::default())
}

fn root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("runs")).unwrap()
}

fn assert_root_empty(root: &Utf8Path) {
    let leftover = fs::read_dir(root.as_std_path())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0, "workspace root {root} not empty");
}

#[test]
fn converts_single_source_into_named_archive() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), ShapefileEncoder);

    let outcome = app
        .convert(
            request(vec![source(
                "sites.csv",
                "lat,lon,id\n1.0,2.0,A\nbad,3.0,B\n",
            )]),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(outcome.sources.len(), 1);
    let report = &outcome.sources[0];
    assert_eq!(report.status, SourceStatus::Converted);
    assert_eq!(report.features, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.crs.as_deref(), Some("EPSG:4326"));
    assert_eq!(report.crs_label.as_deref(), Some("WGS 84"));

    let archive = outcome.archive.unwrap();
    assert_eq!(archive.file_name, "sites.zip");
    let entries = list_entries(&archive.bytes).unwrap();
    assert!(entries.iter().all(|e| e.starts_with("sites.")));
    assert!(entries.contains(&"sites.shp".to_string()));
    assert!(entries.contains(&"sites.dbf".to_string()));
    assert_eq!(entries, archive.entries);
    assert_root_empty(app.workspaces().root());
}

#[test]
fn failed_source_does_not_abort_batch() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let outcome = app
        .convert(
            request(vec![
                source("good.csv", "lat,lon\n1,2\n3,4\n"),
                source("nocols.csv", "y,x\n1,2\n"),
                source("blank.csv", "lat,lon\nNA,NA\n"),
            ]),
            &JsonOutput,
        )
        .unwrap();

    let statuses: Vec<_> = outcome.sources.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            SourceStatus::Converted,
            SourceStatus::Failed,
            SourceStatus::Empty
        ]
    );
    assert!(
        outcome.sources[1]
            .message
            .as_deref()
            .unwrap()
            .starts_with("nocols.csv:")
    );

    let archive = outcome.archive.unwrap();
    assert_eq!(archive.entries, vec!["good.pts".to_string()]);
    assert_eq!(*app_stems(&app), vec!["good".to_string()]);
    assert_root_empty(app.workspaces().root());
}

#[test]
fn unreadable_inputs_are_reported_as_failed() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let mut req = request(vec![source("good.csv", "lat,lon\n1,2\n")]);
    req.rejected.push(RejectedSource::new(
        "survey.xlsx",
        &PointpackError::UnsupportedInput("survey.xlsx".to_string()),
    ));

    let outcome = app.convert(req, &JsonOutput).unwrap();
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.count(SourceStatus::Failed), 1);
    assert_eq!(outcome.count(SourceStatus::Converted), 1);

    let failed = outcome
        .sources
        .iter()
        .find(|s| s.status == SourceStatus::Failed)
        .unwrap();
    assert_eq!(failed.source, "survey.xlsx");
    assert!(
        failed
            .message
            .as_deref()
            .unwrap()
            .starts_with("survey.xlsx: unsupported input")
    );

    let json = serde_json::to_value(&outcome).unwrap();
    let names: Vec<&str> = json["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["source"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"survey.xlsx"));
    assert_eq!(outcome.archive.unwrap().entries, vec!["good.pts".to_string()]);
}

fn app_stems(app: &App<MockEncoder>) -> MutexGuard<'_, Vec<String>> {
    app.encoder().stems.lock().unwrap()
}

#[test]
fn colliding_names_fail_before_anything_is_written() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let outcome = app
        .convert(
            request(vec![
                source("sites.csv", "lat,lon\n1,2\n"),
                source("wells.csv", "lat,lon\n3,4\n"),
                source("SITES.json", "lat,lon\n5,6\n"),
            ]),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(outcome.sources[0].status, SourceStatus::Failed);
    assert_eq!(outcome.sources[1].status, SourceStatus::Converted);
    assert_eq!(outcome.sources[2].status, SourceStatus::Failed);
    assert!(
        outcome.sources[0]
            .message
            .as_deref()
            .unwrap()
            .contains("duplicate base name")
    );
    assert_eq!(*app_stems(&app), vec!["wells".to_string()]);
    assert_eq!(outcome.archive.unwrap().file_name, "wells.zip");
}

#[test]
fn batch_archive_uses_default_or_explicit_name() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());
    let sources = || {
        vec![
            source("a.csv", "lat,lon\n1,2\n"),
            source("b.csv", "lat,lon\n3,4\n"),
        ]
    };

    let outcome = app.convert(request(sources()), &JsonOutput).unwrap();
    assert_eq!(outcome.archive.unwrap().file_name, "points.zip");

    let mut named = request(sources());
    named.options.archive_name = Some("survey".to_string());
    let outcome = app.convert(named, &JsonOutput).unwrap();
    let archive = outcome.archive.unwrap();
    assert_eq!(archive.file_name, "survey.zip");
    assert_eq!(archive.entries, vec!["a.pts".to_string(), "b.pts".to_string()]);
}

#[test]
fn nothing_converted_yields_no_archive() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let outcome = app
        .convert(request(vec![source("blank.csv", "lat,lon\n,\n")]), &JsonOutput)
        .unwrap();
    assert!(outcome.archive.is_none());
    assert_eq!(outcome.count(SourceStatus::Empty), 1);
    assert_root_empty(app.workspaces().root());
}

#[test]
fn encoder_without_output_fails_the_source() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), SilentEncoder);

    let outcome = app
        .convert(request(vec![source("quiet.csv", "lat,lon\n1,2\n")]), &JsonOutput)
        .unwrap();
    assert_eq!(outcome.sources[0].status, SourceStatus::Failed);
    assert!(outcome.archive.is_none());
}

#[test]
fn strict_policy_rejects_blank_crs_per_source() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let mut explicit = source("explicit.csv", "lat,lon\n1,2\n");
    explicit.crs = Some("EPSG:3857".to_string());
    let mut req = request(vec![explicit, source("implicit.csv", "lat,lon\n1,2\n")]);
    req.options.crs = String::new();
    req.options.crs_policy = CrsPolicy::RequireExplicit;

    let outcome = app.convert(req, &JsonOutput).unwrap();
    assert_eq!(outcome.sources[0].status, SourceStatus::Converted);
    assert_eq!(outcome.sources[0].crs.as_deref(), Some("EPSG:3857"));
    assert_eq!(
        outcome.sources[0].crs_label.as_deref(),
        Some("WGS 84 / Pseudo-Mercator")
    );
    assert_eq!(outcome.sources[1].status, SourceStatus::Failed);
}

#[test]
fn concurrent_conversions_are_isolated() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(WorkspaceManager::new(root(&temp)), MockEncoder::default());

    let archives: Vec<Vec<String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|idx| {
                let app = &app;
                scope.spawn(move || {
                    let csv = format!("lat,lon\n{idx},{idx}\n");
                    let outcome = app
                        .convert(request(vec![source("same.csv", &csv)]), &JsonOutput)
                        .unwrap();
                    outcome.archive.unwrap().entries
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(archives.iter().all(|entries| entries == &["same.pts".to_string()]));
    assert_eq!(app_stems(&app).len(), 4);
    assert_root_empty(app.workspaces().root());
}

#[test]
fn preview_reports_filtered_points() {
    let input = source("sites.csv", "lat,lon\n1,2\nx,3\n4,5\n");
    let result = app::preview(&input, &ConversionOptions::default()).unwrap();
    assert_eq!(result.status, ExtractionStatus::Points(2));
    assert_eq!(result.skipped, 1);
    assert_eq!(result.points[1].row, 2);
    assert_eq!(result.points[1].latitude, 4.0);
    assert_eq!(result.points[1].longitude, 5.0);
    assert_eq!(result.crs, "EPSG:4326");
    assert_eq!(result.crs_label.as_deref(), Some("WGS 84"));
}

#[test]
fn preview_labels_gdm2000_presets() {
    let mut input = source("borneo.csv", "lat,lon\n600000,400000\n");
    input.crs = Some("3376".to_string());
    let result = app::preview(&input, &ConversionOptions::default()).unwrap();
    assert_eq!(result.crs, "EPSG:3376");
    assert_eq!(result.crs_label.as_deref(), Some("GDM2000 / East Malaysia BRSO"));

    input.crs = Some("32648".to_string());
    let result = app::preview(&input, &ConversionOptions::default()).unwrap();
    assert_eq!(result.crs_label, None);
}
