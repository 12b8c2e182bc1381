use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::archive::package;
use crate::crs;
use crate::dataset;
use crate::domain::{BaseName, ColumnSelection, CrsPolicy, WGS84_CODE};
use crate::encoder::DatasetEncoder;
use crate::error::PointpackError;
use crate::extract::{ExtractionStatus, extract};
use crate::serialize::{SerializedDatasetHandle, claim_base_names, serialize};
use crate::table::Table;
use crate::workspace::{Workspace, WorkspaceManager};

const BATCH_ARCHIVE_NAME: &str = "points.zip";

/// One tabular input and the columns holding its coordinates.
#[derive(Debug, Clone)]
pub struct SourceInput {
    /// Original file name; the output base name is derived from it.
    pub name: String,
    pub table: Table,
    pub columns: ColumnSelection,
    /// Overrides [`ConversionOptions::crs`] for this source.
    pub crs: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub crs: String,
    pub crs_policy: CrsPolicy,
    pub base_name_max_len: Option<usize>,
    pub archive_name: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            crs: WGS84_CODE.to_string(),
            crs_policy: CrsPolicy::default(),
            base_name_max_len: None,
            archive_name: None,
        }
    }
}

/// An input that could not be read; it is reported as failed without being
/// converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSource {
    pub name: String,
    pub reason: String,
}

impl RejectedSource {
    pub fn new(name: impl Into<String>, error: &PointpackError) -> Self {
        Self {
            name: name.into(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub sources: Vec<SourceInput>,
    pub rejected: Vec<RejectedSource>,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(sources: Vec<SourceInput>, options: ConversionOptions) -> Self {
        Self {
            sources,
            rejected: Vec::new(),
            options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Converted,
    Empty,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub base_name: Option<String>,
    pub status: SourceStatus,
    pub crs: Option<String>,
    /// Human name of the CRS for the well-known codes.
    pub crs_label: Option<String>,
    pub features: usize,
    pub skipped: usize,
    pub files: Vec<String>,
    pub message: Option<String>,
}

impl SourceReport {
    fn failed(source: &str, base_name: Option<&BaseName>, error: &PointpackError) -> Self {
        Self {
            source: source.to_string(),
            base_name: base_name.map(ToString::to_string),
            status: SourceStatus::Failed,
            crs: None,
            crs_label: None,
            features: 0,
            skipped: 0,
            files: Vec::new(),
            message: Some(format!("{source}: {error}")),
        }
    }

    fn rejected(rejected: &RejectedSource) -> Self {
        Self {
            source: rejected.name.clone(),
            base_name: None,
            status: SourceStatus::Failed,
            crs: None,
            crs_label: None,
            features: 0,
            skipped: 0,
            files: Vec::new(),
            message: Some(format!("{}: {}", rejected.name, rejected.reason)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Archive {
    pub file_name: String,
    pub entries: Vec<String>,
    pub size: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutcome {
    pub converted_at: String,
    pub run_id: String,
    pub sources: Vec<SourceReport>,
    pub archive: Option<Archive>,
}

impl ConversionOutcome {
    pub fn count(&self, status: SourceStatus) -> usize {
        self.sources.iter().filter(|s| s.status == status).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewPoint {
    pub row: usize,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub source: String,
    pub crs: String,
    pub crs_label: Option<String>,
    pub status: ExtractionStatus,
    pub skipped: usize,
    pub points: Vec<PreviewPoint>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct App<E: DatasetEncoder> {
    workspaces: WorkspaceManager,
    encoder: E,
}

impl<E: DatasetEncoder> App<E> {
    pub fn new(workspaces: WorkspaceManager, encoder: E) -> Self {
        Self {
            workspaces,
            encoder,
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Converts every source of the request into one archive.
    ///
    /// Sources fail independently and are reported one by one; rejected
    /// inputs are reported first, as failed. The workspace is released before
    /// returning on every path.
    pub fn convert(
        &self,
        request: ConversionRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ConversionOutcome, PointpackError> {
        let ConversionRequest {
            sources,
            rejected,
            options,
        } = request;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} source(s), {} rejected",
                sources.len(),
                rejected.len()
            ),
            elapsed: None,
        });
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        let claims = claim_base_names(&names, options.base_name_max_len);

        let workspace = self.workspaces.acquire()?;
        let run_id = workspace.run_id().to_string();
        info!(run_id = %run_id, path = %workspace.path(), "conversion started");

        let mut reports = Vec::with_capacity(rejected.len() + sources.len());
        for input in &rejected {
            warn!(source = %input.name, reason = %input.reason, "input unreadable");
            reports.push(SourceReport::rejected(input));
        }
        let mut handles = Vec::new();
        for (source, claim) in sources.iter().zip(claims) {
            let base_name = match claim {
                Ok(base_name) => base_name,
                Err(err) => {
                    warn!(source = %source.name, error = %err, "source rejected");
                    reports.push(SourceReport::failed(&source.name, None, &err));
                    continue;
                }
            };

            let start = Instant::now();
            match self.convert_source(source, &base_name, &options, &workspace, sink) {
                Ok((report, handle)) => {
                    reports.push(report);
                    handles.extend(handle);
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "source failed");
                    reports.push(SourceReport::failed(&source.name, Some(&base_name), &err));
                }
            }
            sink.event(ProgressEvent {
                message: format!("source.done {}", source.name),
                elapsed: Some(start.elapsed()),
            });
        }

        sink.event(ProgressEvent {
            message: format!("phase=Package; {} dataset(s)", handles.len()),
            elapsed: None,
        });
        let packaged = package(&handles);

        sink.event(ProgressEvent {
            message: "phase=Cleanup; releasing workspace".to_string(),
            elapsed: None,
        });
        let released = workspace.release();

        let archive = settle_packaging(packaged, released, &run_id)?
            .map(|bytes| self.describe_archive(&handles, &options, bytes));

        Ok(ConversionOutcome {
            converted_at: chrono::Utc::now().to_rfc3339(),
            run_id,
            sources: reports,
            archive,
        })
    }

    fn convert_source(
        &self,
        source: &SourceInput,
        base_name: &BaseName,
        options: &ConversionOptions,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<(SourceReport, Option<SerializedDatasetHandle>), PointpackError> {
        let raw_crs = source.crs.as_deref().unwrap_or(&options.crs);
        let spatial_reference = crs::resolve(raw_crs, options.crs_policy)?;

        sink.event(ProgressEvent {
            message: format!("phase=Extract; {}", source.name),
            elapsed: None,
        });
        let extraction = extract(&source.table, &source.columns)?;
        let mut report = SourceReport {
            source: source.name.clone(),
            base_name: Some(base_name.to_string()),
            status: SourceStatus::Empty,
            crs: Some(spatial_reference.to_string()),
            crs_label: spatial_reference.label().map(str::to_string),
            features: extraction.points.len(),
            skipped: extraction.skipped,
            files: Vec::new(),
            message: None,
        };

        if extraction.status() == ExtractionStatus::Empty {
            warn!(source = %source.name, skipped = extraction.skipped, "no valid coordinates");
            report.message = Some(format!(
                "{}: no rows with valid coordinates in {} / {}",
                source.name, source.columns.latitude, source.columns.longitude
            ));
            return Ok((report, None));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Build; {} features", extraction.points.len()),
            elapsed: None,
        });
        let dataset = dataset::build(
            &source.table,
            &extraction,
            spatial_reference,
            base_name.clone(),
        )?;

        sink.event(ProgressEvent {
            message: format!("phase=Serialize; {base_name}"),
            elapsed: None,
        });
        let handle = serialize(&dataset, workspace, &self.encoder)?;

        info!(
            source = %source.name,
            features = dataset.len(),
            skipped = extraction.skipped,
            crs = %spatial_reference,
            "source converted"
        );
        report.status = SourceStatus::Converted;
        report.files = handle.file_names().into_iter().map(str::to_string).collect();
        Ok((report, Some(handle)))
    }

    fn describe_archive(
        &self,
        handles: &[SerializedDatasetHandle],
        options: &ConversionOptions,
        bytes: Vec<u8>,
    ) -> Archive {
        let file_name = archive_file_name(options.archive_name.as_deref(), handles);
        let entries = handles
            .iter()
            .flat_map(|handle| handle.file_names())
            .map(str::to_string)
            .collect();
        Archive {
            file_name,
            entries,
            size: bytes.len(),
            bytes,
        }
    }
}

/// Packaging errors take precedence over release errors; a release error
/// hidden that way is logged. `NothingToPackage` means no archive.
fn settle_packaging(
    packaged: Result<Vec<u8>, PointpackError>,
    released: Result<(), PointpackError>,
    run_id: &str,
) -> Result<Option<Vec<u8>>, PointpackError> {
    let bytes = match packaged {
        Ok(bytes) => Some(bytes),
        Err(PointpackError::NothingToPackage) => {
            warn!(run_id = %run_id, "no source produced output");
            None
        }
        Err(err) => {
            if let Err(release_err) = released {
                warn!(run_id = %run_id, error = %release_err, "workspace release failed");
            }
            return Err(err);
        }
    };
    released?;
    Ok(bytes)
}

/// Explicit name, else `<base>.zip` for a single dataset, else `points.zip`.
pub fn archive_file_name(explicit: Option<&str>, handles: &[SerializedDatasetHandle]) -> String {
    let name = match (explicit, handles) {
        (Some(name), _) if !name.trim().is_empty() => name.trim().to_string(),
        (_, [single]) => single.base_name().to_string(),
        _ => BATCH_ARCHIVE_NAME.to_string(),
    };
    if name.to_ascii_lowercase().ends_with(".zip") {
        name
    } else {
        format!("{name}.zip")
    }
}

/// Filtered points of one source, for map previews. Touches no files.
pub fn preview(
    source: &SourceInput,
    options: &ConversionOptions,
) -> Result<PreviewResult, PointpackError> {
    let raw_crs = source.crs.as_deref().unwrap_or(&options.crs);
    let spatial_reference = crs::resolve(raw_crs, options.crs_policy)?;
    let extraction = extract(&source.table, &source.columns)?;
    let points = extraction
        .points
        .iter()
        .map(|p| PreviewPoint {
            row: p.row,
            latitude: p.point.y(),
            longitude: p.point.x(),
        })
        .collect();
    Ok(PreviewResult {
        source: source.name.clone(),
        crs: spatial_reference.to_string(),
        crs_label: spatial_reference.label().map(str::to_string),
        status: extraction.status(),
        skipped: extraction.skipped,
        points,
    })
}
