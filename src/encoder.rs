//! Multi-part dataset encoders.
//!
//! An encoder receives a feature dataset and an output stem and writes a small
//! set of sibling files named `<stem>.<ext>`. The serializer treats it as a
//! black box and only checks what landed on disk.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use tracing::{debug, warn};

use crate::crs::prj_wkt;
use crate::dataset::{FeatureDataset, PointFeature};
use crate::error::PointpackError;
use crate::table::ScalarValue;

const DBASE_NAME_MAX: usize = 10;
const DBASE_CHAR_MAX: usize = 254;
const NUMERIC_LENGTH: u8 = 24;
const NUMERIC_DECIMALS: u8 = 15;

pub trait DatasetEncoder {
    /// Writes `dataset` as files sharing `stem` (a path without extension).
    fn encode(&self, dataset: &FeatureDataset, stem: &Utf8Path) -> Result<(), PointpackError>;
}

/// ESRI shapefile writer: `.shp`, `.shx`, `.dbf`, `.cpg` and, for known CRS
/// codes, `.prj`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapefileEncoder;

impl DatasetEncoder for ShapefileEncoder {
    fn encode(&self, dataset: &FeatureDataset, stem: &Utf8Path) -> Result<(), PointpackError> {
        let fields = plan_fields(dataset);

        let mut table_builder = TableWriterBuilder::new();
        for field in &fields {
            let name = FieldName::try_from(field.name.as_str()).map_err(|_| {
                PointpackError::Encoding(format!("invalid dBase field name {:?}", field.name))
            })?;
            table_builder = match field.kind {
                FieldKind::Numeric => {
                    table_builder.add_numeric_field(name, NUMERIC_LENGTH, NUMERIC_DECIMALS)
                }
                FieldKind::Character(length) => table_builder.add_character_field(name, length),
            };
        }

        let shp_path = sibling(stem, "shp");
        {
            let mut writer = shapefile::Writer::from_path(shp_path.as_std_path(), table_builder)
                .map_err(|err| PointpackError::Encoding(format!("create {shp_path}: {err}")))?;
            for feature in dataset.features() {
                let point = shapefile::Point::new(feature.geometry.x(), feature.geometry.y());
                let record = build_record(&fields, feature);
                writer
                    .write_shape_and_record(&point, &record)
                    .map_err(|err| PointpackError::Encoding(err.to_string()))?;
            }
        }

        write_sidecar(&sibling(stem, "cpg"), "UTF-8")?;
        match prj_wkt(dataset.spatial_reference()) {
            Some(wkt) => write_sidecar(&sibling(stem, "prj"), &wkt)?,
            None => warn!(
                crs = %dataset.spatial_reference(),
                "no projection definition available, skipping .prj"
            ),
        }

        debug!(stem = %stem, features = dataset.len(), "shapefile written");
        Ok(())
    }
}

fn sibling(stem: &Utf8Path, ext: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{stem}.{ext}"))
}

fn write_sidecar(path: &Utf8Path, content: &str) -> Result<(), PointpackError> {
    fs::write(path.as_std_path(), content)
        .map_err(|err| PointpackError::Encoding(format!("write {path}: {err}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Character(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPlan {
    column: usize,
    name: String,
    kind: FieldKind,
}

fn plan_fields(dataset: &FeatureDataset) -> Vec<FieldPlan> {
    let names = dbase_field_names(dataset.columns());
    names
        .into_iter()
        .enumerate()
        .map(|(column, name)| {
            let cells = dataset
                .features()
                .iter()
                .filter_map(|feature| feature.attributes.get(column))
                .filter(|cell| !cell.is_null());

            let mut numeric = true;
            let mut longest = 1;
            for cell in cells {
                if !matches!(cell, ScalarValue::Number(n) if n.is_finite()) {
                    numeric = false;
                }
                if let Some(text) = render_text(cell) {
                    longest = longest.max(text.len());
                }
            }

            let kind = if numeric {
                FieldKind::Numeric
            } else {
                FieldKind::Character(longest.min(DBASE_CHAR_MAX) as u8)
            };
            FieldPlan { column, name, kind }
        })
        .collect()
}

/// dBase field names: ASCII, at most ten bytes, unique ignoring case.
fn dbase_field_names(columns: &[String]) -> Vec<String> {
    let mut taken: Vec<String> = Vec::with_capacity(columns.len());
    let mut names = Vec::with_capacity(columns.len());
    for column in columns {
        let mut base: String = column
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
            .take(DBASE_NAME_MAX)
            .collect();
        if base.is_empty() {
            base = "FIELD".to_string();
        }

        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken.contains(&candidate.to_ascii_lowercase()) {
            let tail = format!("_{suffix}");
            let keep = DBASE_NAME_MAX.saturating_sub(tail.len()).min(base.len());
            candidate = format!("{}{tail}", &base[..keep]);
            suffix += 1;
        }
        taken.push(candidate.to_ascii_lowercase());
        names.push(candidate);
    }
    names
}

fn build_record(fields: &[FieldPlan], feature: &PointFeature) -> Record {
    let mut record = Record::default();
    for field in fields {
        let cell = feature.attributes.get(field.column).unwrap_or(&ScalarValue::Null);
        let value = match field.kind {
            FieldKind::Numeric => FieldValue::Numeric(cell.as_finite_f64()),
            FieldKind::Character(length) => FieldValue::Character(
                render_text(cell).map(|text| truncate_bytes(text, length as usize)),
            ),
        };
        record.insert(field.name.clone(), value);
    }
    record
}

fn render_text(cell: &ScalarValue) -> Option<String> {
    match cell {
        ScalarValue::Null => None,
        ScalarValue::Number(n) if !n.is_finite() => None,
        ScalarValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
            Some(format!("{}", *n as i64))
        }
        ScalarValue::Number(n) => Some(n.to_string()),
        ScalarValue::Text(s) => Some(s.clone()),
    }
}

fn truncate_bytes(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
