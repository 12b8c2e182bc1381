use geo::Point;
use serde::Serialize;

use crate::domain::ColumnSelection;
use crate::error::PointpackError;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedPoint {
    /// Index of the source row in the table.
    pub row: usize,
    /// x = longitude, y = latitude.
    pub point: Point<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "lowercase")]
pub enum ExtractionStatus {
    Points(usize),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub points: Vec<ExtractedPoint>,
    pub skipped: usize,
}

impl Extraction {
    pub fn status(&self) -> ExtractionStatus {
        if self.points.is_empty() {
            ExtractionStatus::Empty
        } else {
            ExtractionStatus::Points(self.points.len())
        }
    }
}

/// Column positions of a validated [`ColumnSelection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub latitude: usize,
    pub longitude: usize,
}

impl ResolvedColumns {
    pub fn resolve(table: &Table, selection: &ColumnSelection) -> Result<Self, PointpackError> {
        let latitude = table
            .column_index(&selection.latitude)
            .ok_or_else(|| PointpackError::ColumnNotFound(selection.latitude.clone()))?;
        let longitude = table
            .column_index(&selection.longitude)
            .ok_or_else(|| PointpackError::ColumnNotFound(selection.longitude.clone()))?;
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Pairs each row with a point built from its coordinate columns.
///
/// Rows whose latitude or longitude is missing, non-numeric or non-finite are
/// left out and counted in `skipped`; that is filtering, not failure.
pub fn extract(table: &Table, selection: &ColumnSelection) -> Result<Extraction, PointpackError> {
    let columns = ResolvedColumns::resolve(table, selection)?;

    let mut points = Vec::with_capacity(table.len());
    let mut skipped = 0;
    for (row_idx, row) in table.rows().iter().enumerate() {
        let lat = row.get(columns.latitude).and_then(|v| v.as_finite_f64());
        let lon = row.get(columns.longitude).and_then(|v| v.as_finite_f64());
        match (lat, lon) {
            (Some(lat), Some(lon)) => points.push(ExtractedPoint {
                row: row_idx,
                point: Point::new(lon, lat),
            }),
            _ => skipped += 1,
        }
    }

    Ok(Extraction { points, skipped })
}
