use geo::Point;

use crate::domain::{BaseName, SpatialReference};
use crate::error::PointpackError;
use crate::extract::Extraction;
use crate::table::{Table, TabularRow};

#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub attributes: TabularRow,
    pub geometry: Point<f64>,
}

/// Point features of one input source, ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    columns: Vec<String>,
    features: Vec<PointFeature>,
    spatial_reference: SpatialReference,
    base_name: BaseName,
}

impl FeatureDataset {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn features(&self) -> &[PointFeature] {
        &self.features
    }

    pub fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference
    }

    pub fn base_name(&self) -> &BaseName {
        &self.base_name
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Binds extracted points back to their rows.
///
/// Every column is carried through, coordinate columns included. The
/// extraction must reference rows of `table` in ascending order; anything else
/// means it was produced from a different table.
pub fn build(
    table: &Table,
    extraction: &Extraction,
    spatial_reference: SpatialReference,
    base_name: BaseName,
) -> Result<FeatureDataset, PointpackError> {
    let filtered_rows = table.len().saturating_sub(extraction.skipped);
    if extraction.points.len() != filtered_rows {
        return Err(PointpackError::InconsistentExtraction(format!(
            "{} points for {} kept rows",
            extraction.points.len(),
            filtered_rows
        )));
    }

    let mut features = Vec::with_capacity(extraction.points.len());
    let mut previous: Option<usize> = None;
    for extracted in &extraction.points {
        if previous.is_some_and(|prev| extracted.row <= prev) {
            return Err(PointpackError::InconsistentExtraction(format!(
                "row {} out of order",
                extracted.row
            )));
        }
        let row = table.rows().get(extracted.row).ok_or_else(|| {
            PointpackError::InconsistentExtraction(format!(
                "row {} outside table of {} rows",
                extracted.row,
                table.len()
            ))
        })?;
        features.push(PointFeature {
            attributes: row.clone(),
            geometry: extracted.point,
        });
        previous = Some(extracted.row);
    }

    Ok(FeatureDataset {
        columns: table.columns().to_vec(),
        features,
        spatial_reference,
        base_name,
    })
}
