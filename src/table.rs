//! Column-labelled tabular input.
//!
//! Rows are read once and never mutated. Cells are classified as numbers,
//! text or null at load time; extraction and the attribute writer both work
//! from that classification.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::PointpackError;

const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Number(f64),
    Text(String),
}

impl ScalarValue {
    /// Classifies a raw text cell.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NULL_MARKERS.contains(&trimmed) {
            return ScalarValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(number) => ScalarValue::Number(number),
            Err(_) => ScalarValue::Text(raw.to_string()),
        }
    }

    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => ScalarValue::Null,
            JsonValue::Bool(b) => ScalarValue::Text(b.to_string()),
            JsonValue::Number(n) => n
                .as_f64()
                .map(ScalarValue::Number)
                .unwrap_or_else(|| ScalarValue::Text(n.to_string())),
            JsonValue::String(s) => ScalarValue::Text(s.clone()),
            other => ScalarValue::Text(other.to_string()),
        }
    }

    /// Finite floating-point reading of the cell, if it has one.
    pub fn as_finite_f64(&self) -> Option<f64> {
        let value = match self {
            ScalarValue::Number(n) => *n,
            ScalarValue::Text(s) => s.trim().parse::<f64>().ok()?,
            ScalarValue::Null => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

/// One input row; cells align with the owning table's columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TabularRow(Vec<ScalarValue>);

impl TabularRow {
    pub fn get(&self, column: usize) -> Option<&ScalarValue> {
        self.0.get(column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<TabularRow>,
}

impl Table {
    /// Builds a table, padding short rows with nulls and rejecting repeated
    /// column names.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ScalarValue>>) -> Result<Self, PointpackError> {
        for (idx, name) in columns.iter().enumerate() {
            if columns[..idx].contains(name) {
                return Err(PointpackError::TableRead(format!(
                    "duplicate column name: {name}"
                )));
            }
        }
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut values)| {
                if values.len() > width {
                    return Err(PointpackError::TableRead(format!(
                        "row {} has {} cells but the header has {width}",
                        idx + 1,
                        values.len()
                    )));
                }
                values.resize(width, ScalarValue::Null);
                Ok(TabularRow(values))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TabularRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
}

/// Loads a table from disk, dispatching on the file extension.
///
/// Supported inputs:
/// * `.csv`, `.txt` – comma separated (or `delimiter`)
/// * `.tsv` – tab separated
/// * `.csv.gz`, `.tsv.gz` – gzip-compressed variants
/// * `.json` – `[{"lat": 1.0, "lon": 2.0, ...}, ...]`
pub fn load_file(path: &Path, options: LoadOptions) -> Result<Table, PointpackError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let (inner, gzipped) = match name.strip_suffix(".gz") {
        Some(inner) => (inner.to_string(), true),
        None => (name.clone(), false),
    };
    let ext = inner.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    let file = fs::File::open(path)
        .map_err(|err| PointpackError::TableRead(format!("open {}: {err}", path.display())))?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(io::BufReader::new(file)))
    } else {
        Box::new(io::BufReader::new(file))
    };

    match ext {
        "csv" | "txt" => read_delimited(reader, options.delimiter.unwrap_or(b',')),
        "tsv" => read_delimited(reader, options.delimiter.unwrap_or(b'\t')),
        "json" if !gzipped => read_json_records(reader),
        _ => Err(PointpackError::UnsupportedInput(format!(
            "{} (expected .csv, .tsv, .txt, .csv.gz or .json)",
            path.display()
        ))),
    }
}

pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Table, PointpackError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = csv_reader
        .headers()
        .map_err(|err| PointpackError::TableRead(err.to_string()))?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|err| PointpackError::TableRead(err.to_string()))?;
        rows.push(record.iter().map(ScalarValue::from_cell).collect());
    }

    Table::new(columns, rows)
}

pub fn read_json_records<R: Read>(reader: R) -> Result<Table, PointpackError> {
    let root: JsonValue = serde_json::from_reader(reader)
        .map_err(|err| PointpackError::TableRead(format!("parsing JSON: {err}")))?;
    let records = root
        .as_array()
        .ok_or_else(|| PointpackError::TableRead("expected top-level JSON array".to_string()))?;

    let mut columns: Vec<String> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let obj = record.as_object().ok_or_else(|| {
            PointpackError::TableRead(format!("row {} is not a JSON object", idx + 1))
        })?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(|record| record.as_object())
        .map(|obj| {
            columns
                .iter()
                .map(|column| {
                    obj.get(column)
                        .map(ScalarValue::from_json)
                        .unwrap_or(ScalarValue::Null)
                })
                .collect()
        })
        .collect();

    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_cells() {
        assert_eq!(ScalarValue::from_cell(" 1.5 "), ScalarValue::Number(1.5));
        assert_eq!(ScalarValue::from_cell(""), ScalarValue::Null);
        assert_eq!(ScalarValue::from_cell("NA"), ScalarValue::Null);
        assert_eq!(
            ScalarValue::from_cell("bad"),
            ScalarValue::Text("bad".to_string())
        );
    }

    #[test]
    fn finite_reading() {
        assert_eq!(ScalarValue::Number(2.0).as_finite_f64(), Some(2.0));
        assert_eq!(ScalarValue::Text(" 3.25".into()).as_finite_f64(), Some(3.25));
        assert_eq!(ScalarValue::Number(f64::INFINITY).as_finite_f64(), None);
        assert_eq!(ScalarValue::Text("inf".into()).as_finite_f64(), None);
        assert_eq!(ScalarValue::Null.as_finite_f64(), None);
    }

    #[test]
    fn read_csv_with_short_rows() {
        let data = "id,lat,lon\nA,1.0,2.0\nB,3.0\n";
        let table = read_delimited(data.as_bytes(), b',').unwrap();
        assert_eq!(table.columns(), &["id", "lat", "lon"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get(2), Some(&ScalarValue::Null));
    }

    #[test]
    fn read_json_unions_keys() {
        let data = r#"[{"lat": 1.0, "lon": 2.0, "id": "A"}, {"lat": "bad", "lon": 3.0, "note": "x"}]"#;
        let table = read_json_records(data.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["id", "lat", "lon", "note"]);
        assert_eq!(
            table.rows()[1].get(1),
            Some(&ScalarValue::Text("bad".to_string()))
        );
        assert_eq!(table.rows()[0].get(3), Some(&ScalarValue::Null));
    }

    #[test]
    fn duplicate_columns_rejected() {
        let data = "lat,lat\n1,2\n";
        assert!(read_delimited(data.as_bytes(), b',').is_err());
    }
}
