use assert_matches::assert_matches;

use pointpack::dataset;
use pointpack::domain::{BaseName, ColumnSelection, SpatialReference};
use pointpack::error::PointpackError;
use pointpack::extract::{ExtractionStatus, extract};
use pointpack::table::{ScalarValue, Table, read_delimited};

fn table(csv: &str) -> Table {
    read_delimited(csv.as_bytes(), b',').unwrap()
}

#[test]
fn filters_rows_with_bad_coordinates() {
    let table = table("lat,lon,id\n1.0,2.0,A\nbad,3.0,B\n4.5,-7.25,C\n");
    let extraction = extract(&table, &ColumnSelection::new("lat", "lon")).unwrap();

    assert_eq!(extraction.status(), ExtractionStatus::Points(2));
    assert_eq!(extraction.skipped, 1);
    let rows: Vec<usize> = extraction.points.iter().map(|p| p.row).collect();
    assert_eq!(rows, vec![0, 2]);
    assert_eq!(extraction.points[0].point.x(), 2.0);
    assert_eq!(extraction.points[0].point.y(), 1.0);
    assert_eq!(extraction.points[1].point.x(), -7.25);
}

#[test]
fn kept_plus_skipped_equals_rows() {
    let table = table("y,x\n1,2\n,3\nNaN,4\n5,inf\n6,\n7,8\n");
    let extraction = extract(&table, &ColumnSelection::new("y", "x")).unwrap();
    assert_eq!(extraction.points.len() + extraction.skipped, table.len());
    assert_eq!(extraction.points.len(), 2);
}

#[test]
fn no_valid_rows_is_empty_not_error() {
    let table = table("lat,lon\nn/a,n/a\n,\n");
    let extraction = extract(&table, &ColumnSelection::default()).unwrap();
    assert_eq!(extraction.status(), ExtractionStatus::Empty);
    assert_eq!(extraction.skipped, 2);
}

#[test]
fn missing_column_is_reported() {
    let table = table("latitude,lon\n1,2\n");
    assert_matches!(
        extract(&table, &ColumnSelection::default()),
        Err(PointpackError::ColumnNotFound(name)) if name == "lat"
    );
}

#[test]
fn dataset_keeps_attributes_in_row_order() {
    let table = table("lat,lon,name\n10,20,first\nx,0,dropped\n30,40,third\n");
    let extraction = extract(&table, &ColumnSelection::default()).unwrap();
    let base = BaseName::from_source_name("sites.csv", None).unwrap();

    let dataset = dataset::build(&table, &extraction, SpatialReference::WGS84, base).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.columns(), table.columns());
    assert_eq!(
        dataset.features()[1].attributes.get(2),
        Some(&ScalarValue::Text("third".to_string()))
    );
    assert_eq!(dataset.features()[1].geometry.x(), 40.0);
}

#[test]
fn dataset_rejects_extraction_from_another_table() {
    let small = table("lat,lon\n1,2\n");
    let large = table("lat,lon\n1,2\n3,4\n5,6\n");
    let extraction = extract(&large, &ColumnSelection::default()).unwrap();
    let base = BaseName::from_source_name("sites.csv", None).unwrap();

    assert_matches!(
        dataset::build(&small, &extraction, SpatialReference::WGS84, base),
        Err(PointpackError::InconsistentExtraction(_))
    );
}
