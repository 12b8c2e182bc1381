use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PointpackError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("no coordinate reference system given")]
    #[diagnostic(help("pass an EPSG code such as 4326, or drop --strict-crs"))]
    MissingCrs,

    #[error("invalid CRS code: {0:?}")]
    #[diagnostic(help("expected a positive integer code, e.g. 4326 or EPSG:3857"))]
    InvalidCrs(String),

    #[error("extracted points do not match table rows: {0}")]
    InconsistentExtraction(String),

    #[error("invalid source name: {0:?}")]
    InvalidSourceName(String),

    #[error("duplicate base name {base_name} ({})", sources.join(", "))]
    #[diagnostic(help("rename one of the input files so every output stem is unique"))]
    DuplicateBaseName {
        base_name: String,
        sources: Vec<String>,
    },

    #[error("output files for {0} already exist in the workspace")]
    BaseNameInUse(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("encoder produced no files for {0}")]
    EncodingProducedNoOutput(String),

    #[error("duplicate archive entry: {0}")]
    DuplicateArchiveEntry(String),

    #[error("nothing to package")]
    NothingToPackage,

    #[error("{failed} of {total} source(s) failed; the archive holds the rest")]
    SourcesFailed { failed: usize, total: usize },

    #[error("packaging failed: {0}")]
    PackagingIo(String),

    #[error("workspace error: {0}")]
    WorkspaceIo(String),

    #[error("failed to read table: {0}")]
    TableRead(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("missing config file pointpack.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
