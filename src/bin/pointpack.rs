use std::path::{Path, PathBuf};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pointpack::app::{
    self, App, ConversionOptions, ConversionRequest, RejectedSource, SourceInput, SourceStatus,
};
use pointpack::archive::{list_entries, unpack, write_archive_atomic};
use pointpack::config::{ConfigLoader, ResolvedConfig, SourceRequest};
use pointpack::domain::{ColumnSelection, CrsPolicy};
use pointpack::encoder::ShapefileEncoder;
use pointpack::error::PointpackError;
use pointpack::output::{ConsoleOutput, JsonOutput, OutputMode};
use pointpack::table::{LoadOptions, load_file};
use pointpack::workspace::WorkspaceManager;

#[derive(Parser)]
#[command(name = "pointpack")]
#[command(about = "Convert CSV/JSON point tables into zipped shapefiles")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert one or more tables into a shapefile archive")]
    Convert(ConvertArgs),
    #[command(about = "Show the points that would be converted")]
    Preview(PreviewArgs),
    #[command(about = "List the members of a shapefile archive")]
    Inspect(InspectArgs),
}

#[derive(Args, Clone)]
struct ColumnArgs {
    #[arg(long, help = "Latitude column")]
    lat: Option<String>,

    #[arg(long, help = "Longitude column")]
    lon: Option<String>,

    #[arg(long, help = "EPSG code, e.g. 4326 or EPSG:3857")]
    crs: Option<String>,

    #[arg(long, help = "Fail instead of defaulting to EPSG:4326 on blank --crs")]
    strict_crs: bool,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, help = "Field delimiter for delimited text input")]
    delimiter: Option<char>,
}

#[derive(Args, Clone)]
struct ConvertArgs {
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    columns: ColumnArgs,

    #[arg(long, short, help = "Archive path (default: <name>.zip)")]
    output: Option<PathBuf>,

    #[arg(long, help = "Directory for per-run scratch workspaces")]
    workspace_root: Option<Utf8PathBuf>,

    #[arg(long, help = "Cut output base names to this many characters")]
    base_name_max_len: Option<usize>,
}

#[derive(Args, Clone)]
struct PreviewArgs {
    input: PathBuf,

    #[command(flatten)]
    columns: ColumnArgs,
}

#[derive(Args)]
struct InspectArgs {
    archive: PathBuf,

    #[arg(long, value_name = "DIR", help = "Also extract the members into DIR")]
    extract: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PointpackError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PointpackError) -> u8 {
    match error {
        PointpackError::ColumnNotFound(_)
        | PointpackError::MissingCrs
        | PointpackError::InvalidCrs(_)
        | PointpackError::InvalidSourceName(_)
        | PointpackError::DuplicateBaseName { .. }
        | PointpackError::BaseNameInUse(_)
        | PointpackError::NothingToPackage
        | PointpackError::SourcesFailed { .. }
        | PointpackError::UnsupportedInput(_)
        | PointpackError::TableRead(_)
        | PointpackError::MissingConfig
        | PointpackError::ConfigRead(_)
        | PointpackError::ConfigParse(_) => 2,
        PointpackError::WorkspaceIo(_)
        | PointpackError::PackagingIo(_)
        | PointpackError::Encoding(_)
        | PointpackError::EncodingProducedNoOutput(_)
        | PointpackError::Filesystem(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Convert(args) => run_convert(args, output_mode),
        Commands::Preview(args) => run_preview(args, output_mode),
        Commands::Inspect(args) => run_inspect(args, output_mode),
    }
}

fn load_config(args: &ColumnArgs) -> Result<ResolvedConfig, PointpackError> {
    let mut config = ConfigLoader::resolve_or_default(args.config.as_deref())?;
    if let Some(lat) = &args.lat {
        config.columns.latitude = lat.clone();
    }
    if let Some(lon) = &args.lon {
        config.columns.longitude = lon.clone();
    }
    if let Some(crs) = &args.crs {
        config.crs = crs.clone();
    }
    if args.strict_crs {
        config.crs_policy = CrsPolicy::RequireExplicit;
    }
    if let Some(delimiter) = args.delimiter {
        if !delimiter.is_ascii() {
            return Err(PointpackError::UnsupportedInput(format!(
                "delimiter must be ASCII, got {delimiter:?}"
            )));
        }
        config.delimiter = Some(delimiter as u8);
    }
    Ok(config)
}

fn conversion_options(config: &ResolvedConfig) -> ConversionOptions {
    ConversionOptions {
        crs: config.crs.clone(),
        crs_policy: config.crs_policy,
        base_name_max_len: config.base_name_max_len,
        archive_name: None,
    }
}

fn load_source(
    request: &SourceRequest,
    config: &ResolvedConfig,
) -> Result<SourceInput, PointpackError> {
    let table = load_file(
        &request.path,
        LoadOptions {
            delimiter: config.delimiter,
        },
    )?;
    let name = request
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PointpackError::InvalidSourceName(request.path.display().to_string()))?
        .to_string();
    Ok(SourceInput {
        name,
        table,
        columns: request.columns.clone(),
        crs: request.crs.clone(),
    })
}

fn run_convert(args: ConvertArgs, output_mode: OutputMode) -> miette::Result<()> {
    let mut config = load_config(&args.columns)?;
    if let Some(root) = args.workspace_root {
        config.workspace_root = Some(root);
    }
    if args.base_name_max_len.is_some() {
        config.base_name_max_len = args.base_name_max_len;
    }

    let requests: Vec<SourceRequest> = if args.inputs.is_empty() {
        config.sources.clone()
    } else {
        args.inputs
            .iter()
            .map(|path| SourceRequest {
                path: path.clone(),
                columns: ColumnSelection::new(
                    config.columns.latitude.clone(),
                    config.columns.longitude.clone(),
                ),
                crs: None,
            })
            .collect()
    };
    if requests.is_empty() {
        return Err(miette::Report::msg(
            "no input files (pass paths or list sources in pointpack.json)",
        ));
    }

    // Unreadable inputs are reported as failed sources without aborting the batch.
    let mut sources = Vec::with_capacity(requests.len());
    let mut rejected = Vec::new();
    for request in &requests {
        match load_source(request, &config) {
            Ok(source) => sources.push(source),
            Err(err) => rejected.push(RejectedSource::new(
                request.path.display().to_string(),
                &err,
            )),
        }
    }

    let workspaces = match &config.workspace_root {
        Some(root) => WorkspaceManager::new(root.clone()),
        None => WorkspaceManager::with_default_root()?,
    };
    let app = App::new(workspaces, ShapefileEncoder);

    let mut options = conversion_options(&config);
    options.archive_name = args
        .output
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string);
    let request = ConversionRequest {
        sources,
        rejected,
        options,
    };

    let outcome = match output_mode {
        OutputMode::Json => app.convert(request, &JsonOutput)?,
        OutputMode::Human => app.convert(request, &ConsoleOutput)?,
    };

    if let Some(archive) = &outcome.archive {
        let dest = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&archive.file_name));
        write_archive_atomic(&dest, &archive.bytes)?;
    }

    match output_mode {
        OutputMode::Json => JsonOutput::print_conversion(&outcome).into_diagnostic()?,
        OutputMode::Human => ConsoleOutput::print_conversion(&outcome),
    }

    if outcome.archive.is_none() {
        return Err(PointpackError::NothingToPackage.into());
    }
    let failed = outcome.count(SourceStatus::Failed);
    if failed > 0 {
        return Err(PointpackError::SourcesFailed {
            failed,
            total: outcome.sources.len(),
        }
        .into());
    }
    Ok(())
}

fn run_preview(args: PreviewArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = load_config(&args.columns)?;
    let request = SourceRequest {
        path: args.input,
        columns: config.columns.clone(),
        crs: None,
    };
    let source = load_source(&request, &config)?;
    let result = app::preview(&source, &conversion_options(&config))?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_preview(&result).into_diagnostic()?,
        OutputMode::Human => ConsoleOutput::print_preview(&result),
    }
    Ok(())
}

fn run_inspect(args: InspectArgs, output_mode: OutputMode) -> miette::Result<()> {
    let bytes = std::fs::read(&args.archive)
        .map_err(|err| PointpackError::Filesystem(format!("{}: {err}", args.archive.display())))?;
    let entries = list_entries(&bytes)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_entries(&entries).into_diagnostic()?,
        OutputMode::Human => ConsoleOutput::print_entries(&entries),
    }

    if let Some(dir) = &args.extract {
        let written = unpack(&bytes, dir)?;
        if matches!(output_mode, OutputMode::Human) {
            eprintln!("extracted {} file(s) to {}", written.len(), dir.display());
        }
    }
    Ok(())
}
