use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ConversionOutcome, PreviewResult, ProgressEvent, ProgressSink, SourceStatus};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_conversion(outcome: &ConversionOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_preview(result: &PreviewResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_entries(entries: &[String]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr, summary on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_conversion(outcome: &ConversionOutcome) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        println!("{cyan}pointpack summary (run {}){reset}", outcome.run_id);
        println!(
            "{green}converted: {}{reset}  {yellow}empty: {}{reset}  {red}failed: {}{reset}",
            outcome.count(SourceStatus::Converted),
            outcome.count(SourceStatus::Empty),
            outcome.count(SourceStatus::Failed),
        );

        for report in &outcome.sources {
            let color = match report.status {
                SourceStatus::Converted => green,
                SourceStatus::Empty => yellow,
                SourceStatus::Failed => red,
            };
            let base = report.base_name.as_deref().unwrap_or("-");
            let crs = report
                .crs
                .as_deref()
                .map(|code| crs_display(code, report.crs_label.as_deref()))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{color}  {} -> {base} [{crs}] ({} features, {} skipped){reset}",
                report.source, report.features, report.skipped
            );
            if let Some(message) = &report.message {
                println!("{color}    {message}{reset}");
            }
        }

        match &outcome.archive {
            Some(archive) => println!(
                "{cyan}archive: {} ({} entries, {} bytes){reset}",
                archive.file_name,
                archive.entries.len(),
                archive.size
            ),
            None => println!("{red}no archive produced{reset}"),
        }
    }

    pub fn print_preview(result: &PreviewResult) {
        println!(
            "{} [{}]: {} point(s), {} skipped",
            result.source,
            crs_display(&result.crs, result.crs_label.as_deref()),
            result.points.len(),
            result.skipped
        );
        for point in &result.points {
            println!(
                "  row {:>5}  lat {:>12.6}  lon {:>12.6}",
                point.row, point.latitude, point.longitude
            );
        }
    }

    pub fn print_entries(entries: &[String]) {
        for entry in entries {
            println!("{entry}");
        }
    }
}

/// `EPSG:4326 - WGS 84`, or the bare code when no label is known.
pub fn crs_display(code: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{code} - {label}"),
        None => code.to_string(),
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
