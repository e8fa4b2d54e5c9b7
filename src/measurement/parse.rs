// Readers for the tool outputs the harness depends on.
// Each parser takes raw text and either yields a number or fails loudly, so
// drift in a tool's output format surfaces as an error instead of a bogus
// value.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Marker of the summary line in `-time-passes` reports.
pub const PASS_TIMING_MARKER: &str = "Total Execution Time";

#[derive(Debug, Deserialize)]
struct HyperfineExport {
    results: Vec<HyperfineResult>,
}

#[derive(Debug, Deserialize)]
struct HyperfineResult {
    mean: f64,
}

/// Mean time, in seconds, of the first command in a hyperfine
/// `--export-json` document (`results[0].mean`).
pub fn parse_hyperfine_mean(json: &str, path: &Path) -> Result<f64> {
    let export: HyperfineExport =
        serde_json::from_str(json).map_err(|err| Error::MalformedExport {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    export
        .results
        .first()
        .map(|r| r.mean)
        .ok_or_else(|| Error::MalformedExport {
            path: path.to_path_buf(),
            reason: "`results` is empty".to_string(),
        })
}

/// A single number, surrounding whitespace ignored.
pub fn parse_scalar(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|_| Error::ParseNumber {
        input: trimmed.to_string(),
    })
}

/// Elapsed seconds from an LLVM `-time-passes` report.
///
/// Contract: the first line containing [`PASS_TIMING_MARKER`] is split on
/// whitespace and its fourth token is the elapsed time, as in
/// `Total Execution Time: 0.0123 seconds (0.0125 wall clock)`. No such line
/// gives [`Error::MarkerNotFound`]; a missing or non-numeric fourth token
/// gives [`Error::ParseNumber`].
pub fn parse_pass_timing(report: &str) -> Result<f64> {
    let line = report
        .lines()
        .find(|line| line.contains(PASS_TIMING_MARKER))
        .ok_or(Error::MarkerNotFound {
            marker: PASS_TIMING_MARKER,
        })?;
    let token = line.split_whitespace().nth(3).ok_or_else(|| Error::ParseNumber {
        input: line.trim().to_string(),
    })?;
    parse_scalar(token)
}

/// Text-segment size from Berkeley-format `size` output: first column of
/// the second line.
pub fn parse_size_report(report: &str) -> Result<f64> {
    let column = report
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().next())
        .ok_or(Error::MalformedSizeReport)?;
    parse_scalar(column)
}

/// Read a file some tool was expected to leave behind.
pub fn read_output(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::MissingOutput {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_hyperfine_mean(path: &Path) -> Result<f64> {
    parse_hyperfine_mean(&read_output(path)?, path)
}

/// Fail unless a tool left `path` behind.
pub fn require_output(path: &Path) -> Result<()> {
    fs::metadata(path)
        .map(|_| ())
        .map_err(|source| Error::MissingOutput {
            path: path.to_path_buf(),
            source,
        })
}
