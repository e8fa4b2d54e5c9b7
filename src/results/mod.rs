// Result table
// Rows accumulate in memory and are written once, at the end of the run.

use log::info;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::measurement::MeasurementSummary;

pub const HEADER: [&str; 8] = [
    "clang_time",
    "opt_time",
    "llc_time",
    "bin_size",
    "opt",
    "iteration",
    "grammar_name",
    "data_structure",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<MeasurementSummary>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: MeasurementSummary) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MeasurementSummary] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize as CSV: the fixed header, then one line per row.
    pub fn write_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", HEADER.join(","))?;
        for row in &self.rows {
            let fields = [
                row.compile_time.to_string(),
                optional(row.optimizer_time),
                optional(row.codegen_time),
                optional(row.binary_size),
                row.opt.clone(),
                row.metadata.iteration.to_string(),
                row.metadata.grammar.clone(),
                row.metadata.data_structure.clone(),
            ];
            let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        Ok(())
    }

    /// Write the CSV to `path`, replacing whatever was there.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        fs::write(path, buf)?;
        info!("Wrote {} row(s) to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Full summaries, compiler and execution time included.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(&self.rows)?)?;
        info!("Wrote summaries to {}", path.display());
        Ok(())
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ProgramMetadata;

    fn row(opt: &str, optimizer: Option<f64>) -> MeasurementSummary {
        MeasurementSummary {
            compiler: "clang-21".into(),
            opt: opt.into(),
            compile_time: 0.5,
            optimizer_time: optimizer,
            codegen_time: optimizer.map(|t| t * 2.0),
            binary_size: Some(2048.0),
            exec_time: None,
            metadata: ProgramMetadata::new("ex7", 4, "array"),
        }
    }

    fn csv_text(table: &ResultTable) -> String {
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_empty_table_has_header_only() {
        assert_eq!(
            csv_text(&ResultTable::new()),
            "clang_time,opt_time,llc_time,bin_size,opt,iteration,grammar_name,data_structure\n"
        );
    }

    #[test]
    fn test_rows_in_order() {
        let mut table = ResultTable::new();
        table.push(row("-O0", Some(0.25)));
        table.push(row("-O3 -ffast-math", Some(0.5)));
        let text = csv_text(&table);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0.5,0.25,0.5,2048,-O0,4,ex7,array");
        assert_eq!(lines[2], "0.5,0.5,1,2048,-O3 -ffast-math,4,ex7,array");
    }

    #[test]
    fn test_missing_stage_times_are_empty() {
        let mut table = ResultTable::new();
        table.push(row("-O2", None));
        let text = csv_text(&table);
        assert_eq!(text.lines().nth(1), Some("0.5,,,2048,-O2,4,ex7,array"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("compilers_comparison.csv");
        fs::write(&path, "stale contents\nfrom an older run\n").unwrap();

        let mut table = ResultTable::new();
        table.push(row("-O1", Some(0.1)));
        table.save_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("clang_time,"));
        assert!(!text.contains("stale"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_save_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("results.json");
        let mut table = ResultTable::new();
        table.push(row("-O1", Some(0.1)));
        table.save_json(&path).unwrap();

        let parsed: Vec<MeasurementSummary> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, table.rows());
    }
}
