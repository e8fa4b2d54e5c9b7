// generate -> measure -> persist -> cleanup

use log::info;
use std::fs;
use std::path::Path;

use crate::cleanup::{CleanupGuard, CleanupPolicy};
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::generation::generate_programs;
use crate::measurement::MeasurementRunner;
use crate::results::ResultTable;
use crate::tools::ToolRunner;

/// Run one experiment end to end against the BenchGen tree at `root`.
///
/// The generated programs are owned by a [`CleanupGuard`] for the whole run;
/// `policy` decides what happens to them when any stage fails.
pub fn run_experiment<R: ToolRunner>(
    config: &ExperimentConfig,
    root: &Path,
    runner: &mut R,
    policy: CleanupPolicy,
) -> Result<ResultTable> {
    config.validate()?;

    // tools run in the program directories, so every path handed to them
    // has to be absolute
    let root = fs::canonicalize(root)?;
    fs::create_dir_all(&config.scratch_dir)?;
    if let Some(parent) = config.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut config = config.clone();
    config.scratch_dir = fs::canonicalize(&config.scratch_dir)?;
    let config = &config;
    let root = root.as_path();

    let mut guard = CleanupGuard::new(policy);

    info!("Generating programs...");
    let programs = generate_programs(config, root, runner, &mut guard)?;

    info!("Compiling programs");
    let mut table = ResultTable::new();
    let mut measurement = MeasurementRunner::new(config, root, runner);
    for program in &programs {
        for compiler in &config.compilers {
            for opt in config.opts_for(compiler) {
                table.push(measurement.measure(program, &compiler.name, opt)?);
            }
        }
    }
    debug_assert_eq!(table.len(), config.expected_rows(programs.len()));

    table.save_csv(&config.output)?;
    table.save_json(&config.json_output())?;

    guard.commit()?;
    Ok(table)
}
