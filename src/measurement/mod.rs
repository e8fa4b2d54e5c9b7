// Measurement of one generated program under one (compiler, opt) pair
// Direct mode times a single compiler call; LLVM mode splits compilation
// into front-end, `opt` and `llc` and times each stage.

pub mod parse;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{ExperimentConfig, LlvmTools, Pipeline};
use crate::error::{Error, Result};
use crate::generation::{GeneratedProgram, ProgramMetadata};
use crate::tools::{Invocation, ToolOutput, ToolRunner};
use parse::{parse_pass_timing, parse_size_report, read_hyperfine_mean, require_output};

/// One repetition's observations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeasurementSample {
    pub compile_time: f64,
    pub optimizer_time: Option<f64>,
    pub codegen_time: Option<f64>,
    pub binary_size: Option<f64>,
    pub exec_time: Option<f64>,
}

/// Aggregate of all repetitions for one (program, compiler, opt) tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    pub compiler: String,
    pub opt: String,
    pub compile_time: f64,
    pub optimizer_time: Option<f64>,
    pub codegen_time: Option<f64>,
    pub binary_size: Option<f64>,
    pub exec_time: Option<f64>,
    #[serde(flatten)]
    pub metadata: ProgramMetadata,
}

impl MeasurementSummary {
    /// The first repetition supplies the headline compile time and the
    /// binary size; stage and execution times are averaged over all of
    /// them. `None` when there are no samples.
    pub fn from_samples(
        compiler: &str,
        opt: &str,
        metadata: ProgramMetadata,
        samples: &[MeasurementSample],
    ) -> Option<Self> {
        let first = samples.first()?;
        Some(Self {
            compiler: compiler.to_string(),
            opt: opt.to_string(),
            compile_time: first.compile_time,
            optimizer_time: mean_of(samples, |s| s.optimizer_time),
            codegen_time: mean_of(samples, |s| s.codegen_time),
            binary_size: first.binary_size,
            exec_time: mean_of(samples, |s| s.exec_time),
            metadata,
        })
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn mean_of(samples: &[MeasurementSample], field: impl Fn(&MeasurementSample) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = samples.iter().filter_map(field).collect();
    mean(&values)
}

/// Scratch artifacts, named `<kind>_<runs>_<grammar>.<ext>`. Not unique per
/// run instance: concurrent runs with the same settings overwrite each other.
#[derive(Debug, Clone)]
pub struct ScratchFiles {
    dir: PathBuf,
    runs: u32,
    grammar: String,
}

impl ScratchFiles {
    pub fn new(dir: &Path, runs: u32, grammar: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            runs,
            grammar: grammar.to_string(),
        }
    }

    pub fn path(&self, kind: &str, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{kind}_{}_{}.{ext}", self.runs, self.grammar))
    }
}

/// Everything the stages of one measurement share.
struct Target<'t> {
    compiler: &'t str,
    opt_flags: Vec<String>,
    work_dir: PathBuf,
    sources: Vec<PathBuf>,
    includes: Vec<String>,
    scratch: ScratchFiles,
}

impl Target<'_> {
    fn binary(&self) -> PathBuf {
        self.work_dir.join("a.out")
    }

    /// `opt` and `llc` only understand the `-O` part of a flag set.
    fn stage_flags(&self) -> Vec<String> {
        self.opt_flags
            .iter()
            .filter(|f| f.starts_with("-O"))
            .cloned()
            .collect()
    }
}

pub struct MeasurementRunner<'a, R: ToolRunner> {
    config: &'a ExperimentConfig,
    root: &'a Path,
    runner: &'a mut R,
}

impl<'a, R: ToolRunner> MeasurementRunner<'a, R> {
    pub fn new(config: &'a ExperimentConfig, root: &'a Path, runner: &'a mut R) -> Self {
        Self {
            config,
            root,
            runner,
        }
    }

    /// Measure `program` compiled by `compiler` at `opt`, repeated
    /// `config.repetitions` times.
    pub fn measure(
        &mut self,
        program: &GeneratedProgram,
        compiler: &str,
        opt: &str,
    ) -> Result<MeasurementSummary> {
        let work_dir = program.src_dir();
        let metadata = ProgramMetadata::read_from(&work_dir)?;
        let target = Target {
            compiler,
            opt_flags: opt.split_whitespace().map(str::to_string).collect(),
            sources: files_with_ext(&work_dir, &["c", "h"])?,
            includes: self
                .config
                .include_dirs
                .iter()
                .map(|dir| format!("-I{}", self.root.join(dir).display()))
                .collect(),
            scratch: ScratchFiles::new(&self.config.scratch_dir, self.config.runs, &metadata.grammar),
            work_dir,
        };

        let repetitions = self.config.repetitions;
        let mut samples = Vec::with_capacity(repetitions as usize);
        for rep in 0..repetitions {
            info!(
                "PROGRAM {}, COMPILER {compiler}, OPT {opt}, RUN {}/{repetitions}",
                program.id,
                rep + 1
            );
            let first = rep == 0;
            let sample = match &self.config.pipeline {
                Pipeline::Direct => self.sample_direct(&target, first)?,
                Pipeline::Llvm(tools) => self.sample_llvm(tools, &target, first)?,
            };
            debug!("sample {}: {sample:?}", rep + 1);
            samples.push(sample);
        }

        MeasurementSummary::from_samples(compiler, opt, metadata, &samples)
            .ok_or_else(|| Error::Config("repetitions must be at least 1".into()))
    }

    fn sample_direct(&mut self, target: &Target<'_>, first: bool) -> Result<MeasurementSample> {
        let binary = target.binary();
        remove_stale(&binary)?;
        let compile = Invocation::new(target.compiler, &target.work_dir)
            .args(target.opt_flags.iter().cloned())
            .args(target.sources.iter().map(|p| p.to_string_lossy().into_owned()))
            .args(target.includes.iter().cloned())
            .arg("-o")
            .path_arg(&binary);
        let compile_time = self.hyperfine(&compile, &target.scratch.path("result", "json"))?;
        require_output(&binary)?;

        let binary_size = if first {
            Some(self.binary_size(target)?)
        } else {
            None
        };
        let exec_time = if self.config.measure_execution {
            Some(self.execution_time(target)?)
        } else {
            None
        };

        Ok(MeasurementSample {
            compile_time,
            binary_size,
            exec_time,
            ..MeasurementSample::default()
        })
    }

    fn sample_llvm(
        &mut self,
        tools: &LlvmTools,
        target: &Target<'_>,
        first: bool,
    ) -> Result<MeasurementSample> {
        let dir = &target.work_dir;
        let all_bc = dir.join("all.bc");
        let all_ll = dir.join("all.ll");
        let optimized = dir.join("optimized.ll");

        let frontend = Invocation::new(target.compiler, dir)
            .args(target.opt_flags.iter().cloned())
            .args(["-S", "-emit-llvm"])
            .args(target.sources.iter().map(|p| p.to_string_lossy().into_owned()))
            .args(target.includes.iter().cloned());
        let compile_time = self.hyperfine(&frontend, &target.scratch.path("result", "json"))?;

        let ir_files = files_with_ext(dir, &["ll"])?;
        self.run_logged(
            &Invocation::new(&tools.link, dir)
                .args(ir_files.iter().map(|p| p.to_string_lossy().into_owned()))
                .arg("-o")
                .path_arg(&all_bc),
        )?;
        self.run_logged(
            &Invocation::new(&tools.dis, dir)
                .path_arg(&all_bc)
                .arg("-o")
                .path_arg(&all_ll),
        )?;

        let optimizer = Invocation::new(&tools.opt, dir)
            .args(target.stage_flags())
            .arg("-time-passes")
            .path_arg(&all_ll)
            .arg("-o")
            .path_arg(&optimized);
        let optimizer_time = self.pass_timing(&optimizer, &target.scratch.path("opt", "txt"))?;

        let mut binary_size = None;
        let mut exec_time = None;
        if first || self.config.measure_execution {
            // a failed link must not leave the previous level's binary behind
            remove_stale(&target.binary())?;
            self.run_logged(
                &Invocation::new(target.compiler, dir)
                    .args(target.opt_flags.iter().cloned())
                    .path_arg(&optimized)
                    .arg("-o")
                    .path_arg(&target.binary()),
            )?;
            require_output(&target.binary())?;
            if first {
                binary_size = Some(self.binary_size(target)?);
            }
            if self.config.measure_execution {
                exec_time = Some(self.execution_time(target)?);
            }
        }

        let codegen = Invocation::new(&tools.llc, dir)
            .args(target.stage_flags())
            .arg("-time-passes")
            .arg("-o")
            .path_arg(&dir.join("program.s"))
            .path_arg(&optimized);
        let codegen_time = self.pass_timing(&codegen, &target.scratch.path("llc", "txt"))?;

        remove_intermediates(dir)?;

        Ok(MeasurementSample {
            compile_time,
            optimizer_time: Some(optimizer_time),
            codegen_time: Some(codegen_time),
            binary_size,
            exec_time,
        })
    }

    /// Time `command` with hyperfine and return the mean from its export.
    fn hyperfine(&mut self, command: &Invocation, export: &Path) -> Result<f64> {
        // a stale export from an earlier measurement must not be read back
        remove_stale(export)?;
        let invocation = Invocation::new(&self.config.hyperfine, &command.cwd)
            .arg("--show-output")
            .args(["--warmup".to_string(), self.config.warmup.to_string()])
            .args(["--runs".to_string(), self.config.runs.to_string()])
            .arg("--export-json")
            .path_arg(export)
            .arg(command.to_shell());
        self.run_logged(&invocation)?;
        read_hyperfine_mean(export)
    }

    fn execution_time(&mut self, target: &Target<'_>) -> Result<f64> {
        let run = Invocation::new(target.binary().to_string_lossy(), &target.work_dir);
        self.hyperfine(&run, &target.scratch.path("exec", "json"))
    }

    fn binary_size(&mut self, target: &Target<'_>) -> Result<f64> {
        let report = self.run_logged(
            &Invocation::new(&self.config.size, &target.work_dir).path_arg(&target.binary()),
        )?;
        fs::write(target.scratch.path("size", "txt"), &report.stdout)?;
        parse_size_report(&report.stdout)
    }

    /// Run a `-time-passes` invocation, keep its report and parse it.
    fn pass_timing(&mut self, invocation: &Invocation, report_path: &Path) -> Result<f64> {
        let report = self.run_logged(invocation)?.combined();
        fs::write(report_path, &report)?;
        parse_pass_timing(&report)
    }

    fn run_logged(&mut self, invocation: &Invocation) -> Result<ToolOutput> {
        let output = self.runner.run(invocation)?;
        if !output.success {
            warn!("{} exited with {:?}", invocation.program, output.code);
            debug!("stderr:\n{}", output.stderr);
        }
        Ok(output)
    }
}

/// Files in `dir` with one of `exts`, sorted by name.
pub fn files_with_ext(dir: &Path, exts: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| exts.contains(&e));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn remove_intermediates(dir: &Path) -> Result<()> {
    for file in files_with_ext(dir, &["ll", "bc", "s"])? {
        fs::remove_file(file)?;
    }
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(compile: f64, opt: f64, llc: f64, size: Option<f64>) -> MeasurementSample {
        MeasurementSample {
            compile_time: compile,
            optimizer_time: Some(opt),
            codegen_time: Some(llc),
            binary_size: size,
            exec_time: None,
        }
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[0.25]), Some(0.25));
        assert_eq!(mean(&[1.0, 2.0, 3.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_summary_headline_is_first_compile_time() {
        let samples = [
            sample(0.5, 0.10, 0.20, Some(2048.0)),
            sample(0.9, 0.30, 0.40, None),
        ];
        let summary = MeasurementSummary::from_samples(
            "clang-21",
            "-O2",
            ProgramMetadata::new("ex7", 4, "array"),
            &samples,
        )
        .unwrap();

        assert_eq!(summary.compile_time, 0.5);
        assert!((summary.optimizer_time.unwrap() - 0.20).abs() < 1e-12);
        assert!((summary.codegen_time.unwrap() - 0.30).abs() < 1e-12);
        assert_eq!(summary.binary_size, Some(2048.0));
        assert_eq!(summary.exec_time, None);
    }

    #[test]
    fn test_summary_of_nothing() {
        let meta = ProgramMetadata::new("ex7", 4, "array");
        assert!(MeasurementSummary::from_samples("gcc-14", "-O0", meta, &[]).is_none());
    }

    #[test]
    fn test_summary_serializes_flat() {
        let summary = MeasurementSummary::from_samples(
            "gcc-14",
            "-O1",
            ProgramMetadata::new("ex8", 9, "array"),
            &[MeasurementSample {
                compile_time: 1.0,
                binary_size: Some(100.0),
                ..MeasurementSample::default()
            }],
        )
        .unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["grammar"], "ex8");
        assert_eq!(json["iteration"], 9);
        assert_eq!(json["compiler"], "gcc-14");
        assert!(json["optimizer_time"].is_null());
    }

    #[test]
    fn test_scratch_naming() {
        let scratch = ScratchFiles::new(Path::new("/tmp"), 2, "ex7");
        assert_eq!(scratch.path("result", "json"), PathBuf::from("/tmp/result_2_ex7.json"));
        assert_eq!(scratch.path("llc", "txt"), PathBuf::from("/tmp/llc_2_ex7.txt"));
    }

    #[test]
    fn test_files_with_ext_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.c", "a.c", "x.h", "notes.txt", "all.ll"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        let found: Vec<_> = files_with_ext(tmp.path(), &["c", "h"])
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, ["a.c", "b.c", "x.h"]);
    }

    #[test]
    fn test_remove_intermediates_keeps_sources() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["main.c", "all.bc", "all.ll", "optimized.ll", "program.s"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        remove_intermediates(tmp.path()).unwrap();
        assert!(tmp.path().join("main.c").exists());
        assert!(files_with_ext(tmp.path(), &["ll", "bc", "s"]).unwrap().is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the mean lies between the smallest and largest sample
            #[test]
            fn prop_mean_is_bounded(values in prop::collection::vec(0.0f64..100.0, 1..50)) {
                let m = mean(&values).unwrap();
                let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(m >= lo - 1e-9 && m <= hi + 1e-9);
            }

            /// Property: mean times count gives back the sum
            #[test]
            fn prop_mean_matches_sum(values in prop::collection::vec(0.0f64..100.0, 1..50)) {
                let m = mean(&values).unwrap();
                let sum: f64 = values.iter().sum();
                prop_assert!((m * values.len() as f64 - sum).abs() < 1e-6);
            }

            /// Property: a single sample is its own mean
            #[test]
            fn prop_single_sample_mean(value in -1.0e6f64..1.0e6) {
                prop_assert_eq!(mean(&[value]), Some(value));
            }
        }
    }
}
