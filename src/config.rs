//! Experiment configuration
//!
//! The matrix dimensions (grammars, iterations, data structures, compilers,
//! optimization levels, repetition counts) are plain data. Two presets carry
//! the values the compiler-comparison and asymptotic-behaviour experiments
//! were run with; a JSON file can be merged over either one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const GCC_VERSION: u32 = 14;
pub const CLANG_VERSION: u32 = 21;

/// Inclusive range of generator iteration counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRange {
    pub start: u32,
    pub end: u32,
}

impl IterationRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn values(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A compiler under test and any optimization levels only it is tested with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub name: String,
    #[serde(default)]
    pub extra_opts: Vec<String>,
}

impl CompilerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra_opts: Vec::new(),
        }
    }

    pub fn with_extra_opts(mut self, opts: &[&str]) -> Self {
        self.extra_opts = opts.iter().map(|o| (*o).to_string()).collect();
        self
    }
}

/// LLVM tools used by the multi-stage pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlvmTools {
    pub opt: String,
    pub llc: String,
    pub link: String,
    pub dis: String,
}

impl LlvmTools {
    pub fn versioned(version: u32) -> Self {
        Self {
            opt: format!("opt-{version}"),
            llc: format!("llc-{version}"),
            link: format!("llvm-link-{version}"),
            dis: format!("llvm-dis-{version}"),
        }
    }
}

/// How a (compiler, opt) pair is turned into a binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pipeline {
    /// One compiler invocation straight to an executable
    Direct,
    /// Front-end to IR, then `opt`, then `llc`
    Llvm(LlvmTools),
}

/// Built-in experiment presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    CompilersComparison,
    AsymptoticBehavior,
}

impl Preset {
    pub fn config(self) -> ExperimentConfig {
        match self {
            Self::CompilersComparison => ExperimentConfig::compilers_comparison(),
            Self::AsymptoticBehavior => ExperimentConfig::asymptotic_behavior(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub grammars: Vec<String>,
    pub iterations: IterationRange,
    pub data_structures: Vec<String>,
    pub compilers: Vec<CompilerConfig>,
    pub opts: Vec<String>,
    pub pipeline: Pipeline,
    /// hyperfine `--warmup`
    pub warmup: u32,
    /// hyperfine `--runs`; also the run-count tag of scratch file names
    pub runs: u32,
    /// Outer repetitions of every per-stage measurement
    pub repetitions: u32,
    pub measure_execution: bool,
    /// Include directories, relative to the generator root
    pub include_dirs: Vec<PathBuf>,
    pub output: PathBuf,
    pub scratch_dir: PathBuf,
    pub hyperfine: String,
    pub size: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

// -Ofast is gone from clang 21 onwards
fn fast_math_opt() -> &'static str {
    if CLANG_VERSION >= 21 {
        "-O3 -ffast-math"
    } else {
        "-Ofast"
    }
}

impl ExperimentConfig {
    /// GCC against Clang over the usual optimization levels.
    pub fn compilers_comparison() -> Self {
        let scratch_dir = std::env::temp_dir();
        Self {
            name: "compilers_comparison".to_string(),
            grammars: strings(&["ex8", "ex9"]),
            iterations: IterationRange::new(8, 10),
            data_structures: strings(&["array"]),
            compilers: vec![
                CompilerConfig::new(format!("gcc-{GCC_VERSION}")),
                CompilerConfig::new(format!("clang-{CLANG_VERSION}")).with_extra_opts(&["-Oz"]),
            ],
            opts: strings(&["-O0", "-O1", "-O2", "-O3", "-Os", fast_math_opt()]),
            pipeline: Pipeline::Direct,
            warmup: 2,
            runs: 2,
            repetitions: 1,
            measure_execution: true,
            include_dirs: vec![PathBuf::from("src/Dalloc/src")],
            output: scratch_dir.join("compilers_comparison.csv"),
            scratch_dir,
            hyperfine: "hyperfine".to_string(),
            size: "size".to_string(),
        }
    }

    /// Clang through the split LLVM pipeline over a growing iteration range.
    pub fn asymptotic_behavior() -> Self {
        let scratch_dir = std::env::temp_dir();
        Self {
            name: "asymptotic_behavior".to_string(),
            grammars: strings(&["ex7"]),
            iterations: IterationRange::new(4, 11),
            data_structures: strings(&["array"]),
            compilers: vec![CompilerConfig::new(format!("clang-{CLANG_VERSION}"))],
            opts: strings(&["-O0", "-O1", "-O2", "-O3", fast_math_opt()]),
            pipeline: Pipeline::Llvm(LlvmTools::versioned(CLANG_VERSION)),
            warmup: 1,
            runs: 2,
            repetitions: 2,
            measure_execution: false,
            include_dirs: vec![PathBuf::from("src/Dalloc/src")],
            output: scratch_dir.join("asymptotic_behavior.csv"),
            scratch_dir,
            hyperfine: "hyperfine".to_string(),
            size: "size".to_string(),
        }
    }

    /// Merge a JSON document over this configuration. Objects merge key by
    /// key; any other value replaces what was there.
    pub fn with_overrides(self, overrides: Value) -> Result<Self> {
        let mut base = serde_json::to_value(&self)?;
        merge_json(&mut base, overrides);
        Ok(serde_json::from_value(base)?)
    }

    pub fn with_overrides_file(self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
        let overrides: Value = serde_json::from_str(&text)?;
        self.with_overrides(overrides)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grammars.is_empty() {
            return Err(Error::Config("no grammars configured".into()));
        }
        if self.data_structures.is_empty() {
            return Err(Error::Config("no data structures configured".into()));
        }
        if self.compilers.is_empty() {
            return Err(Error::Config("no compilers configured".into()));
        }
        // ids become directory and scratch file names
        for id in self.grammars.iter().chain(&self.data_structures) {
            check_path_component(id)?;
        }
        if self.iterations.is_empty() {
            return Err(Error::Config(format!(
                "iteration range {}..={} is empty",
                self.iterations.start, self.iterations.end
            )));
        }
        if self.runs == 0 || self.repetitions == 0 {
            return Err(Error::Config("runs and repetitions must be at least 1".into()));
        }
        if let Some(c) = self
            .compilers
            .iter()
            .find(|c| self.opts.is_empty() && c.extra_opts.is_empty())
        {
            return Err(Error::Config(format!(
                "compiler {} has no optimization levels to test",
                c.name
            )));
        }
        Ok(())
    }

    /// Optimization levels tested with `compiler`, shared ones first.
    pub fn opts_for<'a>(&'a self, compiler: &'a CompilerConfig) -> impl Iterator<Item = &'a str> {
        self.opts
            .iter()
            .chain(compiler.extra_opts.iter())
            .map(String::as_str)
    }

    pub fn program_count(&self) -> usize {
        self.grammars.len() * self.iterations.len() * self.data_structures.len()
    }

    /// Rows the result table must hold once `programs` programs are measured.
    pub fn expected_rows(&self, programs: usize) -> usize {
        self.compilers
            .iter()
            .map(|c| programs * self.opts_for(c).count())
            .sum()
    }

    /// JSON summaries live next to the CSV.
    pub fn json_output(&self) -> PathBuf {
        self.output.with_extension("json")
    }

    /// External tools the run needs on PATH.
    pub fn required_tools(&self) -> Vec<&str> {
        let mut tools = vec![self.hyperfine.as_str(), self.size.as_str()];
        tools.extend(self.compilers.iter().map(|c| c.name.as_str()));
        if let Pipeline::Llvm(llvm) = &self.pipeline {
            tools.extend([
                llvm.opt.as_str(),
                llvm.llc.as_str(),
                llvm.link.as_str(),
                llvm.dis.as_str(),
            ]);
        }
        tools
    }
}

fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Grammar ids and data-structure tags end up as single path components.
fn check_path_component(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(Error::Config(format!(
            "{id:?} cannot be used as a grammar or data structure name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presets_are_valid() {
        ExperimentConfig::compilers_comparison().validate().unwrap();
        ExperimentConfig::asymptotic_behavior().validate().unwrap();
    }

    #[test]
    fn test_clang_gets_oz_in_comparison() {
        let config = ExperimentConfig::compilers_comparison();
        let gcc: Vec<_> = config.opts_for(&config.compilers[0]).collect();
        let clang: Vec<_> = config.opts_for(&config.compilers[1]).collect();
        assert_eq!(gcc.len(), 6);
        assert_eq!(clang.len(), 7);
        assert_eq!(clang.last(), Some(&"-Oz"));
    }

    #[test]
    fn test_expected_rows() {
        let config = ExperimentConfig::asymptotic_behavior();
        // 1 grammar x 8 iterations x 1 ds, 5 opts, 1 compiler
        assert_eq!(config.program_count(), 8);
        assert_eq!(config.expected_rows(config.program_count()), 40);

        let config = ExperimentConfig::compilers_comparison();
        assert_eq!(config.program_count(), 6);
        assert_eq!(config.expected_rows(6), 6 * 6 + 6 * 7);
    }

    #[test]
    fn test_overrides_merge_nested() {
        let config = ExperimentConfig::asymptotic_behavior()
            .with_overrides(json!({
                "grammars": ["ex_7"],
                "iterations": { "end": 5 },
                "pipeline": { "llc": "llc" },
            }))
            .unwrap();
        assert_eq!(config.grammars, vec!["ex_7".to_string()]);
        assert_eq!(config.iterations, IterationRange::new(4, 5));
        match &config.pipeline {
            Pipeline::Llvm(tools) => {
                assert_eq!(tools.llc, "llc");
                assert_eq!(tools.opt, format!("opt-{CLANG_VERSION}"));
            }
            Pipeline::Direct => panic!("pipeline mode should survive the merge"),
        }
    }

    #[test]
    fn test_overrides_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("matrix.json");
        fs::write(&path, r#"{ "opts": ["-O2"], "repetitions": 5 }"#).unwrap();

        let config = ExperimentConfig::compilers_comparison()
            .with_overrides_file(&path)
            .unwrap();
        assert_eq!(config.opts, vec!["-O2".to_string()]);
        assert_eq!(config.repetitions, 5);
        assert_eq!(config.compilers.len(), 2);

        let missing = ExperimentConfig::compilers_comparison()
            .with_overrides_file(&tmp.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_matrix() {
        let mut config = ExperimentConfig::asymptotic_behavior();
        config.iterations = IterationRange::new(9, 3);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ExperimentConfig::asymptotic_behavior();
        config.repetitions = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ExperimentConfig::compilers_comparison();
        config.grammars.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_path_like_ids() {
        for id in ["", "..", "../x", "a/b"] {
            let mut config = ExperimentConfig::asymptotic_behavior();
            config.grammars = vec![id.to_string()];
            assert!(matches!(config.validate(), Err(Error::Config(_))), "grammar {id:?}");

            let mut config = ExperimentConfig::asymptotic_behavior();
            config.data_structures = vec![id.to_string()];
            assert!(matches!(config.validate(), Err(Error::Config(_))), "tag {id:?}");
        }
    }

    #[test]
    fn test_json_output_sits_next_to_csv() {
        let mut config = ExperimentConfig::asymptotic_behavior();
        config.output = PathBuf::from("/data/out/results.csv");
        assert_eq!(config.json_output(), PathBuf::from("/data/out/results.json"));
    }
}
