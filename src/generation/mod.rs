// Matrix generation
// Expands grammars x iterations x data structures into BenchGen programs and
// stamps each one with the facts it was generated from.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cleanup::CleanupGuard;
use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::measurement::parse::read_output;
use crate::tools::{Invocation, ToolRunner};

pub const GENERATOR_BINARY: &str = "benchGen";

const GRAMMAR_FILE: &str = "grammar.txt";
const ITERATION_FILE: &str = "iteration.txt";
const DATA_STRUCTURE_FILE: &str = "data_structure.txt";

/// `<root>/src/gen`, where the generator lives and writes its programs.
pub fn generator_dir(root: &Path) -> PathBuf {
    root.join("src").join("gen")
}

/// The combination a program was generated from.
///
/// Grammar ids may contain underscores, so the program id cannot be split
/// back into its parts; the metadata files are the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub grammar: String,
    pub iteration: u32,
    pub data_structure: String,
}

impl ProgramMetadata {
    pub fn new(grammar: impl Into<String>, iteration: u32, data_structure: impl Into<String>) -> Self {
        Self {
            grammar: grammar.into(),
            iteration,
            data_structure: data_structure.into(),
        }
    }

    /// `{data_structure}_{iteration}_{grammar}`
    pub fn program_id(&self) -> String {
        format!("{}_{}_{}", self.data_structure, self.iteration, self.grammar)
    }

    pub fn write_to(&self, src_dir: &Path) -> std::io::Result<()> {
        fs::write(src_dir.join(GRAMMAR_FILE), format!("{}\n", self.grammar))?;
        fs::write(src_dir.join(ITERATION_FILE), format!("{}\n", self.iteration))?;
        fs::write(
            src_dir.join(DATA_STRUCTURE_FILE),
            format!("{}\n", self.data_structure),
        )
    }

    pub fn read_from(src_dir: &Path) -> Result<Self> {
        let grammar = read_output(&src_dir.join(GRAMMAR_FILE))?.trim().to_string();
        let iteration_text = read_output(&src_dir.join(ITERATION_FILE))?;
        let iteration = iteration_text
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::ParseNumber {
                input: iteration_text.trim().to_string(),
            })?;
        let data_structure = read_output(&src_dir.join(DATA_STRUCTURE_FILE))?
            .trim()
            .to_string();
        Ok(Self {
            grammar,
            iteration,
            data_structure,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    pub id: String,
    pub dir: PathBuf,
    pub metadata: ProgramMetadata,
}

impl GeneratedProgram {
    /// Directory holding the sources and the metadata files.
    pub fn src_dir(&self) -> PathBuf {
        self.dir.join("src")
    }
}

/// Every combination, grammar outermost and data structure innermost.
pub fn matrix(config: &ExperimentConfig) -> Vec<ProgramMetadata> {
    let mut combinations = Vec::with_capacity(config.program_count());
    for grammar in &config.grammars {
        for iteration in config.iterations.values() {
            for data_structure in &config.data_structures {
                combinations.push(ProgramMetadata::new(grammar, iteration, data_structure));
            }
        }
    }
    combinations
}

/// Path of the generator binary, building it with `make` if it is missing.
pub fn ensure_generator<R: ToolRunner>(root: &Path, runner: &mut R) -> Result<PathBuf> {
    let gen_dir = generator_dir(root);
    let binary = gen_dir.join(GENERATOR_BINARY);
    if binary.exists() {
        return Ok(binary);
    }

    info!("Compiling BenchGen...");
    let output = runner.run(&Invocation::new("make", &gen_dir))?;
    if !output.success {
        warn!("make exited with {:?}", output.code);
        debug!("make stderr:\n{}", output.stderr);
    }
    if !binary.exists() {
        return Err(Error::Generation {
            program: GENERATOR_BINARY.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} was not built", binary.display()),
            ),
        });
    }
    Ok(binary)
}

/// Generate one program per matrix combination.
///
/// Each program directory is handed to `guard` before the generator runs,
/// so a failure part-way through leaves nothing untracked.
pub fn generate_programs<R: ToolRunner>(
    config: &ExperimentConfig,
    root: &Path,
    runner: &mut R,
    guard: &mut CleanupGuard,
) -> Result<Vec<GeneratedProgram>> {
    let generator = ensure_generator(root, runner)?;
    let gen_dir = generator_dir(root);
    let mut programs = Vec::with_capacity(config.program_count());

    for metadata in matrix(config) {
        let id = metadata.program_id();
        let dir = gen_dir.join(&id);
        let examples = gen_dir.join("examples").join(&metadata.grammar);

        info!(
            "Generating program: {} iteration: {} data_structure: {}",
            metadata.grammar, metadata.iteration, metadata.data_structure
        );
        guard.register(&dir);

        let invocation = Invocation::new(generator.to_string_lossy(), &gen_dir)
            .arg(metadata.iteration.to_string())
            .path_arg(&examples.join("production_rule.txt"))
            .path_arg(&examples.join("seed_string.txt"))
            .arg(&id)
            .arg(&metadata.data_structure);
        let output = runner.run(&invocation)?;
        if !output.success {
            warn!("{GENERATOR_BINARY} exited with {:?} for {id}", output.code);
        }
        debug!("{GENERATOR_BINARY} output for {id}:\n{}", output.combined());

        let program = GeneratedProgram {
            id: id.clone(),
            dir,
            metadata,
        };
        program
            .metadata
            .write_to(&program.src_dir())
            .map_err(|source| Error::Generation {
                program: id,
                source,
            })?;
        programs.push(program);
    }

    Ok(programs)
}
