//! Benchmark harness for BenchGen-generated programs.
//!
//! Generates a matrix of programs with the external BenchGen generator,
//! compiles each one under every configured (compiler, optimization level)
//! pair, measures compile time, LLVM stage times, binary size and execution
//! time with `hyperfine` and `size`, and writes the results as CSV and JSON.
//!
//! Everything runs sequentially in one thread so that measurements do not
//! contend with each other.

pub mod affinity;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod generation;
pub mod measurement;
pub mod pipeline;
pub mod results;
pub mod tools;

pub use cleanup::CleanupPolicy;
pub use config::{ExperimentConfig, Preset};
pub use error::{Error, Result};
pub use pipeline::run_experiment;
pub use results::ResultTable;
