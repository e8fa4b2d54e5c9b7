// Main benchmark runner for the BenchGen experiments
// Runs the compiler comparison, the asymptotic-behaviour study, or both

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use benchgen_harness::tools::{self, SystemRunner};
use benchgen_harness::{affinity, run_experiment, CleanupPolicy, ExperimentConfig, Preset, Result};

#[derive(Parser)]
#[command(
    name = "benchgen-harness",
    version,
    about = "Compile and measure BenchGen-generated programs across compilers and optimization levels"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GCC vs Clang over every optimization level (compile time, size, run time)
    Compilers(RunArgs),
    /// Clang front-end, opt and llc times as generated programs grow
    Asymptotic(RunArgs),
    /// Run both experiments, one after the other
    All(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// BenchGen root directory (holds src/gen and src/Dalloc)
    benchgen_root: PathBuf,

    /// JSON file merged over the built-in experiment settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV output file (a directory for `all`)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for hyperfine exports and tool reports
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// hyperfine runs per measurement
    #[arg(long)]
    runs: Option<u32>,

    /// hyperfine warmup runs per measurement
    #[arg(long)]
    warmup: Option<u32>,

    /// Repetitions of every per-stage measurement
    #[arg(long)]
    repetitions: Option<u32>,

    /// What to do with generated programs when the run ends
    #[arg(long, value_enum, default_value_t = Cleanup::OnSuccess)]
    cleanup: Cleanup,

    /// Pin the harness (and every tool it spawns) to this CPU core
    #[arg(long)]
    pin_core: Option<usize>,

    /// Do not check that the required tools are on PATH
    #[arg(long)]
    skip_preflight: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Cleanup {
    /// Remove programs after a successful run, keep them on failure
    OnSuccess,
    /// Remove programs on every exit path
    Always,
    /// Keep programs
    Never,
}

impl From<Cleanup> for CleanupPolicy {
    fn from(cleanup: Cleanup) -> Self {
        match cleanup {
            Cleanup::OnSuccess => Self::OnSuccess,
            Cleanup::Always => Self::Always,
            Cleanup::Never => Self::Never,
        }
    }
}

fn build_config(preset: Preset, args: &RunArgs, output_is_dir: bool) -> Result<ExperimentConfig> {
    let mut config = preset.config();
    if let Some(path) = &args.config {
        config = config.with_overrides_file(path)?;
    }
    if let Some(dir) = &args.scratch_dir {
        config.scratch_dir = dir.clone();
    }
    if let Some(output) = &args.output {
        config.output = match config.output.file_name() {
            Some(name) if output_is_dir => output.join(name),
            _ => output.clone(),
        };
    }
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(warmup) = args.warmup {
        config.warmup = warmup;
    }
    if let Some(repetitions) = args.repetitions {
        config.repetitions = repetitions;
    }
    Ok(config)
}

fn run(presets: &[Preset], args: &RunArgs) -> Result<()> {
    if let Some(core) = args.pin_core {
        affinity::pin_to_core(core);
    }

    for &preset in presets {
        let config = build_config(preset, args, presets.len() > 1)?;
        info!("Running {}...", config.name);
        info!("==================================");

        if !args.skip_preflight {
            tools::preflight(config.required_tools())?;
        }

        let table = run_experiment(
            &config,
            &args.benchgen_root,
            &mut SystemRunner,
            args.cleanup.into(),
        )?;
        info!("{}: {} row(s) measured", config.name, table.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Compilers(args) => run(&[Preset::CompilersComparison], args),
        Commands::Asymptotic(args) => run(&[Preset::AsymptoticBehavior], args),
        Commands::All(args) => run(
            &[Preset::CompilersComparison, Preset::AsymptoticBehavior],
            args,
        ),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
