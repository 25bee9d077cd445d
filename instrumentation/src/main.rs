//! Instruments a textual module with AFL edge coverage and execution indexing.
//!
//! Settings come from the `AFL_*` environment variables; command-line flags
//! override them.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use slog::{crit, debug};

use afl_pass::config::{InstrumentationConfig, Overrides, parse_inst_ratio};
use afl_pass::log;
use afl_pass::pipeline::instrument_module;
use afl_pass::util::{read_module, write_module};

/// Adds AFL edge coverage and execution indexing to a module.
#[derive(Debug, Parser)]
#[command(name = "instrumentation", version)]
struct Cli {
    /// Module to instrument.
    input: PathBuf,

    /// Where to write the instrumented module. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimisation level of the build. `0` runs edge coverage only.
    #[arg(short = 'O', long = "opt-level", default_value_t = 2)]
    opt_level: u8,

    /// Seed for edge and call-site ids, for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Percentage of basic blocks to instrument (1-100).
    #[arg(long, value_parser = parse_inst_ratio)]
    ratio: Option<u32>,

    /// Library function whose calls are routed through `__afl_ei_<name>`.
    #[arg(long)]
    intercept: Option<String>,

    /// Suppress the banner and summaries.
    #[arg(short, long)]
    quiet: bool,

    /// Log per-function detail.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn config(&self) -> Result<InstrumentationConfig> {
        InstrumentationConfig::from_env_with(&Overrides {
            inst_ratio: self.ratio,
            seed: self.seed,
            intercepted_fn: self.intercept.clone(),
            quiet: self.quiet,
            debug: self.debug,
        })
    }
}

fn run(cli: &Cli, config: &InstrumentationConfig, log: &slog::Logger) -> Result<()> {
    let mut module = read_module(&cli.input)?;
    let summary = instrument_module(&mut module, config, cli.opt_level, log)
        .with_context(|| format!("Failed to instrument {}", cli.input.display()))?;
    debug!(
        log,
        "{} blocks, {} call sites, {} rewritten calls",
        summary.instrumented_blocks,
        summary.call_sites,
        summary.rewritten_calls
    );
    write_module(&module, cli.output.as_deref())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            crit!(log::logger(&InstrumentationConfig::default()), "{:#}", err);
            return ExitCode::FAILURE;
        }
    };
    let log = log::logger(&config);

    match run(&cli, &config, &log) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            crit!(log, "{:#}", err);
            ExitCode::FAILURE
        }
    }
}
