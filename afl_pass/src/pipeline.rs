//! Pass registration and the driver that runs the registered passes over a
//! module.
//!
//! Edge coverage is registered both late in the optimisation pipeline and for
//! unoptimised builds; execution indexing only late in the pipeline. An `-O0`
//! build therefore gets coverage but no call-site bracketing.

use std::ops::AddAssign;

use anyhow::{Context, Result};
use slog::{Logger, debug};

use crate::config::InstrumentationConfig;
use crate::execution_indexing::ExecutionIndexing;
use crate::instrumentation::AflCoverage;
use crate::ir::{Module, verify_module};
use crate::log::banner;

/// Counts reported by a pass, or by a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub instrumented_blocks: usize,
    pub call_sites: usize,
    pub rewritten_calls: usize,
}

impl AddAssign for Summary {
    fn add_assign(&mut self, other: Self) {
        self.instrumented_blocks += other.instrumented_blocks;
        self.call_sites += other.call_sites;
        self.rewritten_calls += other.rewritten_calls;
    }
}

/// A transformation applied to a whole module.
pub trait ModulePass {
    fn name(&self) -> &'static str;

    fn run(&mut self, module: &mut Module, log: &Logger) -> Result<Summary>;
}

/// Where in the compiler pipeline a pass is hooked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPoint {
    /// After all optimisations, for optimised builds.
    OptimizerLast,
    /// The only point that runs for `-O0` builds.
    EnabledOnOptLevel0,
}

impl ExtensionPoint {
    pub fn active_at(self, opt_level: u8) -> bool {
        match self {
            ExtensionPoint::OptimizerLast => opt_level > 0,
            ExtensionPoint::EnabledOnOptLevel0 => opt_level == 0,
        }
    }
}

type PassFactory = fn(&InstrumentationConfig) -> Box<dyn ModulePass>;

/// The registered passes, in registration order.
pub struct PassRegistry {
    entries: Vec<(ExtensionPoint, &'static str, PassFactory)>,
}

impl Default for PassRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ExtensionPoint::OptimizerLast, "afl-coverage", coverage_pass);
        registry.register(ExtensionPoint::EnabledOnOptLevel0, "afl-coverage", coverage_pass);
        registry.register(
            ExtensionPoint::OptimizerLast,
            "execution-indexing",
            execution_indexing_pass,
        );
        registry
    }
}

fn coverage_pass(config: &InstrumentationConfig) -> Box<dyn ModulePass> {
    Box::new(AflCoverage::from_config(config))
}

fn execution_indexing_pass(config: &InstrumentationConfig) -> Box<dyn ModulePass> {
    Box::new(ExecutionIndexing::from_config(config))
}

impl PassRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, point: ExtensionPoint, name: &'static str, factory: PassFactory) {
        self.entries.push((point, name, factory));
    }

    /// Names of the passes that run at `opt_level`, in order.
    pub fn pass_names(&self, opt_level: u8) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(point, ..)| point.active_at(opt_level))
            .map(|(_, name, _)| *name)
            .collect()
    }

    /// Builds the passes that run at `opt_level`.
    pub fn passes_for(
        &self,
        opt_level: u8,
        config: &InstrumentationConfig,
    ) -> Vec<Box<dyn ModulePass>> {
        self.entries
            .iter()
            .filter(|(point, ..)| point.active_at(opt_level))
            .map(|(_, _, factory)| factory(config))
            .collect()
    }
}

/// Runs the default passes for `opt_level` over `module` and verifies the
/// result.
///
/// # Arguments
///
/// * `module` - The module to instrument in place.
/// * `config` - Ratio, seed, intercepted function and diagnostics settings.
/// * `opt_level` - The optimisation level of the build; `0` selects coverage only.
/// * `log` - Where the banner, summaries and debug detail go.
///
/// # Returns
///
/// The combined counts of all passes that ran.
pub fn instrument_module(
    module: &mut Module,
    config: &InstrumentationConfig,
    opt_level: u8,
    log: &Logger,
) -> Result<Summary> {
    run_passes(&PassRegistry::default(), module, config, opt_level, log)
}

/// Like [`instrument_module`], with an explicit registry.
pub fn run_passes(
    registry: &PassRegistry,
    module: &mut Module,
    config: &InstrumentationConfig,
    opt_level: u8,
    log: &Logger,
) -> Result<Summary> {
    banner(log);

    let mut summary = Summary::default();
    for mut pass in registry.passes_for(opt_level, config) {
        debug!(log, "Running {} on module '{}'", pass.name(), module.name);
        summary += pass
            .run(module, log)
            .with_context(|| format!("{} failed on module '{}'", pass.name(), module.name))?;
    }

    verify_module(module).context("Instrumented module is not well formed")?;
    debug!(log, "Validation of instrumented module successful.");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::discard;

    #[test]
    fn opt_level_zero_runs_coverage_only() {
        let registry = PassRegistry::default();
        assert_eq!(registry.pass_names(0), vec!["afl-coverage"]);
        assert_eq!(
            registry.pass_names(2),
            vec!["afl-coverage", "execution-indexing"]
        );
    }

    #[test]
    fn summaries_add_up() {
        let mut total = Summary {
            instrumented_blocks: 2,
            ..Summary::default()
        };
        total += Summary {
            instrumented_blocks: 1,
            call_sites: 4,
            rewritten_calls: 1,
        };
        assert_eq!(
            total,
            Summary {
                instrumented_blocks: 3,
                call_sites: 4,
                rewritten_calls: 1
            }
        );
    }

    #[test]
    fn empty_registry_only_verifies() {
        let mut module = Module::new("empty");
        let config = InstrumentationConfig::default();
        let summary =
            run_passes(&PassRegistry::empty(), &mut module, &config, 1, &discard()).unwrap();
        assert_eq!(summary, Summary::default());
        assert_eq!(module, Module::new("empty"));
    }
}
