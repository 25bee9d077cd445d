//! Configuration for an instrumentation run, read once per invocation.
//!
//! Values normally come from the `AFL_*` environment variables
//! ([`InstrumentationConfig::from_env`]); the builder lets drivers and tests
//! set them directly. Either way the ratio is validated before any pass
//! touches a module.

use std::fmt;
use std::io::IsTerminal;

use anyhow::{Result, bail};

use crate::constants::{
    DEFAULT_INST_RATIO, DEFAULT_INTERCEPTED_FN, ENV_DEBUG, ENV_EI_INTERCEPT, ENV_HARDEN,
    ENV_INST_RATIO, ENV_INST_SEED, ENV_QUIET, ENV_USE_ASAN, ENV_USE_MSAN,
};

/// The build flavour reported next to the instrumented-block count. It only
/// affects diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    NonHardened,
    Hardened,
    Sanitized,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::NonHardened => "non-hardened",
            Mode::Hardened => "hardened",
            Mode::Sanitized => "ASAN/MSAN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationConfig {
    inst_ratio: u32,
    seed: Option<u64>,
    intercepted_fn: String,
    mode: Mode,
    quiet: bool,
    debug: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            inst_ratio: DEFAULT_INST_RATIO,
            seed: None,
            intercepted_fn: DEFAULT_INTERCEPTED_FN.to_string(),
            mode: Mode::default(),
            quiet: false,
            debug: false,
        }
    }
}

impl InstrumentationConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reads the configuration from the process environment. Banner and
    /// summary are suppressed when stderr is not a terminal.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&Overrides::default())
    }

    /// Like [`InstrumentationConfig::from_env`], with `overrides` replacing the
    /// matching variables before anything is validated.
    pub fn from_env_with(overrides: &Overrides) -> Result<Self> {
        let mut config = Self::from_lookup(overrides.over(|key| std::env::var(key).ok()))?;
        if !std::io::stderr().is_terminal() {
            config.quiet = true;
        }
        Ok(config)
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let is_set = |key: &str| lookup(key).is_some();

        let mut builder = Self::builder()
            .quiet(is_set(ENV_QUIET))
            .debug(is_set(ENV_DEBUG));

        if let Some(ratio) = lookup(ENV_INST_RATIO) {
            builder = builder.inst_ratio(parse_inst_ratio(&ratio)?);
        }
        if let Some(seed) = lookup(ENV_INST_SEED) {
            let Ok(seed) = seed.trim().parse::<u64>() else {
                bail!("Bad value of {ENV_INST_SEED} (must be an unsigned integer)");
            };
            builder = builder.seed(seed);
        }
        if let Some(name) = lookup(ENV_EI_INTERCEPT).filter(|name| !name.is_empty()) {
            builder = builder.intercepted_fn(name);
        }

        let mode = if is_set(ENV_HARDEN) {
            Mode::Hardened
        } else if is_set(ENV_USE_ASAN) || is_set(ENV_USE_MSAN) {
            Mode::Sanitized
        } else {
            Mode::NonHardened
        };
        builder.mode(mode).build()
    }

    pub fn inst_ratio(&self) -> u32 {
        self.inst_ratio
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn intercepted_fn(&self) -> &str {
        &self.intercepted_fn
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Values set by a driver (command-line flags) that take precedence over the
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub inst_ratio: Option<u32>,
    pub seed: Option<u64>,
    pub intercepted_fn: Option<String>,
    pub quiet: bool,
    pub debug: bool,
}

impl Overrides {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            ENV_INST_RATIO => self.inst_ratio.map(|ratio| ratio.to_string()),
            ENV_INST_SEED => self.seed.map(|seed| seed.to_string()),
            ENV_EI_INTERCEPT => self.intercepted_fn.clone(),
            ENV_QUIET if self.quiet => Some("1".to_string()),
            ENV_DEBUG if self.debug => Some("1".to_string()),
            _ => None,
        }
    }

    /// A lookup answering from these overrides first, then from `lookup`.
    pub fn over(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> impl Fn(&str) -> Option<String> {
        move |key| self.get(key).or_else(|| lookup(key))
    }
}

/// Parses an instrumentation ratio: a whole percentage between 1 and 100.
pub fn parse_inst_ratio(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(ratio) => check_inst_ratio(ratio),
        Err(_) => bail!("Bad value of {ENV_INST_RATIO} (must be between 1 and 100)"),
    }
}

pub(crate) fn check_inst_ratio(ratio: u32) -> Result<u32> {
    if !(1..=100).contains(&ratio) {
        bail!("Bad value of {ENV_INST_RATIO} (must be between 1 and 100)");
    }
    Ok(ratio)
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: InstrumentationConfig,
}

impl ConfigBuilder {
    pub fn inst_ratio(mut self, ratio: u32) -> Self {
        self.config.inst_ratio = ratio;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn intercepted_fn(mut self, name: impl Into<String>) -> Self {
        self.config.intercepted_fn = name.into();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<InstrumentationConfig> {
        check_inst_ratio(self.config.inst_ratio)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<InstrumentationConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        InstrumentationConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config, InstrumentationConfig::default());
        assert_eq!(config.inst_ratio(), 100);
        assert_eq!(config.intercepted_fn(), "fread");
        assert_eq!(config.mode().to_string(), "non-hardened");
    }

    #[test]
    fn bad_ratios_are_fatal() {
        for bad in ["0", "101", "abc", "", "-5", "50%"] {
            let err = from_vars(&[("AFL_INST_RATIO", bad)]).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Bad value of AFL_INST_RATIO (must be between 1 and 100)",
                "ratio {bad:?}"
            );
        }
        assert!(InstrumentationConfig::builder().inst_ratio(0).build().is_err());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_vars(&[
            ("AFL_INST_RATIO", " 25 "),
            ("AFL_INST_SEED", "1234"),
            ("AFL_EI_INTERCEPT", "fgets"),
            ("AFL_QUIET", "1"),
            ("AFL_USE_MSAN", "1"),
            ("AFL_DEBUG", "1"),
        ])
        .unwrap();
        assert_eq!(config.inst_ratio(), 25);
        assert_eq!(config.seed(), Some(1234));
        assert_eq!(config.intercepted_fn(), "fgets");
        assert!(config.quiet());
        assert!(config.debug());
        assert_eq!(config.mode(), Mode::Sanitized);
    }

    #[test]
    fn harden_wins_over_sanitizers() {
        let config = from_vars(&[("AFL_HARDEN", "1"), ("AFL_USE_ASAN", "1")]).unwrap();
        assert_eq!(config.mode().to_string(), "hardened");
    }

    #[test]
    fn flags_replace_bad_environment_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([("AFL_INST_RATIO", "abc"), ("AFL_INST_SEED", "soon")]);
        let overrides = Overrides {
            inst_ratio: Some(50),
            seed: Some(7),
            quiet: true,
            ..Overrides::default()
        };
        let config = InstrumentationConfig::from_lookup(
            overrides.over(|key| env.get(key).map(|value| value.to_string())),
        )
        .unwrap();
        assert_eq!(config.inst_ratio(), 50);
        assert_eq!(config.seed(), Some(7));
        assert!(config.quiet());
        assert!(!config.debug());

        // Without the flag the environment value is still rejected.
        let err = InstrumentationConfig::from_lookup(
            Overrides::default().over(|key| env.get(key).map(|value| value.to_string())),
        )
        .unwrap_err();
        assert!(err.to_string().contains("AFL_INST_RATIO"));
    }

    #[test]
    fn bad_seed_is_fatal() {
        assert!(from_vars(&[("AFL_INST_SEED", "soon")]).is_err());
    }
}
