//! This module defines constants used throughout the instrumentation passes.
//! These constants are related to AFL-style coverage, the execution indexing
//! runtime, and the environment variables that configure both.

/// log2 of the coverage map size.
pub const AFL_MAP_SIZE_POW2: u32 = 16;

/// The size of the shared memory map used for AFL-style coverage tracking.
/// This value (2^16) is standard for AFL. Edge and call-site identifiers are
/// drawn from `0..AFL_COVERAGE_MAP_SIZE`.
pub const AFL_COVERAGE_MAP_SIZE: u32 = 1 << AFL_MAP_SIZE_POW2;

/// External pointer to the base of the coverage map, set up by the runtime.
pub const AFL_AREA_PTR: &str = "__afl_area_ptr";

/// External thread-local cell holding the previous location (`edge_id >> 1`).
pub const AFL_PREV_LOC: &str = "__afl_prev_loc";

/// Runtime entry point called before every call site: `(i32 site_id, ptr callee_name)`.
pub const EI_PUSH_CALL: &str = "__afl_ei_push_call";

/// Runtime entry point called after every call site.
pub const EI_POP_RETURN: &str = "__afl_ei_pop_return";

/// Prefix of the wrapper substituted for the intercepted library function.
pub const EI_WRAPPER_PREFIX: &str = "__afl_ei_";

/// The library function whose calls are redirected through a wrapper by default.
pub const DEFAULT_INTERCEPTED_FN: &str = "fread";

/// Default percentage of basic blocks to instrument.
pub const DEFAULT_INST_RATIO: u32 = 100;

pub const ENV_INST_RATIO: &str = "AFL_INST_RATIO";
pub const ENV_QUIET: &str = "AFL_QUIET";
pub const ENV_HARDEN: &str = "AFL_HARDEN";
pub const ENV_USE_ASAN: &str = "AFL_USE_ASAN";
pub const ENV_USE_MSAN: &str = "AFL_USE_MSAN";
pub const ENV_INST_SEED: &str = "AFL_INST_SEED";
pub const ENV_EI_INTERCEPT: &str = "AFL_EI_INTERCEPT";
pub const ENV_DEBUG: &str = "AFL_DEBUG";
