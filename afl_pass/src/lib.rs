//! AFL compile-time instrumentation for SSA modules.
//!
//! Two passes rewrite a module before code generation:
//!
//! - [`instrumentation::AflCoverage`] adds edge coverage: every selected basic
//!   block updates a shared 64 KiB map indexed by `previous ^ current`.
//! - [`execution_indexing::ExecutionIndexing`] brackets every call with
//!   `__afl_ei_push_call` / `__afl_ei_pop_return` and routes calls to the
//!   input function (`fread` by default) through `__afl_ei_fread`, so the
//!   runtime knows the call context in which input bytes were read.
//!
//! ## Getting Started
//!
//! [`pipeline::instrument_module`] runs the passes registered for an
//! optimisation level and checks the result:
//!
//! ```no_run
//! use afl_pass::config::InstrumentationConfig;
//! use afl_pass::pipeline::instrument_module;
//! use afl_pass::util::{read_module, write_module};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = InstrumentationConfig::from_env()?;
//!     let log = afl_pass::log::logger(&config);
//!
//!     let mut module = read_module(Path::new("target.ll"))?;
//!     let summary = instrument_module(&mut module, &config, 2, &log)?;
//!     println!("{} blocks instrumented", summary.instrumented_blocks);
//!
//!     write_module(&module, Some(Path::new("target.afl.ll")))
//! }
//! ```
//!
//! Modules use a small LLVM-like textual form, see [`ir::parse_module`].
pub mod config;
pub mod execution_indexing;
pub mod id_generator;
pub mod instrumentation;
pub mod ir;
pub mod log;
pub mod pipeline;
pub mod util;

mod constants;

pub use constants::{
    AFL_AREA_PTR, AFL_COVERAGE_MAP_SIZE, AFL_PREV_LOC, EI_POP_RETURN, EI_PUSH_CALL,
    EI_WRAPPER_PREFIX,
};
