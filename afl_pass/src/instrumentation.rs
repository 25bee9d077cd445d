//! This module provides AFL-style edge coverage instrumentation for IR modules.
//!
//! The goal is to inject code that tracks execution paths through the control
//! flow graph. This is achieved by:
//! 1.  Declaring the external runtime state: the coverage map base pointer and
//!     the thread-local previous location.
//! 2.  Picking a random location id for every selected basic block.
//! 3.  Inserting, at the first insertion point of the block, the inline sequence
//!     that bumps the map byte for the `(previous, current)` edge and records
//!     the current location for the next block.
//!
//! The map update is deliberately unsynchronised: concurrent threads may lose
//! increments, and counters wrap at 256.

use anyhow::{Context, Result};
use slog::{Logger, debug, info, warn};

use crate::config::{InstrumentationConfig, Mode, check_inst_ratio};
use crate::constants::{AFL_AREA_PTR, AFL_PREV_LOC};
use crate::id_generator::IdGenerator;
use crate::ir::{BinOp, FuncCursor, GlobalId, Instruction, Module, Operand, Type};
use crate::pipeline::{ModulePass, Summary};

/// The edge coverage pass.
pub struct AflCoverage {
    inst_ratio: u32,
    mode: Mode,
    ids: IdGenerator,
}

impl AflCoverage {
    /// Creates the pass. `inst_ratio` is the percentage of blocks to instrument
    /// and is checked when the pass runs.
    pub fn new(inst_ratio: u32, ids: IdGenerator) -> Self {
        Self {
            inst_ratio,
            mode: Mode::default(),
            ids,
        }
    }

    pub fn from_config(config: &InstrumentationConfig) -> Self {
        let ids = match config.seed() {
            Some(seed) => IdGenerator::seeded(seed),
            None => IdGenerator::from_entropy(),
        };
        Self::new(config.inst_ratio(), ids).with_mode(config.mode())
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Instruments `module` and returns the number of instrumented blocks.
    ///
    /// An invalid ratio is reported before the module is touched.
    pub fn instrument(&mut self, module: &mut Module, log: &Logger) -> Result<usize> {
        let inst_ratio = check_inst_ratio(self.inst_ratio)?;
        debug!(log, "The seed used for instrumentation is {}", self.ids.seed());

        let globals = inject_globals(module)?;
        debug!(
            log,
            "Declared globals: @{AFL_AREA_PTR} #{}, @{AFL_PREV_LOC} #{}",
            globals.area_ptr.0,
            globals.prev_loc.0
        );

        let inst_blocks = instrument_blocks(module, &globals, inst_ratio, &mut self.ids, log)?;

        if inst_blocks == 0 {
            warn!(log, "No instrumentation targets found.");
        } else {
            info!(
                log,
                "Instrumented {} locations ({} mode, ratio {}%).",
                inst_blocks,
                self.mode,
                inst_ratio
            );
        }
        Ok(inst_blocks)
    }
}

impl ModulePass for AflCoverage {
    fn name(&self) -> &'static str {
        "afl-coverage"
    }

    fn run(&mut self, module: &mut Module, log: &Logger) -> Result<Summary> {
        let instrumented_blocks = self.instrument(module, log)?;
        Ok(Summary {
            instrumented_blocks,
            ..Summary::default()
        })
    }
}

/// The external state every instrumented block reads and writes.
struct AflGlobals {
    area_ptr: GlobalId,
    prev_loc: GlobalId,
}

/// Declares, unless already present:
///
/// - `__afl_area_ptr`: an external pointer to the coverage map.
/// - `__afl_prev_loc`: an external thread-local i32 holding the previous
///   location shifted right by one. It must be per-thread, or edges from
///   different threads would be mixed into each other.
fn inject_globals(module: &mut Module) -> Result<AflGlobals> {
    let area_ptr = module.get_or_insert_global(AFL_AREA_PTR, Type::Ptr, false)?;
    let prev_loc = module.get_or_insert_global(AFL_PREV_LOC, Type::I32, true)?;
    Ok(AflGlobals { area_ptr, prev_loc })
}

/// Visits every block of every defined function, sampling each one
/// independently against `inst_ratio`. A skipped block consumes no location id.
fn instrument_blocks(
    module: &mut Module,
    globals: &AflGlobals,
    inst_ratio: u32,
    ids: &mut IdGenerator,
    log: &Logger,
) -> Result<usize> {
    let mut inst_blocks = 0;

    for function_id in module.function_ids() {
        let symbol = module.function_symbol(function_id);
        let function = module.function_mut(function_id);
        let mut in_function = 0;

        for block in function.block_ids() {
            if !ids.sample(inst_ratio) {
                continue;
            }
            let cur_loc = ids.location();
            let mut cursor = FuncCursor::at_first_insertion_point(function, block);
            afl_instrumentation_slice(&mut cursor, globals, cur_loc)
                .with_context(|| format!("Failed to instrument a block of @{symbol}"))?;
            in_function += 1;
        }

        if !function.is_declaration() {
            debug!(
                log,
                "@{}: instrumented {} of {} blocks",
                symbol,
                in_function,
                function.blocks.len()
            );
        }
        inst_blocks += in_function;
    }

    Ok(inst_blocks)
}

/// Emits the coverage update for one block at the cursor:
/// ```text
///   prev = __afl_prev_loc;
///   __afl_area_ptr[prev ^ cur_loc]++;
///   __afl_prev_loc = cur_loc >> 1;
/// ```
/// Shifting the stored location keeps `A -> B` and `B -> A` in different map
/// cells. Every memory access is tagged `!nosanitize` so sanitizers applied
/// later leave it alone.
fn afl_instrumentation_slice(
    cursor: &mut FuncCursor<'_>,
    globals: &AflGlobals,
    cur_loc: u32,
) -> Result<()> {
    let cur_loc_const = Operand::Const(i64::from(cur_loc));

    let prev_loc = cursor.insert_value(
        Instruction::load(Type::I32, Operand::Global(globals.prev_loc)).with_nosanitize(),
    )?;
    let map_ptr = cursor.insert_value(
        Instruction::load(Type::Ptr, Operand::Global(globals.area_ptr)).with_nosanitize(),
    )?;
    let index = cursor.insert_value(Instruction::binary(
        BinOp::Xor,
        Type::I32,
        prev_loc,
        cur_loc_const,
    ))?;
    let slot = cursor.insert_value(Instruction::gep(map_ptr, Type::I32, index))?;
    let counter = cursor.insert_value(Instruction::load(Type::I8, slot).with_nosanitize())?;
    let incremented = cursor.insert_value(Instruction::binary(
        BinOp::Add,
        Type::I8,
        counter,
        Operand::Const(1),
    ))?;
    cursor.insert(Instruction::store(Type::I8, incremented, slot).with_nosanitize())?;
    cursor.insert(
        Instruction::store(
            Type::I32,
            Operand::Const(i64::from(cur_loc >> 1)),
            Operand::Global(globals.prev_loc),
        )
        .with_nosanitize(),
    )?;
    Ok(())
}
