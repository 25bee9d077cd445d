//! Execution indexing: bracketing every call site with runtime notifications so
//! the fuzzer can tell *where in the call tree* an input was consumed.
//!
//! For each call instruction the pass:
//! 1.  Draws a random call-site id.
//! 2.  Inserts `__afl_ei_push_call(site, callee_name)` right before the call.
//!     `callee_name` is a NUL-terminated string constant, or `null` for
//!     indirect calls and unnamed callees.
//! 3.  If the callee is the intercepted input function (`fread` by default),
//!     replaces the call with an identical call to `__afl_ei_<name>` and points
//!     every user of the old result at the new one.
//! 4.  Inserts `__afl_ei_pop_return()` right after the call.
//!
//! Only the fall-through path is bracketed: a callee that unwinds or
//! long-jumps leaves its push unmatched.

use std::collections::HashMap;

use anyhow::{Context, Result};
use slog::{Logger, debug, info};

use crate::config::InstrumentationConfig;
use crate::constants::{EI_POP_RETURN, EI_PUSH_CALL, EI_WRAPPER_PREFIX};
use crate::id_generator::IdGenerator;
use crate::ir::{
    Arg, Callee, FuncCursor, FuncType, FunctionId, GlobalId, InstKind, Instruction, Module,
    Operand, Type,
};
use crate::pipeline::{ModulePass, Summary};

/// What one run of the pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EiStats {
    /// Calls bracketed by a push/pop pair.
    pub call_sites: usize,
    /// Calls redirected to the wrapper.
    pub rewritten_calls: usize,
}

pub struct ExecutionIndexing {
    intercepted_fn: String,
    ids: IdGenerator,
}

/// The runtime hooks, resolved once per module.
struct EiHooks {
    push: FunctionId,
    pop: FunctionId,
    /// `(intercepted, wrapper)` when the module references the intercepted function.
    intercept: Option<(FunctionId, FunctionId)>,
    /// Name strings of every directly called named function.
    names: HashMap<FunctionId, GlobalId>,
}

impl ExecutionIndexing {
    pub fn new(intercepted_fn: impl Into<String>, ids: IdGenerator) -> Self {
        Self {
            intercepted_fn: intercepted_fn.into(),
            ids,
        }
    }

    /// The pass as configured for a run. With a fixed seed the call-site ids
    /// are derived from it, but drawn independently of the edge ids.
    pub fn from_config(config: &InstrumentationConfig) -> Self {
        let ids = match config.seed() {
            Some(seed) => IdGenerator::seeded(seed.rotate_left(32) ^ 0x5eed),
            None => IdGenerator::from_entropy(),
        };
        Self::new(config.intercepted_fn(), ids)
    }

    pub fn intercepted_fn(&self) -> &str {
        &self.intercepted_fn
    }

    pub fn instrument(&mut self, module: &mut Module, log: &Logger) -> Result<EiStats> {
        let hooks = self
            .declare_hooks(module)
            .context("Failed to declare the execution indexing runtime")?;

        let mut stats = EiStats::default();
        for function_id in module.function_ids() {
            let symbol = module.function_symbol(function_id);
            let function = module.function_mut(function_id);
            let before = stats;

            for block in function.block_ids() {
                let mut cursor = FuncCursor::at_block_start(function, block);
                bracket_calls(&mut cursor, &hooks, &mut self.ids, &mut stats)
                    .with_context(|| format!("Failed to index calls in @{symbol}"))?;
            }

            if stats != before {
                debug!(
                    log,
                    "@{}: bracketed {} call sites, rewrote {}",
                    symbol,
                    stats.call_sites - before.call_sites,
                    stats.rewritten_calls - before.rewritten_calls
                );
            }
        }

        info!(
            log,
            "Indexed {} call sites ({} calls to {} intercepted).",
            stats.call_sites,
            stats.rewritten_calls,
            self.intercepted_fn
        );
        Ok(stats)
    }

    /// Declares the push/pop hooks, the wrapper when the intercepted function is
    /// present, and the name strings the push calls will pass.
    fn declare_hooks(&self, module: &mut Module) -> Result<EiHooks> {
        let push = module.get_or_declare_function(
            EI_PUSH_CALL,
            &FuncType::new(Type::Void, vec![Type::I32, Type::Ptr]),
        )?;
        let pop =
            module.get_or_declare_function(EI_POP_RETURN, &FuncType::new(Type::Void, vec![]))?;

        let intercept = match module.get_function(&self.intercepted_fn) {
            Some(target) => {
                let ty = module.function(target).ty.clone();
                let wrapper_name = format!("{EI_WRAPPER_PREFIX}{}", self.intercepted_fn);
                let wrapper = module.get_or_declare_function(&wrapper_name, &ty)?;
                Some((target, wrapper))
            }
            None => None,
        };

        let mut callees: Vec<FunctionId> = module
            .calls()
            .filter_map(|inst| match &inst.kind {
                InstKind::Call {
                    callee: Callee::Direct(id),
                    ..
                } => Some(*id),
                _ => None,
            })
            .collect();
        callees.sort();
        callees.dedup();

        let mut names = HashMap::new();
        for callee in callees {
            if let Some(name) = module.function(callee).name.clone().filter(|n| !n.is_empty()) {
                names.insert(callee, module.global_string(&name));
            }
        }

        Ok(EiHooks {
            push,
            pop,
            intercept,
            names,
        })
    }
}

impl ModulePass for ExecutionIndexing {
    fn name(&self) -> &'static str {
        "execution-indexing"
    }

    fn run(&mut self, module: &mut Module, log: &Logger) -> Result<Summary> {
        let stats = self.instrument(module, log)?;
        Ok(Summary {
            call_sites: stats.call_sites,
            rewritten_calls: stats.rewritten_calls,
            ..Summary::default()
        })
    }
}

/// Walks one block with the cursor, bracketing each original call. Inserted
/// calls land before the cursor, so they are never visited themselves.
fn bracket_calls(
    cursor: &mut FuncCursor<'_>,
    hooks: &EiHooks,
    ids: &mut IdGenerator,
    stats: &mut EiStats,
) -> Result<()> {
    while let Some(inst) = cursor.current() {
        let InstKind::Call { ret, callee, args } = &inst.kind else {
            cursor.advance();
            continue;
        };

        let name = match callee {
            Callee::Direct(id) => hooks.names.get(id).map(|g| Operand::Global(*g)),
            Callee::Indirect(_) => None,
        };
        let wrapper = match (callee, hooks.intercept) {
            (Callee::Direct(id), Some((target, wrapper))) if *id == target => Some(wrapper),
            _ => None,
        };
        let replacement = wrapper.map(|wrapper| {
            (
                inst.result,
                Instruction::call(ret.clone(), Callee::Direct(wrapper), args.clone()),
            )
        });

        let site = ids.location();
        cursor.insert(push_call(hooks.push, site, name))?;

        match replacement {
            Some((old_result, wrapper_call)) => {
                let new_result = cursor.insert(wrapper_call)?;
                cursor.remove();
                if let (Some(old), Some(new)) = (old_result, new_result) {
                    cursor.func.replace_all_uses_with(old, &Operand::Value(new));
                }
                stats.rewritten_calls += 1;
            }
            None => cursor.advance(),
        }

        cursor.insert(Instruction::call(
            Type::Void,
            Callee::Direct(hooks.pop),
            Vec::new(),
        ))?;
        stats.call_sites += 1;
    }
    Ok(())
}

fn push_call(push: FunctionId, site: u32, name: Option<Operand>) -> Instruction {
    Instruction::call(
        Type::Void,
        Callee::Direct(push),
        vec![
            Arg::new(Type::I32, Operand::Const(i64::from(site))),
            Arg::new(Type::Ptr, name.unwrap_or(Operand::Null)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AFL_COVERAGE_MAP_SIZE;
    use crate::ir::{GlobalInit, parse_module, verify_module};
    use crate::log::discard;
    use assert_matches::assert_matches;

    const READER: &str = "; module reader

@table = global ptr null

declare i64 @fread(ptr, i64, i64, ptr)

declare void @log_bytes(i64)

define i64 @read_all(ptr %0, ptr %1) {
entry:
  %2 = call i64 @fread(ptr %0, i64 1, i64 64, ptr %1)
  call void @log_bytes(i64 %2)
  %3 = load ptr, ptr @table
  call void %3(i64 %2)
  ret i64 %2
}
";

    fn run(text: &str) -> (Module, EiStats) {
        let mut module = parse_module(text).unwrap();
        let stats = ExecutionIndexing::new("fread", IdGenerator::seeded(8))
            .instrument(&mut module, &discard())
            .unwrap();
        verify_module(&module).unwrap();
        (module, stats)
    }

    fn callee_symbol(module: &Module, inst: &Instruction) -> Option<String> {
        match &inst.kind {
            InstKind::Call {
                callee: Callee::Direct(id),
                ..
            } => Some(module.function_symbol(*id)),
            InstKind::Call { .. } => Some("<indirect>".to_string()),
            _ => None,
        }
    }

    #[test]
    fn every_call_is_bracketed() {
        let (module, stats) = run(READER);
        assert_eq!(
            stats,
            EiStats {
                call_sites: 3,
                rewritten_calls: 1
            }
        );

        let read_all = module.function(module.get_function("read_all").unwrap());
        let calls: Vec<String> = read_all
            .instructions()
            .filter_map(|inst| callee_symbol(&module, inst))
            .collect();
        assert_eq!(
            calls,
            [
                EI_PUSH_CALL,
                "__afl_ei_fread",
                EI_POP_RETURN,
                EI_PUSH_CALL,
                "log_bytes",
                EI_POP_RETURN,
                EI_PUSH_CALL,
                "<indirect>",
                EI_POP_RETURN,
            ]
        );
    }

    #[test]
    fn intercepted_result_flows_from_wrapper() {
        let (module, _) = run(READER);
        let fread = module.get_function("fread").unwrap();
        let wrapper = module.get_function("__afl_ei_fread").unwrap();
        assert_eq!(module.calls_to(fread), 0);
        assert_eq!(module.calls_to(wrapper), 1);
        assert_eq!(module.function(wrapper).ty, module.function(fread).ty);

        let read_all = module.function(module.get_function("read_all").unwrap());
        let wrapper_call = read_all
            .instructions()
            .find(|inst| {
                matches!(&inst.kind, InstKind::Call { callee: Callee::Direct(id), .. } if *id == wrapper)
            })
            .unwrap();
        let result = wrapper_call.result.unwrap();
        // log_bytes argument, indirect call argument and the return.
        assert_eq!(read_all.count_uses(result), 3);
        assert_eq!(read_all.count_uses(crate::ir::ValueId(2)), 0);
        assert_matches!(
            &wrapper_call.kind,
            InstKind::Call { args, .. } if args.len() == 4 && args[0].value == Operand::Value(crate::ir::ValueId(0))
        );
    }

    #[test]
    fn push_names_callee_or_null() {
        let (module, _) = run(READER);
        let push = module.get_function(EI_PUSH_CALL).unwrap();
        let names: Vec<Option<Vec<u8>>> = module
            .calls()
            .filter_map(|inst| match &inst.kind {
                InstKind::Call {
                    callee: Callee::Direct(id),
                    args,
                    ..
                } if *id == push => Some(args),
                _ => None,
            })
            .map(|args| {
                assert_matches!(args[0].value, Operand::Const(site) if (0..i64::from(AFL_COVERAGE_MAP_SIZE)).contains(&site));
                match args[1].value {
                    Operand::Global(id) => match &module.global(id).init {
                        Some(GlobalInit::Bytes(bytes)) => Some(bytes.clone()),
                        _ => None,
                    },
                    _ => None,
                }
            })
            .collect();
        assert_eq!(
            names,
            vec![Some(b"fread\0".to_vec()), Some(b"log_bytes\0".to_vec()), None]
        );
    }

    #[test]
    fn module_without_calls_gains_only_declarations() {
        let text = "define i32 @id(i32 %0) {\nentry:\n  ret i32 %0\n}\n";
        let (module, stats) = run(text);
        assert_eq!(stats, EiStats::default());
        assert_eq!(module.functions[0], parse_module(text).unwrap().functions[0]);
        assert!(module.get_function("__afl_ei_fread").is_none());
        assert!(module.globals.is_empty());
    }

    #[test]
    fn void_intercepted_call_is_rewritten() {
        let text = "declare void @fread()\n\ndefine void @f() {\nentry:\n  call void @fread()\n  call void @fread()\n  ret void\n}\n";
        let (module, stats) = run(text);
        assert_eq!(stats.rewritten_calls, 2);
        assert_eq!(module.calls_to(module.get_function("fread").unwrap()), 0);
        assert_eq!(module.functions[1].blocks[0].instructions.len(), 6);
    }

    #[test]
    fn custom_intercepted_function() {
        let text = "declare ptr @fgets(ptr, i32, ptr)\n\ndefine ptr @f(ptr %0, ptr %1) {\nentry:\n  %2 = call ptr @fgets(ptr %0, i32 8, ptr %1)\n  ret ptr %2\n}\n";
        let mut module = parse_module(text).unwrap();
        let stats = ExecutionIndexing::new("fgets", IdGenerator::seeded(1))
            .instrument(&mut module, &discard())
            .unwrap();
        assert_eq!(stats.rewritten_calls, 1);
        let wrapper = module.get_function("__afl_ei_fgets").unwrap();
        assert_matches!(
            module.functions[1].blocks[0].terminator,
            crate::ir::Terminator::Ret(Some((Type::Ptr, Operand::Value(v)))) if v != crate::ir::ValueId(2)
        );
        assert_eq!(module.calls_to(wrapper), 1);
    }

    #[test]
    fn exhausted_value_numbers_are_an_error() {
        let text = "declare i64 @fread(ptr, i64, i64, ptr)\n\n\
                    define i64 @f(ptr %0) {\nentry:\n  \
                    %4294967294 = call i64 @fread(ptr %0, i64 1, i64 1, ptr null)\n  \
                    ret i64 %4294967294\n}\n";
        let mut module = parse_module(text).unwrap();
        let err = ExecutionIndexing::new("fread", IdGenerator::seeded(1))
            .instrument(&mut module, &discard())
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to index calls in @f"));
    }

    #[test]
    fn conflicting_hook_declaration_is_an_error() {
        let mut module = parse_module("declare i32 @__afl_ei_pop_return()\n").unwrap();
        let err = ExecutionIndexing::new("fread", IdGenerator::seeded(1))
            .instrument(&mut module, &discard())
            .unwrap_err();
        assert!(format!("{err:#}").contains("__afl_ei_pop_return"));
    }
}
