//! Structural checks run on a module after it has been transformed.

use std::collections::HashSet;

use anyhow::{Result, bail, ensure};

use crate::ir::instruction::{BlockId, Callee, InstKind, Operand, ValueId};
use crate::ir::module::{Function, Module};

/// Verifies that `module` is well formed:
///
/// - every SSA value is defined exactly once and every used value is defined,
/// - globals, functions and blocks referenced by operands exist,
/// - direct calls match the arity, parameter and return types of their target,
/// - phi nodes only appear at the top of a block.
pub fn verify_module(module: &Module) -> Result<()> {
    for id in module.function_ids() {
        let function = module.function(id);
        if function.is_declaration() {
            continue;
        }
        verify_function(module, function)
            .map_err(|err| err.context(format!("in function @{}", module.function_symbol(id))))?;
    }
    Ok(())
}

fn verify_function(module: &Module, function: &Function) -> Result<()> {
    let mut defined: HashSet<ValueId> = function.params().collect();
    for inst in function.instructions() {
        if let Some(result) = inst.result {
            ensure!(defined.insert(result), "value %{} is defined twice", result.0);
        }
    }

    let check_operand = |op: &Operand| -> Result<()> {
        match op {
            Operand::Value(value) => {
                ensure!(defined.contains(value), "use of undefined value %{}", value.0)
            }
            Operand::Global(id) => {
                ensure!((id.0 as usize) < module.globals.len(), "unknown global #{}", id.0)
            }
            Operand::Function(id) => ensure!(
                (id.0 as usize) < module.functions.len(),
                "unknown function #{}",
                id.0
            ),
            Operand::Const(_) | Operand::Null => {}
        }
        Ok(())
    };
    let check_block = |block: BlockId| -> Result<()> {
        ensure!(
            (block.0 as usize) < function.blocks.len(),
            "branch to unknown block #{}",
            block.0
        );
        Ok(())
    };

    for block in &function.blocks {
        let mut seen_non_phi = false;
        for inst in &block.instructions {
            let mut operand_error = None;
            inst.kind.for_each_operand(|op| {
                if operand_error.is_none() {
                    operand_error = check_operand(op).err();
                }
            });
            if let Some(err) = operand_error {
                return Err(err.context(format!("in block '{}'", block.label)));
            }

            match &inst.kind {
                InstKind::Phi { incoming, .. } => {
                    ensure!(
                        !seen_non_phi,
                        "phi after a non-phi instruction in block '{}'",
                        block.label
                    );
                    for (_, pred) in incoming {
                        check_block(*pred)?;
                    }
                }
                InstKind::Call {
                    ret,
                    callee: Callee::Direct(target),
                    args,
                } => {
                    seen_non_phi = true;
                    ensure!(
                        (target.0 as usize) < module.functions.len(),
                        "call to unknown function #{}",
                        target.0
                    );
                    let symbol = module.function_symbol(*target);
                    let ty = &module.function(*target).ty;
                    ensure!(
                        ty.accepts_arity(args.len()),
                        "call to @{symbol} passes {} arguments, its type is {ty}",
                        args.len()
                    );
                    for (index, (arg, param)) in args.iter().zip(&ty.params).enumerate() {
                        if arg.ty != *param {
                            bail!(
                                "argument {index} of call to @{symbol} is {}, expected {param}",
                                arg.ty
                            );
                        }
                    }
                    ensure!(
                        *ret == ty.ret,
                        "call to @{symbol} returns {ret}, its type is {ty}"
                    );
                }
                _ => seen_non_phi = true,
            }
        }

        let mut terminator_error = None;
        block.terminator.for_each_operand(|op| {
            if terminator_error.is_none() {
                terminator_error = check_operand(op).err();
            }
        });
        if let Some(err) = terminator_error {
            return Err(err.context(format!("in terminator of block '{}'", block.label)));
        }
        for successor in block.terminator.successors() {
            check_block(successor)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;

    #[test]
    fn accepts_a_well_formed_module() {
        let module = parse_module(
            "declare i32 @puts(ptr)\n\ndefine i32 @main(ptr %0) {\nentry:\n  %1 = call i32 @puts(ptr %0)\n  ret i32 %1\n}\n",
        )
        .unwrap();
        verify_module(&module).unwrap();
    }

    #[test]
    fn rejects_undefined_values() {
        let module =
            parse_module("define i32 @main() {\nentry:\n  %1 = add i32 %0, 1\n  ret i32 %1\n}\n")
                .unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(format!("{err:#}").contains("use of undefined value %0"));
    }

    #[test]
    fn rejects_arity_mismatch() {
        let module = parse_module(
            "declare i32 @puts(ptr)\n\ndefine void @main() {\nentry:\n  %0 = call i32 @puts(ptr null, i32 1)\n  ret void\n}\n",
        )
        .unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(format!("{err:#}").contains("passes 2 arguments"));
    }

    #[test]
    fn rejects_late_phi() {
        let module = parse_module(
            "define i32 @main(i32 %0) {\nentry:\n  br label %next\n\nnext:\n  %1 = add i32 %0, 1\n  %2 = phi i32 [ %0, %entry ]\n  ret i32 %2\n}\n",
        )
        .unwrap();
        assert!(verify_module(&module).is_err());
    }
}
