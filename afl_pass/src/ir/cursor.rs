//! In-place editing of a function's instruction stream.
//!
//! A [`FuncCursor`] rests on one instruction of one block (or past the last
//! instruction, before the terminator). Its contract:
//!
//! * [`FuncCursor::insert`] places new code *before* the current instruction;
//!   the cursor keeps resting on the same instruction.
//! * [`FuncCursor::remove`] deletes the current instruction; the cursor then
//!   rests on the next surviving instruction, so nothing is skipped and
//!   nothing is visited twice.
//! * [`FuncCursor::advance`] moves to the next instruction.

use anyhow::Result;

use crate::ir::instruction::{
    Arg, BinOp, BlockId, Callee, InstKind, Instruction, Operand, ValueId,
};
use crate::ir::module::Function;
use crate::ir::types::Type;

pub struct FuncCursor<'f> {
    pub func: &'f mut Function,
    block: BlockId,
    pos: usize,
}

impl<'f> FuncCursor<'f> {
    /// A cursor on the first instruction of `block`.
    pub fn at_block_start(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block, pos: 0 }
    }

    /// A cursor on the first instruction of `block` that is not a phi.
    pub fn at_first_insertion_point(func: &'f mut Function, block: BlockId) -> Self {
        let pos = func.block(block).first_insertion_point();
        Self { func, block, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// The instruction the cursor rests on, `None` once past the end.
    pub fn current(&self) -> Option<&Instruction> {
        self.func.block(self.block).instructions.get(self.pos)
    }

    pub fn advance(&mut self) {
        if self.pos < self.func.block(self.block).instructions.len() {
            self.pos += 1;
        }
    }

    /// Inserts `inst` before the current instruction. Instructions producing a
    /// value get a fresh SSA number unless one was already assigned.
    pub fn insert(&mut self, mut inst: Instruction) -> Result<Option<ValueId>> {
        if inst.result.is_none() && !inst.kind.result_type().is_void() {
            inst.result = Some(self.func.fresh_value()?);
        }
        let result = inst.result;
        let pos = self.pos;
        self.func.block_mut(self.block).instructions.insert(pos, inst);
        self.pos += 1;
        Ok(result)
    }

    /// Like [`FuncCursor::insert`], for instructions known to produce a value.
    pub fn insert_value(&mut self, mut inst: Instruction) -> Result<ValueId> {
        let value = match inst.result {
            Some(value) => value,
            None => self.func.fresh_value()?,
        };
        inst.result = Some(value);
        self.insert(inst)?;
        Ok(value)
    }

    /// Removes the current instruction and returns it. The cursor now rests on
    /// the instruction that followed it.
    pub fn remove(&mut self) -> Option<Instruction> {
        let instructions = &mut self.func.block_mut(self.block).instructions;
        if self.pos < instructions.len() {
            Some(instructions.remove(self.pos))
        } else {
            None
        }
    }
}

impl Instruction {
    pub fn load(ty: Type, ptr: impl Into<Operand>) -> Self {
        Self::new(None, InstKind::Load { ty, ptr: ptr.into() })
    }

    pub fn store(ty: Type, value: impl Into<Operand>, ptr: impl Into<Operand>) -> Self {
        Self::new(
            None,
            InstKind::Store {
                ty,
                value: value.into(),
                ptr: ptr.into(),
            },
        )
    }

    pub fn binary(op: BinOp, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Self::new(
            None,
            InstKind::Binary {
                op,
                ty,
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
        )
    }

    pub fn gep(base: impl Into<Operand>, index_ty: Type, index: impl Into<Operand>) -> Self {
        Self::new(
            None,
            InstKind::Gep {
                base: base.into(),
                index_ty,
                index: index.into(),
            },
        )
    }

    pub fn call(ret: Type, callee: Callee, args: Vec<Arg>) -> Self {
        Self::new(None, InstKind::Call { ret, callee, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

use crate::ir::instruction::{FunctionId, Metadata, Terminator};
    use crate::ir::types::FuncType;

    fn call_to(target: u32) -> Instruction {
        Instruction::call(Type::Void, Callee::Direct(FunctionId(target)), Vec::new())
    }

    fn function_with_calls(n: u32) -> Function {
        let mut function = Function::new(Some("f".to_string()), FuncType::new(Type::Void, vec![]));
        let entry = function.add_block("entry");
        for target in 0..n {
            function.block_mut(entry).instructions.push(call_to(target));
        }
        function.block_mut(entry).terminator = Terminator::Ret(None);
        function
    }

    fn targets(function: &Function) -> Vec<u32> {
        function
            .instructions()
            .map(|inst| match &inst.kind {
                InstKind::Call {
                    callee: Callee::Direct(id),
                    ..
                } => id.0,
                _ => u32::MAX,
            })
            .collect()
    }

    #[test]
    fn remove_rests_on_next_survivor() {
        let mut function = function_with_calls(4);
        let mut cursor = FuncCursor::at_block_start(&mut function, BlockId(0));
        let mut visited = Vec::new();
        while let Some(inst) = cursor.current() {
            let InstKind::Call {
                callee: Callee::Direct(id),
                ..
            } = &inst.kind
            else {
                unreachable!()
            };
            visited.push(id.0);
            if id.0 % 2 == 1 {
                cursor.remove();
            } else {
                cursor.advance();
            }
        }
        assert_eq!(visited, vec![0, 1, 2, 3]);
        assert_eq!(targets(&function), vec![0, 2]);
    }

    #[test]
    fn insert_keeps_cursor_on_current() {
        let mut function = function_with_calls(2);
        let mut cursor = FuncCursor::at_block_start(&mut function, BlockId(0));
        cursor.advance();
        cursor.insert(call_to(9)).unwrap();
        assert_eq!(cursor.position(), 2);
        cursor.advance();
        cursor.insert(call_to(8)).unwrap();
        assert!(cursor.current().is_none());
        assert_eq!(targets(&function), vec![0, 9, 1, 8]);
    }

    #[test]
    fn insert_assigns_fresh_values() {
        let mut function = Function::new(
            Some("f".to_string()),
            FuncType::new(Type::Void, vec![Type::Ptr]),
        );
        function.add_block("entry");
        let mut cursor = FuncCursor::at_block_start(&mut function, BlockId(0));
        let loaded = cursor
            .insert_value(Instruction::load(Type::I32, ValueId(0)))
            .unwrap();
        let stored = cursor
            .insert(Instruction::store(Type::I32, loaded, ValueId(0)))
            .unwrap();
        assert_eq!(loaded, ValueId(1));
        assert_eq!(stored, None);
        assert_eq!(function.instructions().next().map(|i| i.metadata), Some(Metadata::default()));
    }

    #[test]
    fn insert_fails_when_values_run_out() {
        let mut function = function_with_calls(1);
        function.reserve_value(ValueId(u32::MAX - 2)).unwrap();
        let mut cursor = FuncCursor::at_block_start(&mut function, BlockId(0));
        cursor
            .insert_value(Instruction::load(Type::I32, ValueId(0)))
            .unwrap();
        assert!(
            cursor
                .insert_value(Instruction::load(Type::I32, ValueId(0)))
                .is_err()
        );
        assert_eq!(cursor.position(), 1);
        assert_eq!(function.blocks[0].instructions.len(), 2);
    }
}
