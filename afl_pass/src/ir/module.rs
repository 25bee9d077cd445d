//! Modules, globals, functions and basic blocks.

use anyhow::{Result, bail};

use crate::ir::instruction::{
    BlockId, Callee, FunctionId, GlobalId, InstKind, Instruction, Operand, Terminator, ValueId,
};
use crate::ir::types::{FuncType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Defined in this module and visible to the linker.
    Default,
    /// Defined in this module, invisible outside it.
    Private,
    /// Declared here, defined elsewhere.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalInit {
    Int(i64),
    Null,
    /// Raw bytes, used for string literals. The terminating NUL is part of the data.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub linkage: Linkage,
    pub thread_local: bool,
    pub constant: bool,
    pub init: Option<GlobalInit>,
}

impl Global {
    /// An external declaration resolved at link time.
    pub fn external(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage: Linkage::External,
            thread_local: false,
            constant: false,
            init: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.linkage == Linkage::External
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }

    /// Index of the first instruction new code may be placed before. Phi nodes
    /// must stay grouped at the top of the block, so this skips past them.
    pub fn first_insertion_point(&self) -> usize {
        self.instructions
            .iter()
            .position(|inst| !inst.kind.is_phi())
            .unwrap_or(self.instructions.len())
    }

    pub fn calls(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|inst| inst.kind.is_call())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// `None` for unnamed functions, which are addressed by index.
    pub name: Option<String>,
    pub ty: FuncType,
    pub blocks: Vec<BasicBlock>,
    next_value: u32,
}

impl Function {
    pub fn new(name: Option<String>, ty: FuncType) -> Self {
        let next_value = ty.params.len() as u32;
        Self {
            name,
            ty,
            blocks: Vec::new(),
            next_value,
        }
    }

    /// A function without a body.
    pub fn declare(name: impl Into<String>, ty: FuncType) -> Self {
        Self::new(Some(name.into()), ty)
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.is_empty())
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = ValueId> + use<> {
        (0..self.ty.params.len() as u32).map(ValueId)
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(label));
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + use<> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn find_block(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|block| block.label == label)
            .map(|index| BlockId(index as u32))
    }

    /// Allocates a new SSA value number. Fails once the number space is used up.
    pub fn fresh_value(&mut self) -> Result<ValueId> {
        let value = ValueId(self.next_value);
        let Some(next) = self.next_value.checked_add(1) else {
            bail!("function has run out of SSA value numbers");
        };
        self.next_value = next;
        Ok(value)
    }

    /// Marks `value` as taken so `fresh_value` never hands it out again.
    pub fn reserve_value(&mut self, value: ValueId) -> Result<()> {
        let Some(next) = value.0.checked_add(1) else {
            bail!("value %{} is out of range", value.0);
        };
        self.next_value = self.next_value.max(next);
        Ok(())
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    /// Rewrites every use of `old` to `new` and returns how many operands changed.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: &Operand) -> usize {
        let mut replaced = 0;
        let mut rewrite = |op: &mut Operand| {
            if op.as_value() == Some(old) {
                *op = new.clone();
                replaced += 1;
            }
        };
        for block in &mut self.blocks {
            for inst in &mut block.instructions {
                inst.kind.for_each_operand_mut(&mut rewrite);
            }
            block.terminator.for_each_operand_mut(&mut rewrite);
        }
        replaced
    }

    pub fn count_uses(&self, value: ValueId) -> usize {
        let mut uses = 0;
        let mut count = |op: &Operand| {
            if op.as_value() == Some(value) {
                uses += 1;
            }
        };
        for block in &self.blocks {
            for inst in &block.instructions {
                inst.kind.for_each_operand(&mut count);
            }
            block.terminator.for_each_operand(&mut count);
        }
        uses
    }
}

/// A compilation unit: the globals and functions of one translation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> + use<> {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    pub fn get_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|global| global.name == name)
            .map(|index| GlobalId(index as u32))
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|function| function.name.as_deref() == Some(name))
            .map(|index| FunctionId(index as u32))
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        self.globals.push(global);
        GlobalId(self.globals.len() as u32 - 1)
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        self.functions.push(function);
        FunctionId(self.functions.len() as u32 - 1)
    }

    /// Returns the global called `name`, declaring it as an external of type
    /// `ty` if the module does not have one yet.
    pub fn get_or_insert_global(
        &mut self,
        name: &str,
        ty: Type,
        thread_local: bool,
    ) -> Result<GlobalId> {
        if let Some(id) = self.get_global(name) {
            let existing = self.global(id);
            if existing.ty != ty || existing.thread_local != thread_local {
                bail!(
                    "global @{name} already exists with an incompatible declaration ({}{})",
                    if existing.thread_local { "thread_local " } else { "" },
                    existing.ty
                );
            }
            return Ok(id);
        }
        if self.get_function(name).is_some() {
            bail!("cannot declare global @{name}: a function with that name exists");
        }
        let mut global = Global::external(name, ty);
        global.thread_local = thread_local;
        Ok(self.add_global(global))
    }

    /// Returns the function called `name`, adding an external declaration of
    /// type `ty` if the module does not have one yet.
    pub fn get_or_declare_function(&mut self, name: &str, ty: &FuncType) -> Result<FunctionId> {
        if let Some(id) = self.get_function(name) {
            let existing = &self.function(id).ty;
            if existing != ty {
                bail!("function @{name} already exists with type {existing}, expected {ty}");
            }
            return Ok(id);
        }
        if self.get_global(name).is_some() {
            bail!("cannot declare function @{name}: a global with that name exists");
        }
        Ok(self.add_function(Function::declare(name, ty.clone())))
    }

    /// Returns a private constant holding `text` as a NUL-terminated string,
    /// reusing an identical one if the module already has it.
    pub fn global_string(&mut self, text: &str) -> GlobalId {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);

        let existing = self.globals.iter().position(|global| {
            global.linkage == Linkage::Private
                && global.constant
                && global.init.as_ref() == Some(&GlobalInit::Bytes(bytes.clone()))
        });
        if let Some(index) = existing {
            return GlobalId(index as u32);
        }

        let name = self.fresh_symbol(".str");
        self.add_global(Global {
            name,
            ty: Type::byte_array(bytes.len() as u64),
            linkage: Linkage::Private,
            thread_local: false,
            constant: true,
            init: Some(GlobalInit::Bytes(bytes)),
        })
    }

    fn fresh_symbol(&self, base: &str) -> String {
        let taken =
            |name: &str| self.get_global(name).is_some() || self.get_function(name).is_some();
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// The name used for `id` in diagnostics and the textual form.
    pub fn function_symbol(&self, id: FunctionId) -> String {
        match &self.function(id).name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => id.0.to_string(),
        }
    }

    /// Every call instruction in the module, in program order.
    pub fn calls(&self) -> impl Iterator<Item = &Instruction> {
        self.functions
            .iter()
            .flat_map(|function| function.instructions())
            .filter(|inst| inst.kind.is_call())
    }

    /// Direct calls to `target` anywhere in the module.
    pub fn calls_to(&self, target: FunctionId) -> usize {
        self.calls()
            .filter(|inst| {
                matches!(
                    &inst.kind,
                    InstKind::Call { callee: Callee::Direct(id), .. } if *id == target
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::{BinOp, Operand};

    #[test]
    fn global_string_is_interned() {
        let mut module = Module::new("m");
        let a = module.global_string("fread");
        let b = module.global_string("fread");
        let c = module.global_string("puts");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.global(a).name, ".str");
        assert_eq!(module.global(c).name, ".str.1");
        assert_eq!(module.global(a).ty, Type::byte_array(6));
    }

    #[test]
    fn get_or_insert_rejects_conflicting_declaration() {
        let mut module = Module::new("m");
        module.add_global(Global::external("__afl_prev_loc", Type::I64));
        assert!(
            module
                .get_or_insert_global("__afl_prev_loc", Type::I32, true)
                .is_err()
        );
        let ptr = module
            .get_or_insert_global("__afl_area_ptr", Type::Ptr, false)
            .unwrap();
        assert_eq!(
            module.get_or_insert_global("__afl_area_ptr", Type::Ptr, false).unwrap(),
            ptr
        );
    }

    #[test]
    fn replace_all_uses_rewrites_terminators_and_instructions() {
        let mut function = Function::new(
            Some("f".to_string()),
            FuncType::new(Type::I32, vec![Type::I32]),
        );
        let entry = function.add_block("entry");
        let sum = function.fresh_value().unwrap();
        function.block_mut(entry).instructions.push(Instruction::new(
            Some(sum),
            InstKind::Binary {
                op: BinOp::Add,
                ty: Type::I32,
                lhs: Operand::Value(ValueId(0)),
                rhs: Operand::Value(ValueId(0)),
            },
        ));
        function.block_mut(entry).terminator =
            Terminator::Ret(Some((Type::I32, Operand::Value(ValueId(0)))));

        assert_eq!(function.count_uses(ValueId(0)), 3);
        assert_eq!(function.replace_all_uses_with(ValueId(0), &Operand::Const(7)), 3);
        assert_eq!(function.count_uses(ValueId(0)), 0);
        assert_eq!(sum, ValueId(1));
    }

    #[test]
    fn value_numbers_do_not_wrap() {
        let mut function = Function::new(None, FuncType::new(Type::Void, vec![]));
        function.reserve_value(ValueId(u32::MAX - 2)).unwrap();
        assert_eq!(function.fresh_value().unwrap(), ValueId(u32::MAX - 1));
        assert!(function.fresh_value().is_err());
        assert!(function.reserve_value(ValueId(u32::MAX)).is_err());
    }
}
