//! Textual form of a module. The output is accepted by [`crate::ir::parse_module`].

use std::fmt::{self, Display, Formatter};

use crate::ir::instruction::{Callee, InstKind, Instruction, Operand, Terminator};
use crate::ir::module::{Function, Global, GlobalInit, Linkage, Module};

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            writeln!(f, "{}", GlobalPrinter(global))?;
        }
        for (index, function) in self.functions.iter().enumerate() {
            writeln!(f)?;
            FunctionPrinter {
                module: self,
                function,
                index,
            }
            .fmt(f)?;
        }
        Ok(())
    }
}

struct GlobalPrinter<'a>(&'a Global);

impl Display for GlobalPrinter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let global = self.0;
        write!(f, "@{} = ", global.name)?;
        match global.linkage {
            Linkage::External => write!(f, "external ")?,
            Linkage::Private => write!(f, "private ")?,
            Linkage::Default => {}
        }
        if global.thread_local {
            write!(f, "thread_local ")?;
        }
        let keyword = if global.constant { "constant" } else { "global" };
        write!(f, "{keyword} {}", global.ty)?;
        match &global.init {
            Some(GlobalInit::Int(value)) => write!(f, " {value}"),
            Some(GlobalInit::Null) => write!(f, " null"),
            Some(GlobalInit::Bytes(bytes)) => write!(f, " c\"{}\"", escape_bytes(bytes)),
            None => Ok(()),
        }
    }
}

pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..0x7f).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{byte:02X}"));
        }
    }
    out
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    function: &'a Function,
    index: usize,
}

impl FunctionPrinter<'_> {
    fn symbol(&self) -> String {
        match &self.function.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.index.to_string(),
        }
    }

    fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Value(value) => format!("%{}", value.0),
            Operand::Const(value) => value.to_string(),
            Operand::Null => "null".to_string(),
            Operand::Global(id) => format!("@{}", self.module.global(*id).name),
            Operand::Function(id) => format!("@{}", self.module.function_symbol(*id)),
        }
    }

    fn instruction(&self, f: &mut Formatter<'_>, inst: &Instruction) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(result) = inst.result {
            write!(f, "%{} = ", result.0)?;
        }
        match &inst.kind {
            InstKind::Load { ty, ptr } => write!(f, "load {ty}, ptr {}", self.operand(ptr))?,
            InstKind::Store { ty, value, ptr } => write!(
                f,
                "store {ty} {}, ptr {}",
                self.operand(value),
                self.operand(ptr)
            )?,
            InstKind::Binary { op, ty, lhs, rhs } => write!(
                f,
                "{} {ty} {}, {}",
                op.mnemonic(),
                self.operand(lhs),
                self.operand(rhs)
            )?,
            InstKind::Icmp { pred, ty, lhs, rhs } => write!(
                f,
                "icmp {} {ty} {}, {}",
                pred.mnemonic(),
                self.operand(lhs),
                self.operand(rhs)
            )?,
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => write!(f, "{} {from} {} to {to}", op.mnemonic(), self.operand(value))?,
            InstKind::Gep {
                base,
                index_ty,
                index,
            } => write!(
                f,
                "getelementptr i8, ptr {}, {index_ty} {}",
                self.operand(base),
                self.operand(index)
            )?,
            InstKind::Call { ret, callee, args } => {
                let target = match callee {
                    Callee::Direct(id) => format!("@{}", self.module.function_symbol(*id)),
                    Callee::Indirect(op) => self.operand(op),
                };
                write!(f, "call {ret} {target}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", arg.ty, self.operand(&arg.value))?;
                }
                write!(f, ")")?;
            }
            InstKind::Phi { ty, incoming } => {
                write!(f, "phi {ty} ")?;
                for (i, (op, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let label = &self.function.block(*block).label;
                    write!(f, "[ {}, %{label} ]", self.operand(op))?;
                }
            }
        }
        if inst.metadata.nosanitize {
            write!(f, ", !nosanitize")?;
        }
        writeln!(f)
    }

    fn terminator(&self, f: &mut Formatter<'_>, terminator: &Terminator) -> fmt::Result {
        let label = |block| &self.function.block(block).label;
        match terminator {
            Terminator::Ret(None) => writeln!(f, "  ret void"),
            Terminator::Ret(Some((ty, value))) => {
                writeln!(f, "  ret {ty} {}", self.operand(value))
            }
            Terminator::Br(target) => writeln!(f, "  br label %{}", label(*target)),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => writeln!(
                f,
                "  br i1 {}, label %{}, label %{}",
                self.operand(cond),
                label(*then_block),
                label(*else_block)
            ),
            Terminator::Unreachable => writeln!(f, "  unreachable"),
        }
    }
}

impl Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ty = &self.function.ty;
        let keyword = if self.function.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(f, "{keyword} {} @{}(", ty.ret, self.symbol())?;
        for (i, (param, value)) in ty.params.iter().zip(self.function.params()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.function.is_declaration() {
                write!(f, "{param}")?;
            } else {
                write!(f, "{param} %{}", value.0)?;
            }
        }
        if ty.variadic {
            if !ty.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;

        if self.function.is_declaration() {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for (i, block) in self.function.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                self.instruction(f, inst)?;
            }
            self.terminator(f, &block.terminator)?;
        }
        writeln!(f, "}}")
    }
}
