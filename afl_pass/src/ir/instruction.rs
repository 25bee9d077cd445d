//! Instructions, operands and terminators.

use crate::ir::types::Type;

/// An SSA value local to a function. Parameters occupy `%0..%n-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of a global variable within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// Index of a function within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(ValueId),
    /// An integer constant; its width comes from the consuming instruction.
    Const(i64),
    Null,
    /// The address of a global variable.
    Global(GlobalId),
    /// The address of a function.
    Function(FunctionId),
}

impl Operand {
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::Value(value)
    }
}

/// A call argument together with the type it is passed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub ty: Type,
    pub value: Operand,
}

impl Arg {
    pub fn new(ty: Type, value: impl Into<Operand>) -> Self {
        Self {
            ty,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// A statically known target.
    Direct(FunctionId),
    /// A call through a function pointer.
    Indirect(Operand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
}

impl BinOp {
    pub const ALL: [BinOp; 8] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Shl,
        BinOp::LShr,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ugt,
    Slt,
    Sgt,
}

impl CmpPred {
    pub const ALL: [CmpPred; 6] = [
        CmpPred::Eq,
        CmpPred::Ne,
        CmpPred::Ult,
        CmpPred::Ugt,
        CmpPred::Slt,
        CmpPred::Sgt,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Ult => "ult",
            CmpPred::Ugt => "ugt",
            CmpPred::Slt => "slt",
            CmpPred::Sgt => "sgt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    ZExt,
    Trunc,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Load {
        ty: Type,
        ptr: Operand,
    },
    Store {
        ty: Type,
        value: Operand,
        ptr: Operand,
    },
    Binary {
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Icmp {
        pred: CmpPred,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        op: CastOp,
        from: Type,
        value: Operand,
        to: Type,
    },
    /// Byte-granular address arithmetic: `base + index`.
    Gep {
        base: Operand,
        index_ty: Type,
        index: Operand,
    },
    Call {
        ret: Type,
        callee: Callee,
        args: Vec<Arg>,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Operand, BlockId)>,
    },
}

impl InstKind {
    /// The type of the value this instruction produces, `void` if none.
    pub fn result_type(&self) -> Type {
        match self {
            InstKind::Load { ty, .. }
            | InstKind::Binary { ty, .. }
            | InstKind::Phi { ty, .. } => ty.clone(),
            InstKind::Cast { to, .. } => to.clone(),
            InstKind::Icmp { .. } => Type::I1,
            InstKind::Gep { .. } => Type::Ptr,
            InstKind::Call { ret, .. } => ret.clone(),
            InstKind::Store { .. } => Type::Void,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Call { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            InstKind::Load { ptr, .. } => f(ptr),
            InstKind::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Cast { value, .. } => f(value),
            InstKind::Gep { base, index, .. } => {
                f(base);
                f(index);
            }
            InstKind::Call { callee, args, .. } => {
                if let Callee::Indirect(target) = callee {
                    f(target);
                }
                args.iter().for_each(|arg| f(&arg.value));
            }
            InstKind::Phi { incoming, .. } => incoming.iter().for_each(|(op, _)| f(op)),
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            InstKind::Load { ptr, .. } => f(ptr),
            InstKind::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Cast { value, .. } => f(value),
            InstKind::Gep { base, index, .. } => {
                f(base);
                f(index);
            }
            InstKind::Call { callee, args, .. } => {
                if let Callee::Indirect(target) = callee {
                    f(target);
                }
                args.iter_mut().for_each(|arg| f(&mut arg.value));
            }
            InstKind::Phi { incoming, .. } => incoming.iter_mut().for_each(|(op, _)| f(op)),
        }
    }
}

/// Per-instruction metadata attachments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Excludes the instruction from any sanitizer instrumentation applied
    /// after this pass.
    pub nosanitize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub kind: InstKind,
    pub metadata: Metadata,
}

impl Instruction {
    pub fn new(result: Option<ValueId>, kind: InstKind) -> Self {
        Self {
            result,
            kind,
            metadata: Metadata::default(),
        }
    }

    pub fn with_nosanitize(mut self) -> Self {
        self.metadata.nosanitize = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Ret(Option<(Type, Operand)>),
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Terminator::Ret(Some((_, value))) => f(value),
            Terminator::CondBr { cond, .. } => f(cond),
            _ => {}
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Terminator::Ret(Some((_, value))) => f(value),
            Terminator::CondBr { cond, .. } => f(cond),
            _ => {}
        }
    }
}
