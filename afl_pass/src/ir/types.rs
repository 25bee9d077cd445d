use std::fmt;

/// A first-class type in the IR.
///
/// Pointers are opaque: the pointee type is carried by the instruction that
/// dereferences the pointer, not by the pointer itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// An integer of the given bit width (1, 8, 16, 32 or 64).
    Int(u8),
    Ptr,
    Array { len: u64, elem: Box<Type> },
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn byte_array(len: u64) -> Self {
        Type::Array {
            len,
            elem: Box::new(Type::I8),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr => write!(f, "ptr"),
            Type::Array { len, elem } => write!(f, "[{len} x {elem}]"),
        }
    }
}

/// The signature of a function: return type, parameter types and whether
/// extra variadic arguments are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl FuncType {
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self {
            ret,
            params,
            variadic: false,
        }
    }

    pub fn variadic(ret: Type, params: Vec<Type>) -> Self {
        Self {
            ret,
            params,
            variadic: true,
        }
    }

    /// Checks whether a call with `argc` arguments is well-formed for this signature.
    pub fn accepts_arity(&self, argc: usize) -> bool {
        if self.variadic {
            argc >= self.params.len()
        } else {
            argc == self.params.len()
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested_types() {
        assert_eq!(Type::byte_array(6).to_string(), "[6 x i8]");
        let ty = FuncType::variadic(Type::I32, vec![Type::Ptr]);
        assert_eq!(ty.to_string(), "i32 (ptr, ...)");
        assert!(ty.accepts_arity(3));
        assert!(!FuncType::new(Type::Void, vec![Type::I32]).accepts_arity(2));
    }
}
