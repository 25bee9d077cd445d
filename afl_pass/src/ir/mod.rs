//! A small SSA intermediate representation the instrumentation passes operate on.
//!
//! A [`Module`] holds globals and functions; a [`Function`] holds basic blocks;
//! a [`BasicBlock`] holds an ordered list of [`Instruction`]s and exactly one
//! [`Terminator`]. Modules round-trip through a textual form
//! ([`parse_module`] and `Display`).

mod cursor;
mod instruction;
mod module;
mod parser;
mod printer;
mod types;
mod verify;

pub use cursor::FuncCursor;
pub use instruction::*;
pub use module::{BasicBlock, Function, Global, GlobalInit, Linkage, Module};
pub use parser::parse_module;
pub use types::{FuncType, Type};
pub use verify::verify_module;
