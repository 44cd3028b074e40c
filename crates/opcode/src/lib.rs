//! Opcode model for nonlinear algebraic expressions: the instruction set,
//! the abstract stack machine that validates and sizes programs, the
//! algebraic-degree analyser and the adjacency-list program view.
//!
//! A program is a pair of equal-length instruction and argument arrays
//! produced by a mathematical-programming front end; see [`Program`] for the
//! well-formedness contract.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod degree;
pub mod dot;
mod error;
pub mod func;
pub mod opcode;
mod program;
mod optree;
#[cfg(any(test, feature = "test-programs"))]
pub mod test_programs;

pub use degree::{compute_degree, Degree};
pub use error::OpcodeError;
pub use func::{FuncCode, FUNC_COUNT, FUNC_NAMES};
pub use opcode::{ArgKind, OpCode, OpCodeInfo, OPCODE_COUNT, OPCODE_INFO};
pub use program::{Program, ProgramDisplay, TreeSizes};
pub use optree::OpTree;

// Reserved pool indices travel with the instruction set: opcode arguments
// reference them directly.
pub use primitives::nlconst;
