//! nlx is a symbolic and structural toolkit for nonlinear algebraic
//! expressions encoded as stack-based opcode programs, as produced by a
//! mathematical-programming front end.
//!
//! The pieces, re-exported here under one roof:
//!
//! - [`opcode`]: the instruction set, program validation on an abstract
//!   value stack, the algebraic-degree analyser and the adjacency-list
//!   program view.
//! - [`diff`]: the symbolic differentiator mapping a program and a
//!   variable index to the partial-derivative program.
//! - [`tree`]: the arena-allocated expression IR with build, edit,
//!   rename, evaluate and re-emission.
//! - [`primitives`]: the shared constants pool and math-error taxonomy.
//!
//! # Example
//!
//! Differentiate `-(x2*x2)` with respect to `x2`:
//!
//! ```
//! use nlx::opcode::{OpCode, Program};
//!
//! let program = Program::from_ops(&[
//!     (OpCode::HEADER, 5),
//!     (OpCode::PUSH_VAR, 2),
//!     (OpCode::MUL_VAR, 2),
//!     (OpCode::UMIN, 0),
//!     (OpCode::STORE, 1),
//! ]);
//! let derivative = nlx::diff::differentiate(&program, 2).unwrap();
//! assert_eq!(derivative.equ_idx(), Some(1));
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[doc(inline)]
pub use diff;
#[doc(inline)]
pub use opcode;
#[doc(inline)]
pub use primitives;
#[doc(inline)]
pub use tree;

pub use diff::differentiate;
pub use opcode::{compute_degree, OpCode, OpTree, Program};
pub use primitives::{Pool, PoolRef};
pub use tree::Tree;
