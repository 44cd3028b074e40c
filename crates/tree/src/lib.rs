//! Expression-tree IR for nonlinear algebraic expressions.
//!
//! Trees are arena allocated and append-only: nodes are never freed
//! individually and rewrites deep-copy instead of sharing. The crate covers
//! building trees from opcode programs, editing them (term appends,
//! substitution, renaming, scaling), evaluating them under a value binding
//! and serialising them back to opcode programs.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod build;
pub mod dot;
mod emit;
mod error;
mod eval;
mod node;
mod ops;
mod tree;

pub use error::{EvalError, TreeError};
pub use eval::{Binding, PoolBinding, SliceBinding};
pub use node::{Node, NodeId, OpArg, OpClass};
pub use ops::Slot;
pub use tree::{Checkpoint, Tree, VarTree};
