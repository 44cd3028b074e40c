//! Shared primitives for the nlx toolkit: the numeric constants pool and the
//! floating-point error taxonomy used by expression evaluation.

mod error;
pub mod pool;

pub use error::MathError;
pub use pool::{nlconst, Pool, PoolRef};
