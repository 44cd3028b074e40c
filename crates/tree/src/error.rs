use core::fmt;
use opcode::OpcodeError;
use primitives::MathError;

/// Structural errors raised while building or editing an expression tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// A program being imported is not well formed.
    Malformed(OpcodeError),
    /// An `ADD` node was left without any effective operand.
    EmptyAdd,
    /// A node has the wrong class for the requested edit.
    UnexpectedNode {
        /// Name of the class found.
        found: &'static str,
    },
    /// A variable lookup in the occurrence index missed.
    VarNotFound {
        /// The 1-based variable id.
        var: u32,
    },
    /// A variable was listed twice when building the occurrence index.
    DuplicateVar {
        /// The 1-based variable id.
        var: u32,
    },
    /// A bilinear term was given a second variable without a first.
    BilinearOperandOrder,
}

impl From<OpcodeError> for TreeError {
    fn from(err: OpcodeError) -> Self {
        Self::Malformed(err)
    }
}

impl core::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed opcode: {e}"),
            Self::EmptyAdd => f.write_str("invalid node: ADD with no operand"),
            Self::UnexpectedNode { found } => {
                write!(f, "unexpected node class {found}")
            }
            Self::VarNotFound { var } => write!(f, "variable {var} not in the index"),
            Self::DuplicateVar { var } => write!(f, "variable {var} listed twice"),
            Self::BilinearOperandOrder => {
                f.write_str("bilinear term: second variable given without a first")
            }
        }
    }
}

/// Evaluation failures: math errors tagged with the function that raised
/// them, or references outside the binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// A floating-point exception, with the function code if a call raised
    /// it.
    Math {
        /// The error category.
        kind: MathError,
        /// Function code of the call, if any.
        func: Option<i32>,
    },
    /// A pool index the binding does not cover.
    BadPoolIndex {
        /// The offending 1-based index.
        idx: u32,
    },
    /// A variable id the binding does not cover.
    BadVarIndex {
        /// The offending 1-based id.
        var: u32,
    },
    /// A function the evaluator does not implement.
    UnsupportedFunction {
        /// Raw function code.
        func: i32,
    },
    /// A node shape the evaluator cannot fold.
    InvalidNode,
}

impl From<MathError> for EvalError {
    fn from(kind: MathError) -> Self {
        Self::Math { kind, func: None }
    }
}

impl core::error::Error for EvalError {}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Math {
                kind,
                func: Some(fc),
            } => {
                write!(f, "{kind} for function {}", opcode::FuncCode::name_by_raw(*fc))
            }
            Self::Math { kind, func: None } => write!(f, "{kind}"),
            Self::BadPoolIndex { idx } => write!(f, "pool index {idx} out of range"),
            Self::BadVarIndex { var } => write!(f, "variable {var} out of range"),
            Self::UnsupportedFunction { func } => {
                write!(
                    f,
                    "cannot evaluate function {}",
                    opcode::FuncCode::name_by_raw(*func)
                )
            }
            Self::InvalidNode => f.write_str("invalid node during evaluation"),
        }
    }
}
