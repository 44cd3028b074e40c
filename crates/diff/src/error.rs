use core::fmt;
use opcode::{FuncCode, OpCode, OpcodeError};

/// Errors raised while differentiating an opcode program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffError {
    /// The input program is not well formed.
    Malformed(OpcodeError),
    /// A one-argument call with no derivative template.
    UnsupportedCall1 {
        /// Raw function code of the call.
        func: i32,
    },
    /// A two-argument call outside the supported power-family shapes.
    UnsupportedCall2 {
        /// Raw function code of the call.
        func: i32,
    },
    /// Variadic calls cannot be differentiated.
    UnsupportedVariadic {
        /// The offending instruction (`CALLN` or `FUNC_ARG_COUNT`).
        op: OpCode,
    },
}

impl From<OpcodeError> for DiffError {
    fn from(err: OpcodeError) -> Self {
        Self::Malformed(err)
    }
}

impl core::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed opcode: {e}"),
            Self::UnsupportedCall1 { func } => {
                write!(f, "cannot diff CALL1 {}", FuncCode::name_by_raw(*func))
            }
            Self::UnsupportedCall2 { func } => {
                write!(f, "cannot diff CALL2 {}", FuncCode::name_by_raw(*func))
            }
            Self::UnsupportedVariadic { op } => write!(f, "cannot diff {op}"),
        }
    }
}
