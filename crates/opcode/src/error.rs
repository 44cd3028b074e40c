use crate::OpCode;
use core::fmt;

/// Malformed-opcode errors raised while validating or walking a program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum OpcodeError {
    /// The instruction and argument sequences have different lengths.
    LengthMismatch {
        /// Length of the instruction sequence.
        instrs: usize,
        /// Length of the argument sequence.
        args: usize,
    },
    /// The first instruction is not `HEADER`.
    MissingHeader {
        /// Raw instruction found at position 0.
        found: i32,
    },
    /// The header argument does not match the program length.
    BadLength {
        /// Length declared by the header.
        declared: i32,
        /// Actual number of instructions.
        actual: usize,
    },
    /// The last instruction is not `STORE`.
    MissingStore {
        /// Raw instruction found at the last position.
        found: i32,
    },
    /// A raw value that is not a declared instruction.
    UnknownInstr {
        /// Position in the program.
        pos: usize,
        /// Offending raw value.
        raw: i32,
    },
    /// A declared but reserved instruction no component supports.
    UnsupportedInstr {
        /// Position in the program.
        pos: usize,
        /// The reserved instruction.
        op: OpCode,
    },
    /// An instruction popped more values than the stack holds.
    StackUnderflow {
        /// Position in the program.
        pos: usize,
        /// The popping instruction.
        op: OpCode,
    },
    /// The stack depth at the store is not exactly one.
    StackImbalance {
        /// Depth observed at the end of the walk.
        depth: usize,
    },
    /// `CALLN` without a preceding `FUNC_ARG_COUNT`.
    MissingArity {
        /// Position of the `CALLN`.
        pos: usize,
    },
}

impl core::error::Error for OpcodeError {}

impl fmt::Display for OpcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { instrs, args } => {
                write!(f, "instruction and argument lengths differ: {instrs} vs {args}")
            }
            Self::MissingHeader { found } => {
                write!(f, "the first instruction is not HEADER, but {found}")
            }
            Self::BadLength { declared, actual } => {
                write!(f, "header declares length {declared}, program has {actual}")
            }
            Self::MissingStore { found } => {
                write!(f, "the last instruction is not STORE, but {found}")
            }
            Self::UnknownInstr { pos, raw } => {
                write!(f, "unknown instruction {raw} at location {pos}")
            }
            Self::UnsupportedInstr { pos, op } => {
                write!(f, "unsupported opcode {op} at location {pos}")
            }
            Self::StackUnderflow { pos, op } => {
                write!(f, "stack underflow on {op} at location {pos}")
            }
            Self::StackImbalance { depth } => {
                write!(f, "stack depth at the end should be 1, got {depth}")
            }
            Self::MissingArity { pos } => {
                write!(f, "CALLN at location {pos} without FUNC_ARG_COUNT")
            }
        }
    }
}
