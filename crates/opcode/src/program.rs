//! Opcode programs: a pair of equal-length instruction and argument
//! sequences executed on an abstract value stack.
//!
//! A well-formed program starts with `HEADER` whose argument is the program
//! length, ends with `STORE` whose argument is the 1-based equation index it
//! defines, and leaves exactly one residual value for the store.

use crate::{ArgKind, FuncCode, OpCode, OpcodeError};
use core::fmt;

/// Sizes needed to walk a program or lay it out as an [`OpTree`](crate::OpTree).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeSizes {
    /// Maximum abstract stack depth over the whole program.
    pub stack_max: u32,
    /// Total number of CSR child-index entries.
    pub idx_count: u32,
}

/// An opcode program: parallel instruction and argument arrays.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    instrs: Vec<i32>,
    args: Vec<i32>,
}

impl Program {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty program with room for `cap` instructions.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            instrs: Vec::with_capacity(cap),
            args: Vec::with_capacity(cap),
        }
    }

    /// Builds a program from raw parallel arrays.
    ///
    /// Only the length agreement is checked here; use [`validate`](Self::validate)
    /// for well-formedness.
    pub fn from_parts(instrs: Vec<i32>, args: Vec<i32>) -> Result<Self, OpcodeError> {
        if instrs.len() != args.len() {
            return Err(OpcodeError::LengthMismatch {
                instrs: instrs.len(),
                args: args.len(),
            });
        }
        Ok(Self { instrs, args })
    }

    /// Builds a program from `(instruction, argument)` pairs.
    pub fn from_ops(ops: &[(OpCode, i32)]) -> Self {
        let mut p = Self::with_capacity(ops.len());
        for &(op, arg) in ops {
            p.push(op, arg);
        }
        p
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` for a zero-length program.
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Returns `true` for a program with no expression body: physically
    /// empty, or a bare header declaring a length of zero or less.
    pub fn is_trivial(&self) -> bool {
        self.instrs.is_empty() || self.args[0] <= 0
    }

    /// The raw instruction array.
    pub fn instrs(&self) -> &[i32] {
        &self.instrs
    }

    /// The raw argument array.
    pub fn args(&self) -> &[i32] {
        &self.args
    }

    /// Raw instruction at `pos`.
    pub fn instr(&self, pos: usize) -> i32 {
        self.instrs[pos]
    }

    /// Decoded instruction at `pos`.
    pub fn opcode(&self, pos: usize) -> Option<OpCode> {
        OpCode::from_raw(self.instrs[pos])
    }

    /// Argument at `pos`.
    pub fn arg(&self, pos: usize) -> i32 {
        self.args[pos]
    }

    /// The 1-based equation index carried by the trailing `STORE`, if any.
    pub fn equ_idx(&self) -> Option<i32> {
        match self.instrs.last() {
            Some(&raw) if raw == OpCode::STORE.raw() => self.args.last().copied(),
            _ => None,
        }
    }

    /// Appends an instruction.
    pub fn push(&mut self, op: OpCode, arg: i32) {
        self.instrs.push(op.raw());
        self.args.push(arg);
    }

    /// Appends a raw `(instruction, argument)` entry, e.g. when copying a
    /// block out of another program.
    pub fn push_raw(&mut self, instr: i32, arg: i32) {
        self.instrs.push(instr);
        self.args.push(arg);
    }

    /// Drops every entry at position `len` and later.
    pub fn truncate(&mut self, len: usize) {
        self.instrs.truncate(len);
        self.args.truncate(len);
    }

    /// Overwrites the argument at `pos`.
    pub fn set_arg(&mut self, pos: usize, arg: i32) {
        self.args[pos] = arg;
    }

    /// Mutable access to both arrays at once, for in-place reordering.
    pub fn parts_mut(&mut self) -> (&mut [i32], &mut [i32]) {
        (&mut self.instrs, &mut self.args)
    }

    /// Consumes the program into its raw arrays.
    pub fn into_parts(self) -> (Vec<i32>, Vec<i32>) {
        (self.instrs, self.args)
    }

    /// Checks the well-formedness invariants: header first with the correct
    /// length, store last, every instruction known and supported, every pop
    /// backed by an operand, and a single residual value for the store.
    pub fn validate(&self) -> Result<(), OpcodeError> {
        if self.is_empty() {
            return Ok(());
        }

        if self.instrs[0] != OpCode::HEADER.raw() {
            return Err(OpcodeError::MissingHeader {
                found: self.instrs[0],
            });
        }
        // A bare header declaring length zero is the empty-program
        // sentinel; it carries no body and nothing to walk.
        if self.len() == 1 && self.args[0] == 0 {
            return Ok(());
        }
        if self.args[0] != self.len() as i32 {
            return Err(OpcodeError::BadLength {
                declared: self.args[0],
                actual: self.len(),
            });
        }
        let last = self.len() - 1;
        if self.instrs[last] != OpCode::STORE.raw() {
            return Err(OpcodeError::MissingStore {
                found: self.instrs[last],
            });
        }

        self.walk(|_, _, _| ()).map(|_| ())
    }

    /// Computes the maximum abstract stack depth and the number of CSR index
    /// entries needed to represent the program as an [`OpTree`](crate::OpTree).
    ///
    /// Callers use this to pre-size arenas before a second, filling pass.
    pub fn tree_sizes(&self) -> Result<TreeSizes, OpcodeError> {
        let mut sizes = TreeSizes::default();
        self.walk(|op, nargs, depth| {
            if depth > sizes.stack_max {
                sizes.stack_max = depth;
            }
            sizes.idx_count += match op {
                OpCode::ADD_VAR
                | OpCode::ADD_IMM
                | OpCode::SUB_VAR
                | OpCode::SUB_IMM
                | OpCode::MUL_VAR
                | OpCode::MUL_IMM
                | OpCode::DIV_VAR
                | OpCode::DIV_IMM
                | OpCode::UMIN
                | OpCode::CALL1 => 1,
                OpCode::ADD
                | OpCode::SUB
                | OpCode::MUL
                | OpCode::DIV
                | OpCode::MUL_IMM_ADD
                | OpCode::CALL2 => 2,
                OpCode::CALLN => nargs,
                _ => 0,
            };
        })?;
        Ok(sizes)
    }

    /// Walks the program on the abstract stack, invoking `visit` with each
    /// supported instruction, the effective pop count of a `CALLN`, and the
    /// stack depth after the instruction. Returns the final depth.
    ///
    /// `HEADER`, `STORE`, `NOOP` and `END` do not touch the stack; the walk
    /// requires a final depth of exactly one (the store's operand).
    pub(crate) fn walk<F>(&self, mut visit: F) -> Result<u32, OpcodeError>
    where
        F: FnMut(OpCode, u32, u32),
    {
        let mut depth: u32 = 0;
        let mut pending_arity: Option<i32> = None;

        for (pos, (&raw, &arg)) in self.instrs.iter().zip(&self.args).enumerate() {
            let op = OpCode::from_raw(raw).ok_or(OpcodeError::UnknownInstr { pos, raw })?;
            if op.is_reserved() {
                return Err(OpcodeError::UnsupportedInstr { pos, op });
            }

            let mut nargs = 0u32;
            match op {
                OpCode::NOOP | OpCode::HEADER | OpCode::STORE | OpCode::END => {}
                OpCode::FUNC_ARG_COUNT => {
                    pending_arity = Some(arg);
                }
                OpCode::CALLN => {
                    let n = pending_arity
                        .take()
                        .ok_or(OpcodeError::MissingArity { pos })?;
                    if n < 1 || depth < n as u32 {
                        return Err(OpcodeError::StackUnderflow { pos, op });
                    }
                    nargs = n as u32;
                    depth = depth - nargs + 1;
                }
                _ => {
                    let inputs = op.inputs() as u32;
                    if depth < inputs {
                        return Err(OpcodeError::StackUnderflow { pos, op });
                    }
                    depth = depth - inputs + op.outputs() as u32;
                }
            }

            log::trace!("walk [{pos:5}] {:<14} arg {arg:>6} depth {depth}", op.as_str());
            visit(op, nargs, depth);
        }

        if depth != 1 {
            return Err(OpcodeError::StackImbalance {
                depth: depth as usize,
            });
        }

        Ok(depth)
    }

    /// Renders the program one instruction per line, in the
    /// `index / name / argument` layout of the upstream tooling.
    pub fn display(&self) -> ProgramDisplay<'_> {
        ProgramDisplay(self)
    }
}

/// One-instruction-per-line renderer returned by [`Program::display`].
#[derive(Debug)]
pub struct ProgramDisplay<'a>(&'a Program);

impl fmt::Display for ProgramDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, (&raw, &arg)) in self.0.instrs.iter().zip(&self.0.args).enumerate() {
            let name = OpCode::name_by_raw(raw);
            match OpCode::from_raw(raw).map(|op| op.arg_kind()) {
                Some(ArgKind::Func) => writeln!(
                    f,
                    "[{pos:5}]  {name:<14} {arg:>6}  ({})",
                    FuncCode::name_by_raw(arg)
                )?,
                _ => writeln!(f, "[{pos:5}]  {name:<14} {arg:>6}")?,
            }
        }
        Ok(())
    }
}
