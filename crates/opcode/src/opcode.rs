//! Instruction definitions for the nonlinear-expression stack machine, with
//! the per-opcode stack effect and argument interpretation tables.

#[cfg(feature = "parse")]
pub mod parse;

use core::fmt;

/// A valid instruction of the nonlinear stack machine.
///
/// This is always a valid opcode, as declared in the [`opcode`](self) module
/// constants or the [`OPCODE_INFO`] table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct OpCode(u8);

/// Number of entries in the instruction table.
pub const OPCODE_COUNT: usize = 31;

/// How the `arg` field of an instruction is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// The argument carries no information.
    #[default]
    None,
    /// 1-based variable index.
    Var,
    /// 1-based constants-pool index.
    Imm,
    /// Function code for a call instruction.
    Func,
    /// Program length, carried by the header.
    Len,
    /// 1-based equation index, carried by the store.
    Equ,
    /// Arity announcement for the next `CALLN`.
    Count,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.get();
        if let Some(info) = OPCODE_INFO[n as usize] {
            f.write_str(info.name())
        } else {
            write!(f, "UNKNOWN({n})")
        }
    }
}

impl OpCode {
    /// Instantiates a new opcode from a raw value.
    ///
    /// Returns `None` if the value is not a declared instruction.
    #[inline]
    pub const fn new(opcode: u8) -> Option<Self> {
        if opcode as usize >= OPCODE_INFO.len() {
            return None;
        }
        match OPCODE_INFO[opcode as usize] {
            Some(_) => Some(Self(opcode)),
            None => None,
        }
    }

    /// Instantiates an opcode from the signed representation used inside
    /// opcode programs.
    #[inline]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 || raw >= OPCODE_COUNT as i32 {
            None
        } else {
            Self::new(raw as u8)
        }
    }

    /// Returns the opcode name. This is the inverse of
    /// [`parse`](Self::parse).
    #[doc(alias = "name")]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        self.info().name()
    }

    /// Returns the opcode name for a raw program entry, `"UNKNOWN"` if it is
    /// not a declared instruction.
    #[inline]
    pub const fn name_by_raw(raw: i32) -> &'static str {
        if let Some(op) = Self::from_raw(raw) {
            op.as_str()
        } else {
            "UNKNOWN"
        }
    }

    /// Returns the number of values the instruction pops.
    ///
    /// `CALLN` is variadic; its table entry holds the minimum of one.
    #[inline]
    pub const fn inputs(&self) -> u8 {
        self.info().inputs()
    }

    /// Returns the number of values the instruction pushes.
    #[inline]
    pub const fn outputs(&self) -> u8 {
        self.info().outputs()
    }

    /// Returns how the paired argument is interpreted.
    #[inline]
    pub const fn arg_kind(&self) -> ArgKind {
        self.info().arg_kind()
    }

    /// Returns the opcode information.
    #[inline]
    pub const fn info(&self) -> OpCodeInfo {
        if let Some(info) = OPCODE_INFO[self.0 as usize] {
            info
        } else {
            panic!("opcode not found")
        }
    }

    /// Returns the opcode as a `u8`.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the opcode in the signed program representation.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0 as i32
    }

    /// Returns `true` for instructions that push a fresh value without
    /// consuming one (`PUSH_VAR`, `PUSH_IMM`, `PUSH_ZERO`, `UMIN_VAR`).
    #[inline]
    pub const fn is_push(&self) -> bool {
        matches!(
            *self,
            OpCode::PUSH_VAR | OpCode::PUSH_IMM | OpCode::PUSH_ZERO | OpCode::UMIN_VAR
        )
    }

    /// Returns `true` for the folded one-operand forms carrying a variable
    /// argument (`ADD_VAR`, `SUB_VAR`, `MUL_VAR`, `DIV_VAR`).
    #[inline]
    pub const fn is_var_fold(&self) -> bool {
        matches!(
            *self,
            OpCode::ADD_VAR | OpCode::SUB_VAR | OpCode::MUL_VAR | OpCode::DIV_VAR
        )
    }

    /// Returns `true` for the folded one-operand forms carrying a pool
    /// argument (`ADD_IMM`, `SUB_IMM`, `MUL_IMM`, `DIV_IMM`).
    #[inline]
    pub const fn is_imm_fold(&self) -> bool {
        matches!(
            *self,
            OpCode::ADD_IMM | OpCode::SUB_IMM | OpCode::MUL_IMM | OpCode::DIV_IMM
        )
    }

    /// Returns `true` for instructions that reference a variable through
    /// their argument.
    #[inline]
    pub const fn references_var(&self) -> bool {
        matches!(self.arg_kind(), ArgKind::Var)
    }

    /// Returns `true` for reserved instructions that no component supports.
    #[inline]
    pub const fn is_reserved(&self) -> bool {
        self.0 >= CHK
    }
}

impl PartialEq<u8> for OpCode {
    fn eq(&self, other: &u8) -> bool {
        self.get().eq(other)
    }
}

/// Information about an instruction: name, stack effect and argument kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpCodeInfo {
    name: &'static str,
    /// Stack inputs
    inputs: u8,
    /// Stack outputs
    outputs: u8,
    /// Interpretation of the paired argument
    arg: ArgKind,
    /// `CALLN` pops a run-time number of operands
    variadic: bool,
}

impl OpCodeInfo {
    /// Creates a new opcode info with the given name and default values.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            inputs: 0,
            outputs: 0,
            arg: ArgKind::None,
            variadic: false,
        }
    }

    /// Returns the instruction name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the number of input stack elements.
    #[inline]
    pub const fn inputs(&self) -> u8 {
        self.inputs
    }

    /// Returns the number of output stack elements.
    #[inline]
    pub const fn outputs(&self) -> u8 {
        self.outputs
    }

    /// Returns how the paired argument is interpreted.
    #[inline]
    pub const fn arg_kind(&self) -> ArgKind {
        self.arg
    }

    /// Returns `true` if the pop count depends on a preceding
    /// `FUNC_ARG_COUNT`.
    #[inline]
    pub const fn is_variadic(&self) -> bool {
        self.variadic
    }
}

/// Used in [`OPCODE_INFO`] to set the stack inputs and outputs.
#[inline]
pub const fn stack_io(mut op: OpCodeInfo, inputs: u8, outputs: u8) -> OpCodeInfo {
    op.inputs = inputs;
    op.outputs = outputs;
    op
}

/// Used in [`OPCODE_INFO`] to set the argument interpretation.
#[inline]
pub const fn arg(mut op: OpCodeInfo, kind: ArgKind) -> OpCodeInfo {
    op.arg = kind;
    op
}

/// Used in [`OPCODE_INFO`] to mark the variadic call.
#[inline]
pub const fn variadic(mut op: OpCodeInfo) -> OpCodeInfo {
    op.variadic = true;
    op
}

/// Creates all opcode constants and the [`OPCODE_INFO`] map, plus the
/// `NAME_TO_OPCODE` map behind the `parse` feature.
macro_rules! opcodes {
    ($($val:literal => $name:ident => $($modifier:ident $(( $($modifier_arg:expr),* ))?),*);* $(;)?) => {
        $(
            #[doc = concat!("The `", stringify!($val), "` (\"", stringify!($name),"\") opcode.")]
            pub const $name: u8 = $val;
        )*
        impl OpCode {$(
            #[doc = concat!("The `", stringify!($val), "` (\"", stringify!($name),"\") opcode.")]
            pub const $name: Self = Self($val);
        )*}

        /// Maps each opcode to its info.
        pub static OPCODE_INFO: [Option<OpCodeInfo>; 64] = {
            let mut map = [None; 64];
            let mut prev: u8 = 0;
            $(
                let val: u8 = $val;
                assert!(val == 0 || val > prev, "opcodes must be sorted in ascending order");
                prev = val;
                let info = OpCodeInfo::new(stringify!($name));
                $(
                let info = $modifier(info, $($($modifier_arg),*)?);
                )*
                map[$val] = Some(info);
            )*
            let _ = prev;
            map
        };

        /// Maps each name to its opcode.
        #[cfg(feature = "parse")]
        pub(crate) static NAME_TO_OPCODE: phf::Map<&'static str, OpCode> = stringify_with_cb! { phf_map_cb; $($name)* };
    };
}

/// Callback for creating a [`phf`] map with `stringify_with_cb`.
#[cfg(feature = "parse")]
macro_rules! phf_map_cb {
    ($(#[doc = $s:literal] $id:ident)*) => {
        phf::phf_map! {
            $($s => OpCode::$id),*
        }
    };
}

/// Stringifies identifiers with `paste` so that they are available as
/// literals (plain `stringify!` cannot be expanded inside another macro).
#[cfg(feature = "parse")]
macro_rules! stringify_with_cb {
    ($callback:ident; $($id:ident)*) => { paste::paste! {
        $callback! { $(#[doc = "" $id ""] $id)* }
    }};
}

// The numbering is fixed by the upstream front end; never reorder.
opcodes! {
    0  => NOOP           => stack_io(0, 0);
    1  => PUSH_VAR       => stack_io(0, 1), arg(ArgKind::Var);
    2  => PUSH_IMM       => stack_io(0, 1), arg(ArgKind::Imm);
    3  => STORE          => stack_io(1, 0), arg(ArgKind::Equ);
    4  => ADD            => stack_io(2, 1);
    5  => ADD_VAR        => stack_io(1, 1), arg(ArgKind::Var);
    6  => ADD_IMM        => stack_io(1, 1), arg(ArgKind::Imm);
    7  => SUB            => stack_io(2, 1);
    8  => SUB_VAR        => stack_io(1, 1), arg(ArgKind::Var);
    9  => SUB_IMM        => stack_io(1, 1), arg(ArgKind::Imm);
    10 => MUL            => stack_io(2, 1);
    11 => MUL_VAR        => stack_io(1, 1), arg(ArgKind::Var);
    12 => MUL_IMM        => stack_io(1, 1), arg(ArgKind::Imm);
    13 => DIV            => stack_io(2, 1);
    14 => DIV_VAR        => stack_io(1, 1), arg(ArgKind::Var);
    15 => DIV_IMM        => stack_io(1, 1), arg(ArgKind::Imm);
    16 => UMIN           => stack_io(1, 1);
    17 => UMIN_VAR       => stack_io(0, 1), arg(ArgKind::Var);
    18 => HEADER         => stack_io(0, 0), arg(ArgKind::Len);
    19 => END            => stack_io(0, 0);
    20 => CALL1          => stack_io(1, 1), arg(ArgKind::Func);
    21 => CALL2          => stack_io(2, 1), arg(ArgKind::Func);
    22 => CALLN          => stack_io(1, 1), arg(ArgKind::Func), variadic;
    23 => FUNC_ARG_COUNT => stack_io(0, 0), arg(ArgKind::Count);
    24 => MUL_IMM_ADD    => stack_io(2, 1), arg(ArgKind::Imm);
    25 => PUSH_ZERO      => stack_io(0, 1);
    // Reserved by the front end; rejected by every walker.
    26 => CHK            => stack_io(0, 0);
    27 => ADDO           => stack_io(0, 0);
    28 => PUSHO          => stack_io(0, 0);
    29 => INVOC          => stack_io(0, 0);
    30 => STACKIN        => stack_io(0, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode() {
        let opcode = OpCode::new(ADD).unwrap();
        assert_eq!(opcode.as_str(), "ADD");
        assert_eq!(opcode.get(), 4);
        assert_eq!(opcode.inputs(), 2);
        assert_eq!(opcode.outputs(), 1);
        assert_eq!(opcode.arg_kind(), ArgKind::None);
    }

    #[test]
    fn count_opcodes() {
        let mut opcode_num = 0;
        for _ in OPCODE_INFO.into_iter().flatten() {
            opcode_num += 1;
        }
        assert_eq!(opcode_num, OPCODE_COUNT);
    }

    #[test]
    fn test_numbering_is_frozen() {
        // Spot checks against the front-end numbering.
        assert_eq!(NOOP, 0);
        assert_eq!(PUSH_VAR, 1);
        assert_eq!(STORE, 3);
        assert_eq!(UMIN_VAR, 17);
        assert_eq!(HEADER, 18);
        assert_eq!(MUL_IMM_ADD, 24);
        assert_eq!(PUSH_ZERO, 25);
        assert_eq!(STACKIN, 30);
    }

    #[test]
    fn test_new_invalid_opcodes() {
        assert!(OpCode::new(31).is_none());
        assert!(OpCode::new(63).is_none());
        assert!(OpCode::new(255).is_none());
        assert!(OpCode::from_raw(-1).is_none());
        assert!(OpCode::from_raw(1 << 20).is_none());
    }

    #[test]
    fn test_stack_io_for_various_opcodes() {
        let test_cases = [
            (NOOP, 0, 0),
            (PUSH_VAR, 0, 1),
            (PUSH_IMM, 0, 1),
            (PUSH_ZERO, 0, 1),
            (STORE, 1, 0),
            (ADD, 2, 1),
            (ADD_VAR, 1, 1),
            (ADD_IMM, 1, 1),
            (SUB, 2, 1),
            (MUL, 2, 1),
            (DIV, 2, 1),
            (UMIN, 1, 1),
            (UMIN_VAR, 0, 1),
            (CALL1, 1, 1),
            (CALL2, 2, 1),
            (MUL_IMM_ADD, 2, 1),
        ];

        for (opcode, expected_inputs, expected_outputs) in test_cases {
            let op = OpCode::new(opcode).unwrap();
            assert_eq!(op.inputs(), expected_inputs, "{op} inputs mismatch");
            assert_eq!(op.outputs(), expected_outputs, "{op} outputs mismatch");
        }
    }

    #[test]
    fn test_arg_kinds() {
        assert_eq!(OpCode::PUSH_VAR.arg_kind(), ArgKind::Var);
        assert_eq!(OpCode::PUSH_IMM.arg_kind(), ArgKind::Imm);
        assert_eq!(OpCode::HEADER.arg_kind(), ArgKind::Len);
        assert_eq!(OpCode::STORE.arg_kind(), ArgKind::Equ);
        assert_eq!(OpCode::CALL1.arg_kind(), ArgKind::Func);
        assert_eq!(OpCode::FUNC_ARG_COUNT.arg_kind(), ArgKind::Count);
        assert_eq!(OpCode::UMIN.arg_kind(), ArgKind::None);
    }

    #[test]
    fn test_predicates() {
        assert!(OpCode::PUSH_VAR.is_push());
        assert!(OpCode::UMIN_VAR.is_push());
        assert!(!OpCode::ADD.is_push());
        assert!(OpCode::MUL_VAR.is_var_fold());
        assert!(!OpCode::UMIN_VAR.is_var_fold());
        assert!(OpCode::DIV_IMM.is_imm_fold());
        assert!(OpCode::CHK.is_reserved());
        assert!(OpCode::STACKIN.is_reserved());
        assert!(!OpCode::PUSH_ZERO.is_reserved());
    }

    #[test]
    fn test_variadic() {
        assert!(OpCode::CALLN.info().is_variadic());
        assert!(!OpCode::CALL2.info().is_variadic());
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(format!("{}", OpCode::MUL_IMM_ADD), "MUL_IMM_ADD");
        assert_eq!(format!("{}", OpCode::HEADER), "HEADER");
    }

    #[test]
    fn test_name_by_raw() {
        assert_eq!(OpCode::name_by_raw(4), "ADD");
        assert_eq!(OpCode::name_by_raw(-3), "UNKNOWN");
        assert_eq!(OpCode::name_by_raw(200), "UNKNOWN");
    }

    #[test]
    #[cfg(feature = "parse")]
    fn test_parsing() {
        for raw in 0..OPCODE_COUNT as i32 {
            let op = OpCode::from_raw(raw).unwrap();
            assert_eq!(OpCode::parse(op.as_str()), Some(op));
        }
    }
}
