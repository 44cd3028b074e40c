//! Opcode fixtures shared between this crate's tests and the sibling
//! crates' suites. Enabled with the `test-programs` feature.
//!
//! The derivative cases pair an input program and a variable with the
//! reference derivative program.

use crate::{func, OpCode, Program};

/// A differentiation scenario with its recorded reference output.
#[derive(Debug)]
pub struct DiffCase {
    /// Human-readable description of the expression and variable.
    pub name: &'static str,
    /// Input program.
    pub input: Program,
    /// 1-based index of the variable to differentiate by.
    pub var: i32,
    /// Expected derivative program.
    pub expected: Program,
}

/// `-(x2*x2)`, equation 1.
pub fn neg_square() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 5),
        (OpCode::PUSH_VAR, 2),
        (OpCode::MUL_VAR, 2),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(x2*x2 + x2*x3)`.
pub fn neg_sum_of_products() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 8),
        (OpCode::PUSH_VAR, 2),
        (OpCode::MUL_VAR, 2),
        (OpCode::PUSH_VAR, 2),
        (OpCode::MUL_VAR, 3),
        (OpCode::ADD, 0),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(x2*x2 + exp(x2))`.
pub fn neg_square_plus_exp() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 8),
        (OpCode::PUSH_VAR, 2),
        (OpCode::MUL_VAR, 2),
        (OpCode::PUSH_VAR, 2),
        (OpCode::CALL1, func::EXP as i32),
        (OpCode::ADD, 0),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(3*x2**2)`, the exponent from the reserved pool slot for 2.
pub fn neg_scaled_power() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 7),
        (OpCode::PUSH_VAR, 2),
        (OpCode::PUSH_IMM, 6),
        (OpCode::CALL2, func::RPOWER as i32),
        (OpCode::MUL_IMM, 15),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(3*x2**2 + exp(x2*x3))`.
pub fn neg_power_plus_exp_product() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 11),
        (OpCode::PUSH_VAR, 2),
        (OpCode::PUSH_IMM, 6),
        (OpCode::CALL2, func::RPOWER as i32),
        (OpCode::MUL_IMM, 15),
        (OpCode::PUSH_VAR, 2),
        (OpCode::MUL_VAR, 3),
        (OpCode::CALL1, func::EXP as i32),
        (OpCode::ADD, 0),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(x2/(1 + x3))`.
pub fn neg_quotient() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 7),
        (OpCode::PUSH_VAR, 2),
        (OpCode::PUSH_IMM, 1),
        (OpCode::ADD_VAR, 3),
        (OpCode::DIV, 0),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `-(log(1 + x2))`.
pub fn neg_log() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 6),
        (OpCode::PUSH_IMM, 1),
        (OpCode::ADD_VAR, 2),
        (OpCode::CALL1, func::LOG as i32),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// `sqr(x1)*2 + sqr(x2)*2`, ending in the fused multiply-add.
pub fn sqr_fma_chain() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 8),
        (OpCode::PUSH_VAR, 1),
        (OpCode::CALL1, func::SQR as i32),
        (OpCode::MUL_IMM, 6),
        (OpCode::PUSH_VAR, 2),
        (OpCode::CALL1, func::SQR as i32),
        (OpCode::MUL_IMM_ADD, 6),
        (OpCode::STORE, 1),
    ])
}

/// `-(trunc(x2))`.
pub fn neg_trunc() -> Program {
    Program::from_ops(&[
        (OpCode::HEADER, 5),
        (OpCode::PUSH_VAR, 2),
        (OpCode::CALL1, func::TRUNC as i32),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ])
}

/// Linear fixtures for the degree analyser: `x1`, `x1 + x2` (two shapes)
/// and `1 + 2*x1 + x2 + x3`.
pub fn linear_programs() -> Vec<Program> {
    vec![
        Program::from_ops(&[
            (OpCode::HEADER, 3),
            (OpCode::PUSH_VAR, 1),
            (OpCode::STORE, 1),
        ]),
        Program::from_ops(&[
            (OpCode::HEADER, 4),
            (OpCode::PUSH_VAR, 1),
            (OpCode::ADD_VAR, 2),
            (OpCode::STORE, 1),
        ]),
        Program::from_ops(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 1),
            (OpCode::PUSH_VAR, 2),
            (OpCode::ADD, 0),
            (OpCode::STORE, 1),
        ]),
        Program::from_ops(&[
            (OpCode::HEADER, 7),
            (OpCode::PUSH_IMM, 1),
            (OpCode::PUSH_VAR, 1),
            (OpCode::MUL_IMM, 6),
            (OpCode::ADD, 0),
            (OpCode::ADD_VAR, 2),
            (OpCode::ADD_VAR, 3),
            (OpCode::STORE, 1),
        ]),
    ]
}

/// Every program fixture, for walks that only need valid inputs.
pub fn all_programs() -> Vec<Program> {
    let mut v = vec![
        neg_square(),
        neg_sum_of_products(),
        neg_square_plus_exp(),
        neg_scaled_power(),
        neg_power_plus_exp_product(),
        neg_quotient(),
        neg_log(),
        sqr_fma_chain(),
        neg_trunc(),
    ];
    v.extend(linear_programs());
    v
}

/// The recorded differentiation scenarios.
pub fn diff_cases() -> Vec<DiffCase> {
    vec![
        DiffCase {
            name: "d(-(x2*x2))/dx2",
            input: neg_square(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 7),
                (OpCode::PUSH_IMM, 1),
                (OpCode::MUL_VAR, 2),
                (OpCode::PUSH_VAR, 2),
                (OpCode::ADD, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(x2*x2 + x2*x3))/dx2",
            input: neg_sum_of_products(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 10),
                (OpCode::PUSH_IMM, 1),
                (OpCode::MUL_VAR, 2),
                (OpCode::PUSH_VAR, 2),
                (OpCode::ADD, 0),
                (OpCode::PUSH_IMM, 1),
                (OpCode::MUL_VAR, 3),
                (OpCode::ADD, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(x2*x2 + exp(x2)))/dx2",
            input: neg_square_plus_exp(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 12),
                (OpCode::PUSH_IMM, 1),
                (OpCode::MUL_VAR, 2),
                (OpCode::PUSH_VAR, 2),
                (OpCode::ADD, 0),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_VAR, 2),
                (OpCode::CALL1, func::EXP as i32),
                (OpCode::MUL, 0),
                (OpCode::ADD, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(3*x2**2))/dx2",
            input: neg_scaled_power(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 12),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_IMM, 6),
                (OpCode::MUL, 0),
                (OpCode::PUSH_VAR, 2),
                (OpCode::PUSH_IMM, 6),
                (OpCode::SUB_IMM, 1),
                (OpCode::CALL2, func::RPOWER as i32),
                (OpCode::MUL, 0),
                (OpCode::MUL_IMM, 15),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(3*x2**2 + exp(x2*x3)))/dx2",
            input: neg_power_plus_exp_product(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 19),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_IMM, 6),
                (OpCode::MUL, 0),
                (OpCode::PUSH_VAR, 2),
                (OpCode::PUSH_IMM, 6),
                (OpCode::SUB_IMM, 1),
                (OpCode::CALL2, func::RPOWER as i32),
                (OpCode::MUL, 0),
                (OpCode::MUL_IMM, 15),
                (OpCode::PUSH_IMM, 1),
                (OpCode::MUL_VAR, 3),
                (OpCode::PUSH_VAR, 2),
                (OpCode::MUL_VAR, 3),
                (OpCode::CALL1, func::EXP as i32),
                (OpCode::MUL, 0),
                (OpCode::ADD, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(x2/(1+x3)))/dx3",
            input: neg_quotient(),
            var: 3,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 11),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_VAR, 2),
                (OpCode::MUL, 0),
                (OpCode::UMIN, 0),
                (OpCode::PUSH_IMM, 1),
                (OpCode::ADD_VAR, 3),
                (OpCode::CALL1, func::SQR as i32),
                (OpCode::DIV, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
        DiffCase {
            name: "d(-(log(1+x2)))/dx2",
            input: neg_log(),
            var: 2,
            expected: Program::from_ops(&[
                (OpCode::HEADER, 9),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_IMM, 1),
                (OpCode::PUSH_IMM, 1),
                (OpCode::ADD_VAR, 2),
                (OpCode::DIV, 0),
                (OpCode::MUL, 0),
                (OpCode::UMIN, 0),
                (OpCode::STORE, 1),
            ]),
        },
    ]
}
