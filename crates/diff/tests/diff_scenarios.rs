//! End-to-end differentiation scenarios against recorded reference
//! programs.

use diff::{differentiate, DiffError};
use opcode::test_programs::{diff_cases, neg_trunc};
use opcode::{compute_degree, func, Degree, OpCode, Program};

#[test]
fn recorded_scenarios_match() -> anyhow::Result<()> {
    for case in diff_cases() {
        let got = differentiate(&case.input, case.var)?;
        assert_eq!(
            got,
            case.expected,
            "{}:\ngot:\n{}\nexpected:\n{}",
            case.name,
            got.display(),
            case.expected.display()
        );
    }
    Ok(())
}

#[test]
fn outputs_are_well_formed() -> anyhow::Result<()> {
    for case in diff_cases() {
        let got = differentiate(&case.input, case.var)?;
        got.validate()?;
        assert_eq!(got.arg(0), got.len() as i32, "{}", case.name);
        assert_eq!(got.equ_idx(), case.input.equ_idx(), "{}", case.name);
    }
    Ok(())
}

#[test]
fn unrelated_variable_gives_zero_program() -> anyhow::Result<()> {
    for case in diff_cases() {
        // Variable 999 appears nowhere.
        let got = differentiate(&case.input, 999)?;
        got.validate()?;
        assert_eq!(got.len(), 3, "{}", case.name);
        assert_eq!(got.instr(1), OpCode::PUSH_ZERO.raw(), "{}", case.name);
        assert_eq!(got.equ_idx(), case.input.equ_idx(), "{}", case.name);
        assert!(compute_degree(&got)?.is_constant());
    }
    Ok(())
}

#[test]
fn locally_constant_function_discards_derivative() -> anyhow::Result<()> {
    // d(-(trunc(x2)))/dx2 is identically zero.
    let got = differentiate(&neg_trunc(), 2)?;
    got.validate()?;
    assert_eq!(got.len(), 3);
    assert_eq!(got.instr(1), OpCode::PUSH_ZERO.raw());
    assert_eq!(got.equ_idx(), Some(1));
    Ok(())
}

#[test]
fn floor_ceil_round_sign_all_discard() -> anyhow::Result<()> {
    for f in [func::FLOOR, func::CEIL, func::ROUND, func::SIGN] {
        let input = Program::from_ops(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::CALL1, f as i32),
            (OpCode::UMIN, 0),
            (OpCode::STORE, 4),
        ]);
        let got = differentiate(&input, 2)?;
        got.validate()?;
        assert_eq!(got.len(), 3);
        assert_eq!(got.instr(1), OpCode::PUSH_ZERO.raw());
        assert_eq!(got.equ_idx(), Some(4));
    }
    Ok(())
}

#[test]
fn abs_emits_sign_selector() -> anyhow::Result<()> {
    let input = Program::from_ops(&[
        (OpCode::HEADER, 4),
        (OpCode::PUSH_VAR, 1),
        (OpCode::CALL1, func::ABS as i32),
        (OpCode::STORE, 1),
    ]);
    let got = differentiate(&input, 1)?;
    got.validate()?;
    // ifthen(x1 >= 0, 1, -1) * 1
    let raws = got.instrs();
    assert!(raws.contains(&OpCode::CALLN.raw()));
    assert!(raws.contains(&OpCode::FUNC_ARG_COUNT.raw()));
    let calln_pos = raws.iter().position(|&r| r == OpCode::CALLN.raw()).unwrap();
    assert_eq!(got.arg(calln_pos), func::IFTHEN as i32);
    Ok(())
}

#[test]
fn power_with_variable_exponent_uses_log_rule() -> anyhow::Result<()> {
    // d(x1 ** x2)/dx1 where both sides carry the variable: x1 ** x1.
    let input = Program::from_ops(&[
        (OpCode::HEADER, 5),
        (OpCode::PUSH_VAR, 1),
        (OpCode::PUSH_VAR, 1),
        (OpCode::CALL2, func::RPOWER as i32),
        (OpCode::STORE, 1),
    ]);
    let got = differentiate(&input, 1)?;
    got.validate()?;
    let raws = got.instrs();
    // The template invokes log(u) and re-evaluates the power itself.
    assert!(raws.contains(&OpCode::CALL2.raw()));
    let log_pos = raws
        .iter()
        .zip(got.args())
        .position(|(&r, &a)| r == OpCode::CALL1.raw() && a == func::LOG as i32);
    assert!(log_pos.is_some());
    Ok(())
}

#[test]
fn constant_base_power_uses_cvpower_rule() -> anyhow::Result<()> {
    // d(2 ** x1)/dx1 = 2**x1 * ln(2)
    let input = Program::from_ops(&[
        (OpCode::HEADER, 5),
        (OpCode::PUSH_IMM, 6),
        (OpCode::PUSH_VAR, 1),
        (OpCode::CALL2, func::CVPOWER as i32),
        (OpCode::STORE, 1),
    ]);
    let got = differentiate(&input, 1)?;
    got.validate()?;
    assert!(!compute_degree(&got)?.is_constant());
    Ok(())
}

#[test]
fn variadic_calls_are_rejected() {
    let input = Program::from_ops(&[
        (OpCode::HEADER, 7),
        (OpCode::PUSH_VAR, 1),
        (OpCode::PUSH_IMM, 1),
        (OpCode::PUSH_IMM, 1),
        (OpCode::FUNC_ARG_COUNT, 3),
        (OpCode::CALLN, func::IFTHEN as i32),
        (OpCode::STORE, 1),
    ]);
    assert_eq!(
        differentiate(&input, 1),
        Err(DiffError::UnsupportedVariadic {
            op: OpCode::FUNC_ARG_COUNT
        })
    );
}

#[test]
fn unsupported_call1_is_rejected() {
    let input = Program::from_ops(&[
        (OpCode::HEADER, 4),
        (OpCode::PUSH_VAR, 1),
        (OpCode::CALL1, func::GAMMA as i32),
        (OpCode::STORE, 1),
    ]);
    let err = differentiate(&input, 1).unwrap_err();
    assert_eq!(
        err,
        DiffError::UnsupportedCall1 {
            func: func::GAMMA as i32
        }
    );
    assert!(err.to_string().contains("gamma"));
}

#[test]
fn unsupported_call1_on_constant_argument_is_fine() -> anyhow::Result<()> {
    // gamma(2) does not involve the variable, so no template is needed.
    let input = Program::from_ops(&[
        (OpCode::HEADER, 5),
        (OpCode::PUSH_IMM, 6),
        (OpCode::CALL1, func::GAMMA as i32),
        (OpCode::ADD_VAR, 1),
        (OpCode::STORE, 1),
    ]);
    let got = differentiate(&input, 1)?;
    got.validate()?;
    assert!(compute_degree(&got)?.is_constant());
    Ok(())
}

#[test]
fn unsupported_call2_is_rejected() {
    let input = Program::from_ops(&[
        (OpCode::HEADER, 6),
        (OpCode::PUSH_VAR, 1),
        (OpCode::PUSH_VAR, 2),
        (OpCode::CALL2, func::ARCTAN2 as i32),
        (OpCode::UMIN, 0),
        (OpCode::STORE, 1),
    ]);
    assert_eq!(
        differentiate(&input, 1),
        Err(DiffError::UnsupportedCall2 {
            func: func::ARCTAN2 as i32
        })
    );
}

#[test]
fn malformed_input_is_rejected() {
    let input = Program::from_ops(&[
        (OpCode::HEADER, 4),
        (OpCode::PUSH_VAR, 1),
        (OpCode::PUSH_VAR, 2),
        (OpCode::STORE, 1),
    ]);
    assert!(matches!(
        differentiate(&input, 1),
        Err(DiffError::Malformed(_))
    ));
}

#[test]
fn derivative_degree_drops_for_polynomials() -> anyhow::Result<()> {
    // -(x2*x2) has degree 2; its derivative is affine.
    let case = &diff_cases()[0];
    assert_eq!(compute_degree(&case.input)?.as_poly(), Some(2));
    assert_eq!(compute_degree(&case.expected)?, Degree::LINEAR);
    Ok(())
}
