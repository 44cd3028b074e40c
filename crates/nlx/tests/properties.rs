//! Workspace-level invariants tying the crates together.

use nlx::opcode::test_programs::{self, diff_cases};
use nlx::opcode::{compute_degree, Degree, OpCode};
use nlx::{differentiate, OpTree, Program, Tree};

#[test]
fn fixtures_are_well_formed() -> anyhow::Result<()> {
    for program in test_programs::all_programs() {
        program.validate()?;
        assert_eq!(program.arg(0), program.len() as i32);
        assert_eq!(program.instr(0), OpCode::HEADER.raw());
        assert_eq!(
            program.instr(program.len() - 1),
            OpCode::STORE.raw()
        );
    }
    Ok(())
}

#[test]
fn derivatives_are_well_formed_and_keep_the_equation() -> anyhow::Result<()> {
    for case in diff_cases() {
        let d = differentiate(&case.input, case.var)?;
        d.validate()?;
        assert_eq!(d.equ_idx(), case.input.equ_idx(), "{}", case.name);
        assert_eq!(d, case.expected, "{}", case.name);
    }
    Ok(())
}

#[test]
fn tree_emission_is_idempotent() -> anyhow::Result<()> {
    for program in test_programs::all_programs() {
        let once = Tree::from_program(&program)?.to_program()?;
        once.validate()?;
        let twice = Tree::from_program(&once)?.to_program()?;
        assert_eq!(twice, once);
    }
    Ok(())
}

#[test]
fn optree_reemission_is_exact() -> anyhow::Result<()> {
    for program in test_programs::all_programs() {
        let otree = OpTree::new(&program)?;
        assert_eq!(otree.to_program(), program);
    }
    Ok(())
}

#[test]
fn degree_classes() -> anyhow::Result<()> {
    for program in test_programs::linear_programs() {
        assert_eq!(compute_degree(&program)?, Degree::LINEAR);
    }

    // No variable reference at all: degree zero.
    let constant = Program::from_ops(&[
        (OpCode::HEADER, 4),
        (OpCode::PUSH_IMM, 1),
        (OpCode::ADD_IMM, 6),
        (OpCode::STORE, 1),
    ]);
    assert!(compute_degree(&constant)?.is_constant());

    // A product of two variable-degree subterms is at least quadratic.
    assert_eq!(
        compute_degree(&test_programs::neg_square())?.as_poly(),
        Some(2)
    );
    assert_eq!(
        compute_degree(&test_programs::neg_sum_of_products())?.as_poly(),
        Some(2)
    );

    // Any CALL1 other than sqr on a non-constant is fully nonlinear.
    assert!(compute_degree(&test_programs::neg_log())?.is_fully_nonlinear());
    assert!(compute_degree(&test_programs::neg_square_plus_exp())?.is_fully_nonlinear());

    Ok(())
}
