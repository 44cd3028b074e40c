//! Cross-component scenarios: programs through the tree IR and the
//! differentiator together.

use opcode::test_programs::{self, diff_cases};
use opcode::{compute_degree, OpTree};
use primitives::Pool;
use tree::{PoolBinding, Tree};

#[test]
fn tree_roundtrip_commutes_with_differentiation() -> anyhow::Result<()> {
    // Importing a program into the IR and re-emitting it must not change
    // what the differentiator produces.
    for case in diff_cases() {
        let reemitted = Tree::from_program(&case.input)?.to_program()?;
        let direct = diff::differentiate(&case.input, case.var)?;
        let via_tree = diff::differentiate(&reemitted, case.var)?;
        assert_eq!(via_tree, direct, "{}", case.name);
    }
    Ok(())
}

#[test]
fn derivative_programs_import_cleanly() -> anyhow::Result<()> {
    for case in diff_cases() {
        let tree = Tree::from_program(&case.expected)?;
        let back = tree.to_program()?;
        back.validate()?;
        assert_eq!(back.equ_idx(), case.expected.equ_idx(), "{}", case.name);
    }
    Ok(())
}

#[test]
fn numeric_derivative_matches_symbolic() -> anyhow::Result<()> {
    // Central finite differences agree with the emitted derivative
    // programs at a handful of points.
    let pool = Pool::new().into_shared();
    let points: [&[f64]; 3] = [&[0., 0.7, 1.3], &[0., -0.4, 2.1], &[0., 1.9, 0.2]];
    let h = 1e-6;

    for case in diff_cases() {
        let f = Tree::from_program(&case.input)?;
        let df = Tree::from_program(&diff::differentiate(&case.input, case.var)?)?;
        let vi = case.var as usize - 1;

        for point in points {
            let mut lo = point.to_vec();
            let mut hi = point.to_vec();
            lo[vi] -= h;
            hi[vi] += h;

            let f_lo = f.evaluate(&PoolBinding::new(&lo, pool.clone()))?;
            let f_hi = f.evaluate(&PoolBinding::new(&hi, pool.clone()))?;
            let numeric = (f_hi - f_lo) / (2. * h);
            let symbolic = df.evaluate(&PoolBinding::new(point, pool.clone()))?;

            assert!(
                (numeric - symbolic).abs() < 1e-4 * (1. + symbolic.abs()),
                "{} at {point:?}: numeric {numeric} vs symbolic {symbolic}",
                case.name
            );
        }
    }
    Ok(())
}

#[test]
fn substitution_matches_direct_evaluation() -> anyhow::Result<()> {
    // Replacing x3 by (x2 + 1) in -(x2/(1+x3)) then evaluating equals
    // evaluating the original with x3 = x2 + 1.
    let mut tree = Tree::from_program(&test_programs::neg_quotient())?;
    let pool = Pool::new().into_shared();

    let mut sub = Tree::new();
    {
        use tree::{OpArg, OpClass};
        let x2 = sub.alloc_leaf(OpClass::Var, 2);
        let add = sub.alloc_node(OpClass::Add, 1);
        sub.node_mut(add).arg = OpArg::Cst(opcode::nlconst::ONE);
        sub.set_child(add, 0, Some(x2));
        sub.set_root(Some(add));
    }

    tree.replace_var_by_tree(3, &sub)?;

    for x2 in [0.5, 2., -0.25] {
        let substituted = tree.evaluate(&PoolBinding::new(&[0., x2, 999.], pool.clone()))?;
        let direct = Tree::from_program(&test_programs::neg_quotient())?
            .evaluate(&PoolBinding::new(&[0., x2, x2 + 1.], pool.clone()))?;
        assert!((substituted - direct).abs() < 1e-12);
    }
    Ok(())
}

#[test]
fn rename_then_emit_shifts_variables() -> anyhow::Result<()> {
    let tree = Tree::from_program(&test_programs::neg_sum_of_products())?;
    // x2 -> x12, x3 -> x13.
    let rosetta = [0, 12, 13];
    let renamed = tree.dup_rosetta(&rosetta);
    let out = renamed.to_program()?;
    out.validate()?;

    for pos in 0..out.len() {
        if let Some(op) = out.opcode(pos) {
            if op.references_var() {
                assert!(out.arg(pos) >= 12, "variable left unmapped at {pos}");
            }
        }
    }
    Ok(())
}

#[test]
fn degree_survives_the_tree_roundtrip() -> anyhow::Result<()> {
    for program in test_programs::all_programs() {
        let back = Tree::from_program(&program)?.to_program()?;
        assert_eq!(compute_degree(&back)?, compute_degree(&program)?);
    }
    Ok(())
}

#[test]
fn optree_and_tree_agree_on_reemission() -> anyhow::Result<()> {
    // The CSR view re-emits the exact source; the IR may canonicalise, but
    // both outputs must differentiate identically.
    for case in diff_cases() {
        let otree_out = OpTree::new(&case.input)?.to_program();
        assert_eq!(otree_out, case.input, "{}", case.name);

        let tree_out = Tree::from_program(&case.input)?.to_program()?;
        assert_eq!(
            diff::differentiate(&tree_out, case.var)?,
            diff::differentiate(&case.input, case.var)?,
            "{}",
            case.name
        );
    }
    Ok(())
}
