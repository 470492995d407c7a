use std::sync::Arc;

use oryx::expr::same_expr;
use oryx::prelude::*;
use oryx::solver::ConstraintManager;
use oryx::state::Solver;

fn setup() -> (Arc<ExprBuilder>, Solver) {
    let builder = Arc::new(ExprBuilder::new());
    let solver = Solver::new(builder.clone(), Arc::new(Z3Backend));
    (builder, solver)
}

#[test]
fn dependency_closure_follows_shared_symbols() {
    let b = ExprBuilder::new();
    let a = b.mk_sym("a", 32);
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);
    let z = b.mk_sym("z", 32);

    let mut mgr = ConstraintManager::new();
    // a ~ x, x ~ y; z stays on its own
    mgr.add(&b.mk_ult(&a, &x));
    mgr.add(&b.mk_ult(&x, &y));
    mgr.add(&b.mk_ult(&z, &b.mk_uconst(5, 32)));

    let deps = mgr.dependencies(&a);
    let ids: Vec<u32> = deps.iter().copied().collect();
    let id = |s: &ExprRef| s.as_sym().unwrap().0;
    assert!(ids.contains(&id(&a)));
    assert!(ids.contains(&id(&x)));
    assert!(ids.contains(&id(&y)));
    assert!(!ids.contains(&id(&z)));
}

#[test]
fn pi_collects_exactly_the_closure() {
    let b = ExprBuilder::new();
    let a = b.mk_sym("a", 32);
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);
    let z = b.mk_sym("z", 32);

    let c1 = b.mk_ult(&a, &x);
    let c2 = b.mk_ult(&x, &y);
    let c3 = b.mk_ult(&z, &b.mk_uconst(5, 32));

    let mut mgr = ConstraintManager::new();
    mgr.add(&c1);
    mgr.add(&c2);
    mgr.add(&c3);

    let scoped = mgr.pi(&b, Some(&a));
    assert!(same_expr(&scoped, &b.mk_bool_and(&c1, &c2)));

    let full = mgr.pi(&b, None);
    assert!(same_expr(
        &full,
        &b.mk_bool_and(&b.mk_bool_and(&c1, &c2), &c3)
    ));
}

#[test]
fn pi_deduplicates_shared_constraints() {
    let b = ExprBuilder::new();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);

    // one constraint indexed under both symbols
    let c = b.mk_ult(&x, &y);
    let mut mgr = ConstraintManager::new();
    mgr.add(&c);

    assert!(same_expr(&mgr.pi(&b, None), &c));
    assert_eq!(mgr.all_constraints().len(), 1);
}

#[test]
fn adding_a_constraint_invalidates_dependent_model_entries() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);
    let x_id = x.as_sym().unwrap().0;
    let y_id = y.as_sym().unwrap().0;

    solver.add(&b.mk_ugt(&x, &b.mk_uconst(10, 32)));
    solver.add(&b.mk_ult(&y, &b.mk_uconst(10, 32)));
    assert_eq!(solver.satisfiable(), CheckResult::Sat);
    assert!(solver.model_value(x_id).is_some());
    assert!(solver.model_value(y_id).is_some());

    // touches x only: y's entry survives
    solver.add(&b.mk_ult(&x, &b.mk_uconst(100, 32)));
    assert!(solver.model_value(x_id).is_none());
    assert!(solver.model_value(y_id).is_some());
}

#[test]
fn unsatisfiable_paths_are_detected() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 8);

    solver.add(&b.mk_ult(&x, &b.mk_uconst(5, 8)));
    solver.add(&b.mk_ugt(&x, &b.mk_uconst(9, 8)));
    assert_eq!(solver.satisfiable(), CheckResult::Unsat);
    assert!(solver.evaluate(&x).is_none());
}

#[test]
fn may_be_true_does_not_commit() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 8);
    let small = b.mk_ult(&x, &b.mk_uconst(5, 8));
    let large = b.mk_ugt(&x, &b.mk_uconst(9, 8));

    assert_eq!(solver.may_be_true(&small), CheckResult::Sat);
    // nothing was added: the contradicting guess is still possible
    assert_eq!(solver.may_be_true(&large), CheckResult::Sat);
}

#[test]
fn check_sat_and_add_commits_on_sat() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 8);
    let small = b.mk_ult(&x, &b.mk_uconst(5, 8));
    let large = b.mk_ugt(&x, &b.mk_uconst(9, 8));

    assert_eq!(solver.check_sat_and_add_if_sat(&small), CheckResult::Sat);
    // now the constraint is part of the path
    assert_eq!(solver.may_be_true(&large), CheckResult::Unsat);

    // a failing check leaves the store unchanged
    assert_eq!(solver.check_sat_and_add_if_sat(&large), CheckResult::Unsat);
    assert_eq!(solver.satisfiable(), CheckResult::Sat);
}

#[test]
fn evaluate_honors_constraints_and_completes_with_zero() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 32);
    let free = b.mk_sym("free", 32);

    let forty_two = b.mk_uconst(42, 32);
    solver.add(&b.mk_eq(&x, &forty_two));

    assert_eq!(solver.evaluate(&x).unwrap().as_u64(), 42);
    assert_eq!(solver.evaluate(&free).unwrap().as_u64(), 0);

    let doubled = b.mk_mul(&x, &b.mk_uconst(2, 32));
    assert_eq!(solver.evaluate(&doubled).unwrap().as_u64(), 84);
}

#[test]
fn evaluate_upto_enumerates_distinct_values() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 8);
    solver.add(&b.mk_ult(&x, &b.mk_uconst(3, 8)));

    let mut values: Vec<u64> = solver
        .evaluate_upto(&x, 10)
        .unwrap()
        .into_iter()
        .map(|v| v.as_u64())
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2]);

    let capped = solver.evaluate_upto(&x, 2).unwrap();
    assert_eq!(capped.len(), 2);
}

#[test]
fn solver_clone_forks_the_path_condition() {
    let (b, mut solver) = setup();
    let x = b.mk_sym("x", 8);

    solver.add(&b.mk_ult(&x, &b.mk_uconst(10, 8)));
    let mut fork = solver.clone();

    let zero = b.mk_uconst(0, 8);
    fork.add(&b.mk_eq(&x, &zero));
    solver.add(&b.mk_neq(&x, &zero));

    assert_eq!(fork.evaluate(&x).unwrap().as_u64(), 0);
    assert_ne!(solver.evaluate(&x).unwrap().as_u64(), 0);
}
