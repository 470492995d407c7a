use oryx::expr::{evaluate, same_expr};
use oryx::prelude::*;

use std::collections::HashMap;

fn builder() -> ExprBuilder {
    ExprBuilder::new()
}

#[test]
fn symbols_are_stable_and_named() {
    let b = builder();
    let s = b.mk_sym("sym", 32);
    assert_eq!(s.width(), 32);
    assert_eq!(s.as_sym().unwrap().1, "sym");
    assert_eq!(b.sym_id("sym"), Some(s.as_sym().unwrap().0));

    let again = b.mk_sym("sym", 32);
    assert!(same_expr(&s, &again));
}

#[test]
fn interning_gives_one_node_per_structure() {
    let b = builder();
    let build = |b: &ExprBuilder| {
        let s = b.mk_sym("sym", 32);
        let s1 = b.mk_sym("sym1", 32);
        let sum = b.mk_add(&s, &s1);
        b.mk_sub(&sum, &b.mk_uconst(42, 32))
    };
    let e1 = build(&b);
    let e2 = build(&b);
    assert!(same_expr(&e1, &e2));
}

#[test]
fn constant_folding_is_total_on_closed_expressions() {
    let b = builder();
    for width in [1u32, 8, 16, 32, 64, 128] {
        let x = b.mk_const(BvConst::new(21, width));
        let y = b.mk_const(BvConst::new(3, width));

        for e in [
            b.mk_add(&x, &y),
            b.mk_sub(&x, &y),
            b.mk_mul(&x, &y),
            b.mk_udiv(&x, &y),
            b.mk_sdiv(&x, &y),
            b.mk_urem(&x, &y),
            b.mk_srem(&x, &y),
            b.mk_and(&x, &y),
            b.mk_or(&x, &y),
            b.mk_xor(&x, &y),
            b.mk_shl(&x, &y),
            b.mk_lshr(&x, &y),
            b.mk_ashr(&x, &y),
            b.mk_neg(&x),
            b.mk_not(&x),
            b.mk_zext(&x, width + 8),
            b.mk_sext(&x, width + 8),
            b.mk_extract(&x, width - 1, 0),
            b.mk_concat(&x, &y),
        ] {
            assert!(e.is_const(), "width {width}: {e} did not fold");
        }

        for e in [
            b.mk_eq(&x, &y),
            b.mk_ult(&x, &y),
            b.mk_ule(&x, &y),
            b.mk_ugt(&x, &y),
            b.mk_uge(&x, &y),
            b.mk_slt(&x, &y),
            b.mk_sle(&x, &y),
            b.mk_sgt(&x, &y),
            b.mk_sge(&x, &y),
        ] {
            assert!(e.is_const(), "width {width}: comparison did not fold");
        }
    }
}

#[test]
fn width_rules() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);

    assert_eq!(b.mk_add(&x, &y).width(), 32);
    assert_eq!(b.mk_concat(&x, &y).width(), 64);
    assert_eq!(b.mk_extract(&x, 15, 8).width(), 8);
    assert_eq!(b.mk_zext(&x, 64).width(), 64);
    assert_eq!(b.mk_sext(&x, 48).width(), 48);
    assert_eq!(b.mk_ite(&b.mk_eq(&x, &y), &x, &y).width(), 32);
    assert_eq!(b.sign_bit(&x).width(), 1);
    assert_eq!(b.mk_eq(&x, &y).sort(), Sort::Bool);
}

#[test]
fn identity_and_annihilator_rewrites() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let zero = b.mk_uconst(0, 32);
    let one = b.mk_uconst(1, 32);
    let ones = b.mk_const(BvConst::new(0, 32).not());

    assert!(same_expr(&b.mk_add(&x, &zero), &x));
    assert!(same_expr(&b.mk_mul(&x, &one), &x));
    assert!(same_expr(&b.mk_and(&x, &ones), &x));
    assert!(same_expr(&b.mk_or(&x, &zero), &x));
    assert!(same_expr(&b.mk_xor(&x, &zero), &x));
    assert!(same_expr(&b.mk_shl(&x, &zero), &x));
    assert!(same_expr(&b.mk_lshr(&x, &zero), &x));
    assert!(same_expr(&b.mk_ashr(&x, &zero), &x));
    assert!(same_expr(&b.mk_zext(&x, 32), &x));
    assert!(same_expr(&b.mk_sext(&x, 32), &x));
    assert!(same_expr(&b.mk_extract(&x, 31, 0), &x));

    assert!(b.mk_mul(&x, &zero).as_const().unwrap().is_zero());
    assert!(b.mk_and(&x, &zero).as_const().unwrap().is_zero());
    assert!(b.mk_or(&x, &ones).as_const().unwrap().has_all_bits());
    assert!(b.mk_xor(&x, &x).as_const().unwrap().is_zero());
    assert!(b.mk_sub(&x, &x).as_const().unwrap().is_zero());
}

#[test]
fn sub_canonicalizes_through_add_and_cancels() {
    let b = builder();
    let s1 = b.mk_sym("s1", 32);
    let s2 = b.mk_sym("s2", 32);
    let s3 = b.mk_sym("s3", 32);

    // s1 + (s2 + (s3 - s1)) == s2 + s3
    let e = b.mk_add(&s1, &b.mk_add(&s2, &b.mk_sub(&s3, &s1)));
    assert!(same_expr(&e, &b.mk_add(&s2, &s3)));
}

#[test]
fn commutative_operands_intern_to_one_node() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);

    assert!(same_expr(&b.mk_add(&x, &y), &b.mk_add(&y, &x)));
    assert!(same_expr(&b.mk_mul(&x, &y), &b.mk_mul(&y, &x)));
    assert!(same_expr(&b.mk_eq(&x, &y), &b.mk_eq(&y, &x)));
}

#[test]
fn double_negations_vanish() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let p = b.mk_ult(&x, &b.mk_uconst(5, 32));

    assert!(same_expr(&b.mk_neg(&b.mk_neg(&x)), &x));
    assert!(same_expr(&b.mk_not(&b.mk_not(&x)), &x));
    assert!(same_expr(&b.mk_bool_not(&b.mk_bool_not(&p)), &p));
}

#[test]
fn ite_simplifies_on_constant_or_equal_arms() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);

    assert!(same_expr(&b.mk_ite(&b.mk_true(), &x, &y), &x));
    assert!(same_expr(&b.mk_ite(&b.mk_false(), &x, &y), &y));

    let p = b.mk_ult(&x, &y);
    assert!(same_expr(&b.mk_ite(&p, &x, &x), &x));
}

#[test]
fn extract_through_concat_keeps_only_touched_children() {
    let b = builder();
    let hi = b.mk_sym("hi", 16);
    let lo = b.mk_sym("lo", 16);
    let cat = b.mk_concat(&hi, &lo);

    assert!(same_expr(&b.mk_extract(&cat, 15, 0), &lo));
    assert!(same_expr(&b.mk_extract(&cat, 31, 16), &hi));
    assert!(same_expr(&b.mk_extract(&cat, 11, 4), &b.mk_extract(&lo, 11, 4)));
}

#[test]
fn nested_extract_composes_offsets() {
    let b = builder();
    let x = b.mk_sym("x", 64);
    let outer = b.mk_extract(&b.mk_extract(&x, 47, 16), 15, 8);
    assert!(same_expr(&outer, &b.mk_extract(&x, 31, 24)));
}

#[test]
fn sdiv_by_itself_is_one() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let q = b.mk_sdiv(&x, &x);
    assert_eq!(q.as_const().unwrap().as_u64(), 1);
}

#[test]
fn bool_connectives_normalize() {
    let b = builder();
    let x = b.mk_sym("x", 8);
    let p = b.mk_ult(&x, &b.mk_uconst(3, 8));
    let q = b.mk_ugt(&x, &b.mk_uconst(9, 8));

    assert!(same_expr(&b.mk_bool_and(&p, &b.mk_true()), &p));
    assert_eq!(b.mk_bool_and(&p, &b.mk_false()).as_bool_const(), Some(false));
    assert!(same_expr(&b.mk_bool_or(&p, &b.mk_false()), &p));
    assert_eq!(b.mk_bool_or(&p, &b.mk_true()).as_bool_const(), Some(true));

    // flattening plus identity-sorting makes grouping irrelevant
    let pq_r = b.mk_bool_and(&b.mk_bool_and(&p, &q), &p);
    let p_qr = b.mk_bool_and(&p, &b.mk_bool_and(&q, &p));
    assert!(same_expr(&pq_r, &p_qr));
}

#[test]
fn bool_bv_round_trip_unwraps() {
    let b = builder();
    let x = b.mk_sym("x", 8);
    let p = b.mk_ult(&x, &b.mk_uconst(3, 8));

    let bit = b.bool_to_bv(&p);
    assert_eq!(bit.width(), 1);
    assert!(same_expr(&b.bv_to_bool(&bit), &p));

    let widened = b.mk_zext(&bit, 8);
    assert!(same_expr(&b.bv_to_bool(&widened), &p));
}

#[test]
fn comparison_constant_folding() {
    let b = builder();
    let minus_ten = b.mk_const(BvConst::new(10, 8).neg());
    let zero = b.mk_uconst(0, 8);
    assert_eq!(b.mk_sgt(&minus_ten, &zero).as_bool_const(), Some(false));
    assert_eq!(b.mk_ugt(&minus_ten, &zero).as_bool_const(), Some(true));
}

#[test]
fn evaluate_substitutes_and_folds() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let y = b.mk_sym("y", 32);
    let e = b.mk_add(&b.mk_mul(&x, &b.mk_uconst(2, 32)), &y);

    let mut assignment = HashMap::new();
    assignment.insert(x.as_sym().unwrap().0, BvConst::new(20, 32));
    assignment.insert(y.as_sym().unwrap().0, BvConst::new(2, 32));

    let val = evaluate(&b, &e, &assignment, false);
    assert_eq!(val.as_const().unwrap().as_u64(), 42);

    // partial assignment stays symbolic without completion...
    let mut partial = HashMap::new();
    partial.insert(x.as_sym().unwrap().0, BvConst::new(20, 32));
    let val = evaluate(&b, &e, &partial, false);
    assert!(!val.is_const());

    // ...and completes with zero when asked
    let val = evaluate(&b, &e, &partial, true);
    assert_eq!(val.as_const().unwrap().as_u64(), 40);
}

#[test]
fn rendering_is_stable() {
    let b = builder();
    let x = b.mk_sym("sym", 32);
    let e = b.mk_mul(&b.mk_uconst(2, 32), &x);
    let rendered = e.to_string();
    assert!(rendered.contains("sym"));
    assert!(rendered.contains("0x2"));
    assert!(rendered.contains('*'));
}

#[test]
fn garbage_collection_keeps_live_nodes() {
    let b = builder();
    let x = b.mk_sym("x", 32);
    let kept = b.mk_add(&x, &b.mk_uconst(1, 32));
    {
        let _dead = b.mk_add(&x, &b.mk_uconst(2, 32));
    }
    b.collect_garbage();

    let again = b.mk_add(&x, &b.mk_uconst(1, 32));
    assert!(same_expr(&kept, &again));
}
