//! Evaluation of expressions under a (possibly partial) symbol assignment.

use std::collections::HashMap;
use std::sync::Arc;

use super::{BvConst, Expr, ExprBuilder, ExprRef};

/// Rewrite `e` with every assigned symbol replaced by its constant value.
///
/// With `model_completion`, unassigned symbols are replaced by zero, so the
/// result of a well-sorted expression is always a constant. Without it,
/// unassigned symbols are left in place and the result may stay symbolic.
///
/// Rebuilding goes through the builder, so constant folding happens along the
/// way and a fully assigned expression collapses to a `Const`/`BoolConst`.
pub fn evaluate(
    builder: &ExprBuilder,
    e: &ExprRef,
    assignments: &HashMap<u32, BvConst>,
    model_completion: bool,
) -> ExprRef {
    let mut cache: HashMap<usize, ExprRef> = HashMap::new();
    evaluate_inner(builder, e, assignments, model_completion, &mut cache)
}

fn evaluate_inner(
    b: &ExprBuilder,
    e: &ExprRef,
    assignments: &HashMap<u32, BvConst>,
    completion: bool,
    cache: &mut HashMap<usize, ExprRef>,
) -> ExprRef {
    let key = Arc::as_ptr(e) as usize;
    if let Some(hit) = cache.get(&key) {
        return hit.clone();
    }

    macro_rules! ev {
        ($child:expr) => {
            evaluate_inner(b, $child, assignments, completion, cache)
        };
    }

    let res = match &**e {
        Expr::Sym { id, width, .. } => match assignments.get(id) {
            Some(val) => b.mk_const(val.clone()),
            None if completion => b.mk_uconst(0, *width),
            None => e.clone(),
        },
        Expr::Const(_) | Expr::BoolConst(_) | Expr::FpConst(_) => e.clone(),
        Expr::Extract { expr, high, low } => {
            let expr = ev!(expr);
            b.mk_extract(&expr, *high, *low)
        }
        Expr::Concat { parts } => {
            let mut acc = ev!(&parts[0]);
            for part in &parts[1..] {
                let part = ev!(part);
                acc = b.mk_concat(&acc, &part);
            }
            acc
        }
        Expr::Zext { expr, width } => {
            let expr = ev!(expr);
            b.mk_zext(&expr, *width)
        }
        Expr::Sext { expr, width } => {
            let expr = ev!(expr);
            b.mk_sext(&expr, *width)
        }
        Expr::Ite {
            guard,
            then,
            otherwise,
        } => {
            let guard = ev!(guard);
            let then = ev!(then);
            let otherwise = ev!(otherwise);
            b.mk_ite(&guard, &then, &otherwise)
        }
        Expr::Neg(expr) => {
            let expr = ev!(expr);
            b.mk_neg(&expr)
        }
        Expr::Not(expr) => {
            let expr = ev!(expr);
            b.mk_not(&expr)
        }
        Expr::Shl { value, amount } => {
            let (value, amount) = (ev!(value), ev!(amount));
            b.mk_shl(&value, &amount)
        }
        Expr::LShr { value, amount } => {
            let (value, amount) = (ev!(value), ev!(amount));
            b.mk_lshr(&value, &amount)
        }
        Expr::AShr { value, amount } => {
            let (value, amount) = (ev!(value), ev!(amount));
            b.mk_ashr(&value, &amount)
        }
        Expr::Add(args) => fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_add),
        Expr::Mul(args) => fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_mul),
        Expr::And(args) => fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_and),
        Expr::Or(args) => fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_or),
        Expr::Xor(args) => fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_xor),
        Expr::Sdiv { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_sdiv(&lhs, &rhs)
        }
        Expr::Udiv { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_udiv(&lhs, &rhs)
        }
        Expr::Srem { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_srem(&lhs, &rhs)
        }
        Expr::Urem { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_urem(&lhs, &rhs)
        }
        Expr::BoolToBv(expr) => {
            let expr = ev!(expr);
            b.bool_to_bv(&expr)
        }
        Expr::BoolNot(expr) => {
            let expr = ev!(expr);
            b.mk_bool_not(&expr)
        }
        Expr::BoolAnd(args) => {
            fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_bool_and)
        }
        Expr::BoolOr(args) => {
            fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_bool_or)
        }
        Expr::Eq { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_eq(&lhs, &rhs)
        }
        Expr::Ult { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_ult(&lhs, &rhs)
        }
        Expr::Ule { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_ule(&lhs, &rhs)
        }
        Expr::Ugt { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_ugt(&lhs, &rhs)
        }
        Expr::Uge { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_uge(&lhs, &rhs)
        }
        Expr::Slt { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_slt(&lhs, &rhs)
        }
        Expr::Sle { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_sle(&lhs, &rhs)
        }
        Expr::Sgt { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_sgt(&lhs, &rhs)
        }
        Expr::Sge { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_sge(&lhs, &rhs)
        }
        Expr::BvToFp { format, expr } => {
            let expr = ev!(expr);
            b.mk_bv_to_fp(*format, &expr)
        }
        Expr::FpToBv(expr) => {
            let expr = ev!(expr);
            b.mk_fp_to_bv(&expr)
        }
        Expr::FpConvert { format, expr } => {
            let expr = ev!(expr);
            b.mk_fp_convert(*format, &expr)
        }
        Expr::IntToFp { format, expr } => {
            let expr = ev!(expr);
            b.mk_int_to_fp(*format, &expr)
        }
        Expr::FpIsNan(expr) => {
            let expr = ev!(expr);
            b.mk_fp_is_nan(&expr)
        }
        Expr::FpNeg(expr) => {
            let expr = ev!(expr);
            b.mk_fp_neg(&expr)
        }
        Expr::FpAdd(args) => {
            fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_fp_add)
        }
        Expr::FpMul(args) => {
            fold_nary(b, args, assignments, completion, cache, ExprBuilder::mk_fp_mul)
        }
        Expr::FpDiv { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_fp_div(&lhs, &rhs)
        }
        Expr::FpLt { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_fp_lt(&lhs, &rhs)
        }
        Expr::FpEq { lhs, rhs } => {
            let (lhs, rhs) = (ev!(lhs), ev!(rhs));
            b.mk_fp_eq(&lhs, &rhs)
        }
    };

    cache.insert(key, res.clone());
    res
}

fn fold_nary(
    b: &ExprBuilder,
    args: &[ExprRef],
    assignments: &HashMap<u32, BvConst>,
    completion: bool,
    cache: &mut HashMap<usize, ExprRef>,
    op: fn(&ExprBuilder, &ExprRef, &ExprRef) -> ExprRef,
) -> ExprRef {
    let mut acc = evaluate_inner(b, &args[0], assignments, completion, cache);
    for arg in &args[1..] {
        let arg = evaluate_inner(b, arg, assignments, completion, cache);
        acc = op(b, &acc, &arg);
    }
    acc
}
