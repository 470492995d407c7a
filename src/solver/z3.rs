//! Z3 backend.
//!
//! Every query builds a fresh context, translates the formula, and tears
//! everything down again; no Z3 state survives between calls. Formulas
//! containing floating-point nodes are not translated: the backend answers
//! `Unknown`, which callers must treat as unreachability.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use z3::ast::{Ast, Bool, BV};
use z3::{Config, Context, SatResult, Solver};

use super::{CheckResult, SmtBackend};
use crate::expr::{BvConst, Expr, ExprRef, Sort};

/// The default SMT backend, binding to Z3 with quantifier-free bit-vector
/// queries.
#[derive(Debug, Default, Clone, Copy)]
pub struct Z3Backend;

enum ZAst<'ctx> {
    Bv(BV<'ctx>),
    Bool(Bool<'ctx>),
}

impl<'ctx> ZAst<'ctx> {
    fn bv(self) -> BV<'ctx> {
        match self {
            ZAst::Bv(bv) => bv,
            ZAst::Bool(_) => unreachable!("sort-checked translation produced a bool"),
        }
    }

    fn boolean(self) -> Bool<'ctx> {
        match self {
            ZAst::Bool(b) => b,
            ZAst::Bv(_) => unreachable!("sort-checked translation produced a bit-vector"),
        }
    }
}

/// A bit-vector literal of arbitrary width, assembled from 64-bit chunks.
fn bv_literal<'ctx>(ctx: &'ctx Context, c: &BvConst) -> BV<'ctx> {
    let width = c.width();
    if width <= 64 {
        return BV::from_u64(ctx, c.as_u64(), width);
    }

    let mut out: Option<BV<'ctx>> = None;
    let mut low = 0;
    while low < width {
        let high = (low + 63).min(width - 1);
        let chunk = c.extract(high, low);
        let chunk = BV::from_u64(ctx, chunk.as_u64(), high - low + 1);
        out = Some(match out {
            Some(prev) => chunk.concat(&prev),
            None => chunk,
        });
        low = high + 1;
    }
    out.expect("width is nonzero")
}

fn fold_bv<'ctx>(
    ctx: &'ctx Context,
    args: &[ExprRef],
    cache: &mut HashMap<usize, ZAst<'ctx>>,
    op: impl Fn(&BV<'ctx>, &BV<'ctx>) -> BV<'ctx>,
) -> Option<BV<'ctx>> {
    let mut acc = translate(ctx, &args[0], cache)?.bv();
    for arg in &args[1..] {
        let arg = translate(ctx, arg, cache)?.bv();
        acc = op(&acc, &arg);
    }
    Some(acc)
}

fn translate<'ctx>(
    ctx: &'ctx Context,
    e: &ExprRef,
    cache: &mut HashMap<usize, ZAst<'ctx>>,
) -> Option<ZAst<'ctx>> {
    let key = Arc::as_ptr(e) as usize;
    if let Some(hit) = cache.get(&key) {
        return Some(match hit {
            ZAst::Bv(bv) => ZAst::Bv(bv.clone()),
            ZAst::Bool(b) => ZAst::Bool(b.clone()),
        });
    }

    macro_rules! bv {
        ($child:expr) => {
            translate(ctx, $child, cache)?.bv()
        };
    }
    macro_rules! boolean {
        ($child:expr) => {
            translate(ctx, $child, cache)?.boolean()
        };
    }

    let res = match &**e {
        Expr::Sym { name, width, .. } => ZAst::Bv(BV::new_const(ctx, name.as_ref(), *width)),
        Expr::Const(c) => ZAst::Bv(bv_literal(ctx, c)),
        Expr::BoolConst(b) => ZAst::Bool(Bool::from_bool(ctx, *b)),
        Expr::Extract { expr, high, low } => ZAst::Bv(bv!(expr).extract(*high, *low)),
        Expr::Concat { parts } => {
            let acc = fold_bv(ctx, parts, cache, |a, b| a.concat(b))?;
            ZAst::Bv(acc)
        }
        Expr::Zext { expr, width } => {
            let inner = bv!(expr);
            let ext = width - inner.get_size();
            ZAst::Bv(inner.zero_ext(ext))
        }
        Expr::Sext { expr, width } => {
            let inner = bv!(expr);
            let ext = width - inner.get_size();
            ZAst::Bv(inner.sign_ext(ext))
        }
        Expr::Ite {
            guard,
            then,
            otherwise,
        } => ZAst::Bv(boolean!(guard).ite(&bv!(then), &bv!(otherwise))),
        Expr::Neg(expr) => ZAst::Bv(bv!(expr).bvneg()),
        Expr::Not(expr) => ZAst::Bv(bv!(expr).bvnot()),
        Expr::Shl { value, amount } => ZAst::Bv(bv!(value).bvshl(&bv!(amount))),
        Expr::LShr { value, amount } => ZAst::Bv(bv!(value).bvlshr(&bv!(amount))),
        Expr::AShr { value, amount } => ZAst::Bv(bv!(value).bvashr(&bv!(amount))),
        Expr::Add(args) => ZAst::Bv(fold_bv(ctx, args, cache, |a, b| a.bvadd(b))?),
        Expr::Mul(args) => ZAst::Bv(fold_bv(ctx, args, cache, |a, b| a.bvmul(b))?),
        Expr::And(args) => ZAst::Bv(fold_bv(ctx, args, cache, |a, b| a.bvand(b))?),
        Expr::Or(args) => ZAst::Bv(fold_bv(ctx, args, cache, |a, b| a.bvor(b))?),
        Expr::Xor(args) => ZAst::Bv(fold_bv(ctx, args, cache, |a, b| a.bvxor(b))?),
        Expr::Sdiv { lhs, rhs } => ZAst::Bv(bv!(lhs).bvsdiv(&bv!(rhs))),
        Expr::Udiv { lhs, rhs } => ZAst::Bv(bv!(lhs).bvudiv(&bv!(rhs))),
        Expr::Srem { lhs, rhs } => ZAst::Bv(bv!(lhs).bvsrem(&bv!(rhs))),
        Expr::Urem { lhs, rhs } => ZAst::Bv(bv!(lhs).bvurem(&bv!(rhs))),
        Expr::BoolToBv(inner) => {
            let one = BV::from_u64(ctx, 1, 1);
            let zero = BV::from_u64(ctx, 0, 1);
            ZAst::Bv(boolean!(inner).ite(&one, &zero))
        }
        Expr::BoolNot(inner) => ZAst::Bool(boolean!(inner).not()),
        Expr::BoolAnd(args) => {
            let mut acc = Vec::with_capacity(args.len());
            for arg in args {
                acc.push(translate(ctx, arg, cache)?.boolean());
            }
            let refs: Vec<&Bool> = acc.iter().collect();
            ZAst::Bool(Bool::and(ctx, &refs))
        }
        Expr::BoolOr(args) => {
            let mut acc = Vec::with_capacity(args.len());
            for arg in args {
                acc.push(translate(ctx, arg, cache)?.boolean());
            }
            let refs: Vec<&Bool> = acc.iter().collect();
            ZAst::Bool(Bool::or(ctx, &refs))
        }
        Expr::Eq { lhs, rhs } => ZAst::Bool(bv!(lhs)._eq(&bv!(rhs))),
        Expr::Ult { lhs, rhs } => ZAst::Bool(bv!(lhs).bvult(&bv!(rhs))),
        Expr::Ule { lhs, rhs } => ZAst::Bool(bv!(lhs).bvule(&bv!(rhs))),
        Expr::Ugt { lhs, rhs } => ZAst::Bool(bv!(lhs).bvugt(&bv!(rhs))),
        Expr::Uge { lhs, rhs } => ZAst::Bool(bv!(lhs).bvuge(&bv!(rhs))),
        Expr::Slt { lhs, rhs } => ZAst::Bool(bv!(lhs).bvslt(&bv!(rhs))),
        Expr::Sle { lhs, rhs } => ZAst::Bool(bv!(lhs).bvsle(&bv!(rhs))),
        Expr::Sgt { lhs, rhs } => ZAst::Bool(bv!(lhs).bvsgt(&bv!(rhs))),
        Expr::Sge { lhs, rhs } => ZAst::Bool(bv!(lhs).bvsge(&bv!(rhs))),
        // floating point is deliberately not translated; see module docs
        Expr::FpConst(_)
        | Expr::BvToFp { .. }
        | Expr::FpToBv(_)
        | Expr::FpConvert { .. }
        | Expr::IntToFp { .. }
        | Expr::FpIsNan(_)
        | Expr::FpNeg(_)
        | Expr::FpAdd(_)
        | Expr::FpMul(_)
        | Expr::FpDiv { .. }
        | Expr::FpLt { .. }
        | Expr::FpEq { .. } => return None,
    };

    let clone = match &res {
        ZAst::Bv(bv) => ZAst::Bv(bv.clone()),
        ZAst::Bool(b) => ZAst::Bool(b.clone()),
    };
    cache.insert(key, clone);
    Some(res)
}

/// Collect the distinct symbols of an expression, by identity.
fn symbols_of(e: &ExprRef) -> Vec<ExprRef> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![e.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(Arc::as_ptr(&node) as usize) {
            continue;
        }
        if matches!(&*node, Expr::Sym { .. }) {
            out.push(node.clone());
        }
        stack.extend(node.children());
    }
    out
}

/// Parse a Z3 numeral rendering (`#x...`, `#b...`, or decimal).
fn parse_numeral(s: &str, width: u32) -> BvConst {
    if let Some(hex) = s.strip_prefix("#x") {
        BvConst::from_str_literal(&format!("0x{hex}"), width)
    } else if let Some(bin) = s.strip_prefix("#b") {
        BvConst::from_str_literal(&format!("0b{bin}"), width)
    } else {
        BvConst::from_str_literal(s, width)
    }
}

fn eval_bv(model: &z3::Model<'_>, ast: &BV<'_>, width: u32) -> Option<BvConst> {
    let val = model.eval(ast, true)?;
    if width <= 64 {
        if let Some(v) = val.as_u64() {
            return Some(BvConst::new(v, width));
        }
    }
    Some(parse_numeral(&val.to_string(), width))
}

impl SmtBackend for Z3Backend {
    fn check_with_model(&self, query: &ExprRef) -> (CheckResult, Option<HashMap<u32, BvConst>>) {
        debug_assert!(query.sort() == Sort::Bool, "backend queries are boolean");

        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let solver = Solver::new(&ctx);

        let mut cache = HashMap::new();
        let translated = match translate(&ctx, query, &mut cache) {
            Some(ast) => ast.boolean(),
            None => {
                debug!("query contains floating point, answering unknown");
                return (CheckResult::Unknown, None);
            }
        };
        solver.assert(&translated);

        match solver.check() {
            SatResult::Unsat => (CheckResult::Unsat, None),
            SatResult::Unknown => (CheckResult::Unknown, None),
            SatResult::Sat => {
                let model = match solver.get_model() {
                    Some(model) => model,
                    None => return (CheckResult::Sat, None),
                };
                let mut assignment = HashMap::new();
                for sym in symbols_of(query) {
                    let (id, name) = sym.as_sym().expect("symbols_of returns Sym nodes");
                    let width = sym.width();
                    let ast = BV::new_const(&ctx, name, width);
                    if let Some(val) = eval_bv(&model, &ast, width) {
                        assignment.insert(id, val);
                    }
                }
                (CheckResult::Sat, Some(assignment))
            }
        }
    }

    fn eval_upto(&self, e: &ExprRef, pi: &ExprRef, n: u32) -> Vec<BvConst> {
        let width = e.width();

        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let solver = Solver::new(&ctx);

        let mut cache = HashMap::new();
        let pi_ast = match translate(&ctx, pi, &mut cache) {
            Some(ast) => ast.boolean(),
            None => return Vec::new(),
        };
        let e_ast = match translate(&ctx, e, &mut cache) {
            Some(ast) => ast.bv(),
            None => return Vec::new(),
        };
        solver.assert(&pi_ast);

        let mut values = Vec::new();
        while (values.len() as u32) < n {
            if solver.check() != SatResult::Sat {
                break;
            }
            let model = match solver.get_model() {
                Some(model) => model,
                None => break,
            };
            let val = match eval_bv(&model, &e_ast, width) {
                Some(val) => val,
                None => break,
            };
            let lit = bv_literal(&ctx, &val);
            solver.assert(&e_ast._eq(&lit).not());
            values.push(val);
        }
        values
    }
}
