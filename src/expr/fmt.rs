//! Textual rendering of expressions.

use std::fmt;

use itertools::Itertools;

use super::{Expr, ExprRef};

fn write_nary(f: &mut fmt::Formatter<'_>, args: &[ExprRef], sep: &str) -> fmt::Result {
    let sep = format!(" {sep} ");
    write!(f, "( {} )", args.iter().format(&sep))
}

fn write_binary(
    f: &mut fmt::Formatter<'_>,
    lhs: &ExprRef,
    rhs: &ExprRef,
    op: &str,
) -> fmt::Result {
    write!(f, "( {lhs} {op} {rhs} )")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Sym { name, .. } => write!(f, "{name}"),
            Expr::Const(c) => write!(f, "{c:#x}"),
            Expr::BoolConst(b) => write!(f, "{b}"),
            Expr::Extract { expr, high, low } => write!(f, "{expr}[{high}:{low}]"),
            Expr::Concat { parts } => write_nary(f, parts, "#"),
            Expr::Zext { expr, width } => write!(f, "zext({expr}, {width})"),
            Expr::Sext { expr, width } => write!(f, "sext({expr}, {width})"),
            Expr::Ite {
                guard,
                then,
                otherwise,
            } => write!(f, "ITE({guard}, {then}, {otherwise})"),
            Expr::Neg(e) => write!(f, "-{e}"),
            Expr::Not(e) => write!(f, "~{e}"),
            Expr::Shl { value, amount } => write_binary(f, value, amount, "<<"),
            Expr::LShr { value, amount } => write_binary(f, value, amount, "l>>"),
            Expr::AShr { value, amount } => write_binary(f, value, amount, "a>>"),
            Expr::Add(args) => write_nary(f, args, "+"),
            Expr::Mul(args) => write_nary(f, args, "*"),
            Expr::And(args) => write_nary(f, args, "&"),
            Expr::Or(args) => write_nary(f, args, "|"),
            Expr::Xor(args) => write_nary(f, args, "^"),
            Expr::Sdiv { lhs, rhs } => write_binary(f, lhs, rhs, "s/"),
            Expr::Udiv { lhs, rhs } => write_binary(f, lhs, rhs, "u/"),
            Expr::Srem { lhs, rhs } => write_binary(f, lhs, rhs, "s%"),
            Expr::Urem { lhs, rhs } => write_binary(f, lhs, rhs, "u%"),
            Expr::BoolToBv(e) => write!(f, "bool_to_bv({e})"),
            Expr::BoolNot(e) => write!(f, "!{e}"),
            Expr::BoolAnd(args) => write_nary(f, args, "&&"),
            Expr::BoolOr(args) => write_nary(f, args, "||"),
            Expr::Eq { lhs, rhs } => write_binary(f, lhs, rhs, "=="),
            Expr::Ult { lhs, rhs } => write_binary(f, lhs, rhs, "u<"),
            Expr::Ule { lhs, rhs } => write_binary(f, lhs, rhs, "u<="),
            Expr::Ugt { lhs, rhs } => write_binary(f, lhs, rhs, "u>"),
            Expr::Uge { lhs, rhs } => write_binary(f, lhs, rhs, "u>="),
            Expr::Slt { lhs, rhs } => write_binary(f, lhs, rhs, "s<"),
            Expr::Sle { lhs, rhs } => write_binary(f, lhs, rhs, "s<="),
            Expr::Sgt { lhs, rhs } => write_binary(f, lhs, rhs, "s>"),
            Expr::Sge { lhs, rhs } => write_binary(f, lhs, rhs, "s>="),
            Expr::FpConst(c) => write!(f, "{c}"),
            Expr::BvToFp { expr, .. } => write!(f, "to_fp({expr})"),
            Expr::FpToBv(e) => write!(f, "to_bv({e})"),
            Expr::FpConvert { format, expr } => write!(f, "fp_convert({expr}, {format:?})"),
            Expr::IntToFp { expr, .. } => write!(f, "int_to_fp({expr})"),
            Expr::FpIsNan(e) => write!(f, "is_nan({e})"),
            Expr::FpNeg(e) => write!(f, "f-{e}"),
            Expr::FpAdd(args) => write_nary(f, args, "f+"),
            Expr::FpMul(args) => write_nary(f, args, "f*"),
            Expr::FpDiv { lhs, rhs } => write_binary(f, lhs, rhs, "f/"),
            Expr::FpLt { lhs, rhs } => write_binary(f, lhs, rhs, "f<"),
            Expr::FpEq { lhs, rhs } => write_binary(f, lhs, rhs, "f=="),
        }
    }
}
