//! Hash-consed symbolic expression DAG.
//!
//! Expressions are immutable values behind [`ExprRef`] pointers. The
//! [`ExprBuilder`] interns every node it hands out, so two structurally equal
//! expressions always share one allocation and structural equality is pointer
//! equality (`Arc::ptr_eq`, see [`same_expr`]).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

mod builder;
mod bvconst;
mod eval;
mod fmt;
mod fp;

pub use builder::ExprBuilder;
pub use bvconst::BvConst;
pub use eval::evaluate;
pub use fp::{FpConst, FpFormat};

/// Shared handle to an interned expression node.
pub type ExprRef = Arc<Expr>;

/// Identity of two interned nodes.
pub fn same_expr(a: &ExprRef, b: &ExprRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// The sort of an expression: bit-vector of a width, boolean, or float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Bv(u32),
    Bool,
    Fp(FpFormat),
}

/// Discriminant of an expression node.
///
/// Every operator gets its own tag; in particular `LShr`/`AShr` and
/// `Udiv`/`Urem` (and `Sdiv`/`Srem`) are distinct so that interning never
/// conflates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Sym,
    Const,
    BoolConst,
    Extract,
    Concat,
    Zext,
    Sext,
    Ite,
    Neg,
    Not,
    Shl,
    LShr,
    AShr,
    Add,
    Mul,
    And,
    Or,
    Xor,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    BoolToBv,
    BoolNot,
    BoolAnd,
    BoolOr,
    Eq,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
    FpConst,
    BvToFp,
    FpToBv,
    FpConvert,
    IntToFp,
    FpIsNan,
    FpNeg,
    FpAdd,
    FpMul,
    FpDiv,
    FpLt,
    FpEq,
}

/// An expression node. Construct these only through [`ExprBuilder`]; the
/// builder enforces the width rules and performs the canonicalizing rewrites
/// the rest of the engine depends on.
#[derive(Debug)]
pub enum Expr {
    Sym { id: u32, name: Arc<str>, width: u32 },
    Const(BvConst),
    BoolConst(bool),
    Extract { expr: ExprRef, high: u32, low: u32 },
    Concat { parts: Vec<ExprRef> },
    Zext { expr: ExprRef, width: u32 },
    Sext { expr: ExprRef, width: u32 },
    Ite { guard: ExprRef, then: ExprRef, otherwise: ExprRef },
    Neg(ExprRef),
    Not(ExprRef),
    Shl { value: ExprRef, amount: ExprRef },
    LShr { value: ExprRef, amount: ExprRef },
    AShr { value: ExprRef, amount: ExprRef },
    Add(Vec<ExprRef>),
    Mul(Vec<ExprRef>),
    And(Vec<ExprRef>),
    Or(Vec<ExprRef>),
    Xor(Vec<ExprRef>),
    Sdiv { lhs: ExprRef, rhs: ExprRef },
    Udiv { lhs: ExprRef, rhs: ExprRef },
    Srem { lhs: ExprRef, rhs: ExprRef },
    Urem { lhs: ExprRef, rhs: ExprRef },
    BoolToBv(ExprRef),
    BoolNot(ExprRef),
    BoolAnd(Vec<ExprRef>),
    BoolOr(Vec<ExprRef>),
    Eq { lhs: ExprRef, rhs: ExprRef },
    Ult { lhs: ExprRef, rhs: ExprRef },
    Ule { lhs: ExprRef, rhs: ExprRef },
    Ugt { lhs: ExprRef, rhs: ExprRef },
    Uge { lhs: ExprRef, rhs: ExprRef },
    Slt { lhs: ExprRef, rhs: ExprRef },
    Sle { lhs: ExprRef, rhs: ExprRef },
    Sgt { lhs: ExprRef, rhs: ExprRef },
    Sge { lhs: ExprRef, rhs: ExprRef },
    FpConst(FpConst),
    BvToFp { format: FpFormat, expr: ExprRef },
    FpToBv(ExprRef),
    FpConvert { format: FpFormat, expr: ExprRef },
    IntToFp { format: FpFormat, expr: ExprRef },
    FpIsNan(ExprRef),
    FpNeg(ExprRef),
    FpAdd(Vec<ExprRef>),
    FpMul(Vec<ExprRef>),
    FpDiv { lhs: ExprRef, rhs: ExprRef },
    FpLt { lhs: ExprRef, rhs: ExprRef },
    FpEq { lhs: ExprRef, rhs: ExprRef },
}

impl Expr {
    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Sym { .. } => ExprKind::Sym,
            Expr::Const(_) => ExprKind::Const,
            Expr::BoolConst(_) => ExprKind::BoolConst,
            Expr::Extract { .. } => ExprKind::Extract,
            Expr::Concat { .. } => ExprKind::Concat,
            Expr::Zext { .. } => ExprKind::Zext,
            Expr::Sext { .. } => ExprKind::Sext,
            Expr::Ite { .. } => ExprKind::Ite,
            Expr::Neg(_) => ExprKind::Neg,
            Expr::Not(_) => ExprKind::Not,
            Expr::Shl { .. } => ExprKind::Shl,
            Expr::LShr { .. } => ExprKind::LShr,
            Expr::AShr { .. } => ExprKind::AShr,
            Expr::Add(_) => ExprKind::Add,
            Expr::Mul(_) => ExprKind::Mul,
            Expr::And(_) => ExprKind::And,
            Expr::Or(_) => ExprKind::Or,
            Expr::Xor(_) => ExprKind::Xor,
            Expr::Sdiv { .. } => ExprKind::Sdiv,
            Expr::Udiv { .. } => ExprKind::Udiv,
            Expr::Srem { .. } => ExprKind::Srem,
            Expr::Urem { .. } => ExprKind::Urem,
            Expr::BoolToBv(_) => ExprKind::BoolToBv,
            Expr::BoolNot(_) => ExprKind::BoolNot,
            Expr::BoolAnd(_) => ExprKind::BoolAnd,
            Expr::BoolOr(_) => ExprKind::BoolOr,
            Expr::Eq { .. } => ExprKind::Eq,
            Expr::Ult { .. } => ExprKind::Ult,
            Expr::Ule { .. } => ExprKind::Ule,
            Expr::Ugt { .. } => ExprKind::Ugt,
            Expr::Uge { .. } => ExprKind::Uge,
            Expr::Slt { .. } => ExprKind::Slt,
            Expr::Sle { .. } => ExprKind::Sle,
            Expr::Sgt { .. } => ExprKind::Sgt,
            Expr::Sge { .. } => ExprKind::Sge,
            Expr::FpConst(_) => ExprKind::FpConst,
            Expr::BvToFp { .. } => ExprKind::BvToFp,
            Expr::FpToBv(_) => ExprKind::FpToBv,
            Expr::FpConvert { .. } => ExprKind::FpConvert,
            Expr::IntToFp { .. } => ExprKind::IntToFp,
            Expr::FpIsNan(_) => ExprKind::FpIsNan,
            Expr::FpNeg(_) => ExprKind::FpNeg,
            Expr::FpAdd(_) => ExprKind::FpAdd,
            Expr::FpMul(_) => ExprKind::FpMul,
            Expr::FpDiv { .. } => ExprKind::FpDiv,
            Expr::FpLt { .. } => ExprKind::FpLt,
            Expr::FpEq { .. } => ExprKind::FpEq,
        }
    }

    /// The sort of this node.
    pub fn sort(&self) -> Sort {
        match self {
            Expr::Sym { width, .. } => Sort::Bv(*width),
            Expr::Const(c) => Sort::Bv(c.width()),
            Expr::Extract { high, low, .. } => Sort::Bv(high - low + 1),
            Expr::Concat { parts } => Sort::Bv(parts.iter().map(|p| p.width()).sum()),
            Expr::Zext { width, .. } | Expr::Sext { width, .. } => Sort::Bv(*width),
            Expr::Ite { then, .. } => then.sort(),
            Expr::Neg(e) | Expr::Not(e) => e.sort(),
            Expr::Shl { value, .. } | Expr::LShr { value, .. } | Expr::AShr { value, .. } => {
                value.sort()
            }
            Expr::Add(args)
            | Expr::Mul(args)
            | Expr::And(args)
            | Expr::Or(args)
            | Expr::Xor(args) => args[0].sort(),
            Expr::Sdiv { lhs, .. }
            | Expr::Udiv { lhs, .. }
            | Expr::Srem { lhs, .. }
            | Expr::Urem { lhs, .. } => lhs.sort(),
            Expr::BoolToBv(_) => Sort::Bv(1),
            Expr::BoolConst(_)
            | Expr::BoolNot(_)
            | Expr::BoolAnd(_)
            | Expr::BoolOr(_)
            | Expr::Eq { .. }
            | Expr::Ult { .. }
            | Expr::Ule { .. }
            | Expr::Ugt { .. }
            | Expr::Uge { .. }
            | Expr::Slt { .. }
            | Expr::Sle { .. }
            | Expr::Sgt { .. }
            | Expr::Sge { .. }
            | Expr::FpIsNan(_)
            | Expr::FpLt { .. }
            | Expr::FpEq { .. } => Sort::Bool,
            Expr::FpConst(c) => Sort::Fp(c.format()),
            Expr::BvToFp { format, .. }
            | Expr::FpConvert { format, .. }
            | Expr::IntToFp { format, .. } => Sort::Fp(*format),
            Expr::FpToBv(e) => match e.sort() {
                Sort::Fp(format) => Sort::Bv(format.bits()),
                _ => unreachable!("FpToBv child is always a float"),
            },
            Expr::FpNeg(e) => e.sort(),
            Expr::FpDiv { lhs, .. } => lhs.sort(),
            Expr::FpAdd(args) | Expr::FpMul(args) => args[0].sort(),
        }
    }

    /// Bit-width of a bit-vector expression.
    ///
    /// # Panics
    ///
    /// Panics when called on a boolean or floating-point node; asking a
    /// non-bit-vector for a width is a programming error.
    pub fn width(&self) -> u32 {
        match self.sort() {
            Sort::Bv(w) => w,
            sort => panic!("Expr: width(): not a bit-vector node ({sort:?})"),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_) | Expr::BoolConst(_) | Expr::FpConst(_))
    }

    pub fn as_const(&self) -> Option<&BvConst> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_bool_const(&self) -> Option<bool> {
        match self {
            Expr::BoolConst(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<(u32, &str)> {
        match self {
            Expr::Sym { id, name, .. } => Some((*id, name)),
            _ => None,
        }
    }

    /// Direct children of this node, in order.
    pub fn children(&self) -> Vec<ExprRef> {
        match self {
            Expr::Sym { .. } | Expr::Const(_) | Expr::BoolConst(_) | Expr::FpConst(_) => {
                Vec::new()
            }
            Expr::Extract { expr, .. }
            | Expr::Zext { expr, .. }
            | Expr::Sext { expr, .. }
            | Expr::BvToFp { expr, .. }
            | Expr::FpConvert { expr, .. }
            | Expr::IntToFp { expr, .. } => vec![expr.clone()],
            Expr::Neg(e)
            | Expr::Not(e)
            | Expr::BoolToBv(e)
            | Expr::BoolNot(e)
            | Expr::FpToBv(e)
            | Expr::FpIsNan(e)
            | Expr::FpNeg(e) => vec![e.clone()],
            Expr::Concat { parts } => parts.clone(),
            Expr::Add(args)
            | Expr::Mul(args)
            | Expr::And(args)
            | Expr::Or(args)
            | Expr::Xor(args)
            | Expr::BoolAnd(args)
            | Expr::BoolOr(args)
            | Expr::FpAdd(args)
            | Expr::FpMul(args) => args.clone(),
            Expr::Ite { guard, then, otherwise } => {
                vec![guard.clone(), then.clone(), otherwise.clone()]
            }
            Expr::Shl { value, amount }
            | Expr::LShr { value, amount }
            | Expr::AShr { value, amount } => vec![value.clone(), amount.clone()],
            Expr::Sdiv { lhs, rhs }
            | Expr::Udiv { lhs, rhs }
            | Expr::Srem { lhs, rhs }
            | Expr::Urem { lhs, rhs }
            | Expr::Eq { lhs, rhs }
            | Expr::Ult { lhs, rhs }
            | Expr::Ule { lhs, rhs }
            | Expr::Ugt { lhs, rhs }
            | Expr::Uge { lhs, rhs }
            | Expr::Slt { lhs, rhs }
            | Expr::Sle { lhs, rhs }
            | Expr::Sgt { lhs, rhs }
            | Expr::Sge { lhs, rhs }
            | Expr::FpDiv { lhs, rhs }
            | Expr::FpLt { lhs, rhs }
            | Expr::FpEq { lhs, rhs } => vec![lhs.clone(), rhs.clone()],
        }
    }

    fn literal_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::Sym { id, width, .. } => {
                id.hash(state);
                width.hash(state);
            }
            Expr::Const(c) => c.hash(state),
            Expr::BoolConst(b) => b.hash(state),
            Expr::Extract { high, low, .. } => {
                high.hash(state);
                low.hash(state);
            }
            Expr::Zext { width, .. } | Expr::Sext { width, .. } => width.hash(state),
            Expr::FpConst(c) => c.hash(state),
            Expr::BvToFp { format, .. }
            | Expr::FpConvert { format, .. }
            | Expr::IntToFp { format, .. } => format.hash(state),
            _ => {}
        }
    }

    fn literal_eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Sym { id: a, width: wa, .. }, Expr::Sym { id: b, width: wb, .. }) => {
                a == b && wa == wb
            }
            (Expr::Const(a), Expr::Const(b)) => a == b,
            (Expr::BoolConst(a), Expr::BoolConst(b)) => a == b,
            (
                Expr::Extract { high: ha, low: la, .. },
                Expr::Extract { high: hb, low: lb, .. },
            ) => ha == hb && la == lb,
            (Expr::Zext { width: a, .. }, Expr::Zext { width: b, .. }) => a == b,
            (Expr::Sext { width: a, .. }, Expr::Sext { width: b, .. }) => a == b,
            (Expr::FpConst(a), Expr::FpConst(b)) => a == b,
            (Expr::BvToFp { format: a, .. }, Expr::BvToFp { format: b, .. }) => a == b,
            (Expr::FpConvert { format: a, .. }, Expr::FpConvert { format: b, .. }) => a == b,
            (Expr::IntToFp { format: a, .. }, Expr::IntToFp { format: b, .. }) => a == b,
            _ => true,
        }
    }

    /// Interning hash over the node content: kind, literal fields, and the
    /// identities of already-interned children.
    pub(crate) fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind().hash(&mut hasher);
        self.literal_hash(&mut hasher);
        for child in self.children() {
            (Arc::as_ptr(&child) as usize).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Content equality against another (possibly not yet interned) node.
    /// Children are compared by identity.
    pub(crate) fn content_eq(&self, other: &Expr) -> bool {
        if self.kind() != other.kind() || !self.literal_eq(other) {
            return false;
        }
        let a = self.children();
        let b = other.children();
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| Arc::ptr_eq(x, y))
    }
}
