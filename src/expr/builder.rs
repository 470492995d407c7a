//! Expression construction: hash-consing and canonicalizing rewrites.
//!
//! The builder is an explicit value shared (behind `Arc`) by every component
//! that creates expressions. Interning keeps one allocation per structurally
//! distinct node, so equality checks downstream are pointer comparisons. Dead
//! nodes are only weakly referenced by the intern table and are swept by
//! [`ExprBuilder::collect_garbage`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::{BvConst, Expr, ExprRef, FpConst, FpFormat, Sort};

#[derive(Default)]
struct Inner {
    /// content hash -> weak refs to interned nodes with that hash.
    table: HashMap<u64, Vec<Weak<Expr>>>,
    /// symbol name -> interned `Sym` node.
    sym_by_name: HashMap<Arc<str>, ExprRef>,
    /// symbol id -> name; ids are dense and stable for the process lifetime.
    sym_names: Vec<Arc<str>>,
}

/// Interning expression factory.
///
/// Entry points check the width rules of their operator and panic on misuse;
/// a sort or width mismatch is always a bug in the caller. Every entry point
/// simplifies before interning, so consumers can rely on, e.g., constant
/// operands folding to a [`Expr::Const`] node.
#[derive(Default)]
pub struct ExprBuilder {
    inner: Mutex<Inner>,
}

fn width_of(e: &ExprRef, op: &str) -> u32 {
    match e.sort() {
        Sort::Bv(w) => w,
        sort => panic!("ExprBuilder: {op}: expected a bit-vector, got {sort:?}"),
    }
}

fn expect_bool(e: &ExprRef, op: &str) {
    if e.sort() != Sort::Bool {
        panic!("ExprBuilder: {op}: expected a boolean, got {:?}", e.sort());
    }
}

fn expect_fp(e: &ExprRef, op: &str) -> FpFormat {
    match e.sort() {
        Sort::Fp(format) => format,
        sort => panic!("ExprBuilder: {op}: expected a float, got {sort:?}"),
    }
}

fn check_same_width(a: &ExprRef, b: &ExprRef, op: &str) -> u32 {
    let wa = width_of(a, op);
    let wb = width_of(b, op);
    assert!(wa == wb, "ExprBuilder: {op}: width mismatch ({wa} vs {wb})");
    wa
}

fn ptr_key(e: &ExprRef) -> usize {
    Arc::as_ptr(e) as usize
}

/// Effective shift distance for a constant amount, clamped to `width`.
fn const_shift_amount(amount: &BvConst, width: u32) -> u32 {
    if amount.width() > 64 {
        let bound = BvConst::new(width as u64, amount.width());
        if amount.uge(&bound) {
            return width;
        }
        return amount.extract(63, 0).as_u64() as u32;
    }
    amount.as_u64().min(width as u64) as u32
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, e: Expr) -> ExprRef {
        let hash = e.content_hash();
        let mut inner = self.inner.lock().expect("expression interner poisoned");
        let bucket = inner.table.entry(hash).or_default();
        bucket.retain(|weak| weak.strong_count() > 0);
        for weak in bucket.iter() {
            if let Some(existing) = weak.upgrade() {
                if existing.content_eq(&e) {
                    return existing;
                }
            }
        }
        let node = Arc::new(e);
        bucket.push(Arc::downgrade(&node));
        node
    }

    /// Drop intern-table entries whose nodes are no longer referenced.
    pub fn collect_garbage(&self) {
        let mut inner = self.inner.lock().expect("expression interner poisoned");
        inner.table.retain(|_, bucket| {
            bucket.retain(|weak| weak.strong_count() > 0);
            !bucket.is_empty()
        });
    }

    // ---- symbols ----

    /// Get or create the symbol `name` of the given width. Symbol ids are
    /// allocated densely in creation order and never reused.
    ///
    /// # Panics
    ///
    /// Panics if the symbol exists with a different width.
    pub fn mk_sym(&self, name: &str, width: u32) -> ExprRef {
        assert!(width > 0, "ExprBuilder: mk_sym: width cannot be zero");
        let mut inner = self.inner.lock().expect("expression interner poisoned");
        if let Some(existing) = inner.sym_by_name.get(name) {
            let existing = existing.clone();
            assert!(
                existing.width() == width,
                "ExprBuilder: mk_sym: `{name}` already exists with width {}",
                existing.width()
            );
            return existing;
        }

        let id = inner.sym_names.len() as u32;
        let name: Arc<str> = Arc::from(name);
        let node = Arc::new(Expr::Sym {
            id,
            name: name.clone(),
            width,
        });
        inner.sym_names.push(name.clone());
        inner.sym_by_name.insert(name, node.clone());
        inner
            .table
            .entry(node.content_hash())
            .or_default()
            .push(Arc::downgrade(&node));
        node
    }

    /// Id of an existing symbol.
    pub fn sym_id(&self, name: &str) -> Option<u32> {
        let inner = self.inner.lock().expect("expression interner poisoned");
        inner
            .sym_by_name
            .get(name)
            .map(|e| e.as_sym().expect("symbol table holds Sym nodes only").0)
    }

    /// Name of an existing symbol id.
    pub fn sym_name(&self, id: u32) -> Option<Arc<str>> {
        let inner = self.inner.lock().expect("expression interner poisoned");
        inner.sym_names.get(id as usize).cloned()
    }

    // ---- constants ----

    pub fn mk_const(&self, c: BvConst) -> ExprRef {
        self.intern(Expr::Const(c))
    }

    pub fn mk_uconst(&self, value: u64, width: u32) -> ExprRef {
        self.mk_const(BvConst::new(value, width))
    }

    pub fn mk_true(&self) -> ExprRef {
        self.intern(Expr::BoolConst(true))
    }

    pub fn mk_false(&self) -> ExprRef {
        self.intern(Expr::BoolConst(false))
    }

    pub fn mk_bool_const(&self, v: bool) -> ExprRef {
        self.intern(Expr::BoolConst(v))
    }

    // ---- width changes ----

    /// Bit slice `[high:low]` of a bit-vector expression.
    ///
    /// # Panics
    ///
    /// Panics unless `low <= high < expr.width()`.
    pub fn mk_extract(&self, e: &ExprRef, high: u32, low: u32) -> ExprRef {
        let w = width_of(e, "extract");
        assert!(
            low <= high && high < w,
            "ExprBuilder: extract: invalid range [{high}:{low}] on width {w}"
        );

        if low == 0 && high == w - 1 {
            return e.clone();
        }
        if let Some(c) = e.as_const() {
            return self.mk_const(c.extract(high, low));
        }
        match &**e {
            Expr::Extract {
                expr,
                low: inner_low,
                ..
            } => {
                return self.mk_extract(expr, inner_low + high, inner_low + low);
            }
            Expr::Concat { parts } => {
                // keep only the children the window intersects
                let mut pieces_lsb_first: Vec<ExprRef> = Vec::new();
                let mut offset = 0u32;
                for part in parts.iter().rev() {
                    let pw = part.width();
                    let lo = offset;
                    let hi = offset + pw - 1;
                    offset += pw;
                    if hi < low || lo > high {
                        continue;
                    }
                    let sub_lo = low.max(lo) - lo;
                    let sub_hi = high.min(hi) - lo;
                    pieces_lsb_first.push(self.mk_extract(part, sub_hi, sub_lo));
                }
                let mut res = pieces_lsb_first[0].clone();
                for piece in pieces_lsb_first.into_iter().skip(1) {
                    res = self.mk_concat(&piece, &res);
                }
                return res;
            }
            Expr::Zext { expr, .. } | Expr::Sext { expr, .. } if high < expr.width() => {
                return self.mk_extract(expr, high, low);
            }
            Expr::Zext { expr, .. } if low >= expr.width() => {
                return self.mk_uconst(0, high - low + 1);
            }
            _ => {}
        }
        self.intern(Expr::Extract {
            expr: e.clone(),
            high,
            low,
        })
    }

    /// Concatenation; `left` provides the most significant bits.
    pub fn mk_concat(&self, left: &ExprRef, right: &ExprRef) -> ExprRef {
        width_of(left, "concat");
        width_of(right, "concat");

        let mut parts: Vec<ExprRef> = Vec::new();
        for e in [left, right] {
            match &**e {
                Expr::Concat { parts: nested } => parts.extend(nested.iter().cloned()),
                _ => parts.push(e.clone()),
            }
        }

        // merge adjacent parts: constant pairs fold, adjacent slices of the
        // same node re-join (this is what makes memory read-back return the
        // originally written expression)
        let mut merged: Vec<ExprRef> = Vec::with_capacity(parts.len());
        for part in parts {
            merged.push(part);
            while merged.len() >= 2 {
                let b = merged[merged.len() - 1].clone();
                let a = merged[merged.len() - 2].clone();
                match self.try_merge_concat_pair(&a, &b) {
                    Some(joined) => {
                        merged.pop();
                        merged.pop();
                        merged.push(joined);
                    }
                    None => break,
                }
            }
        }

        if merged.len() == 1 {
            return merged.pop().expect("nonempty");
        }
        self.intern(Expr::Concat { parts: merged })
    }

    fn try_merge_concat_pair(&self, a: &ExprRef, b: &ExprRef) -> Option<ExprRef> {
        if let (Some(ca), Some(cb)) = (a.as_const(), b.as_const()) {
            return Some(self.mk_const(ca.concat(cb)));
        }
        if let (
            Expr::Extract {
                expr: xa,
                high: ha,
                low: la,
            },
            Expr::Extract {
                expr: xb,
                high: hb,
                low: lb,
            },
        ) = (&**a, &**b)
        {
            if Arc::ptr_eq(xa, xb) && *la == hb + 1 {
                return Some(self.mk_extract(xa, *ha, *lb));
            }
        }
        None
    }

    /// Zero extension to `width`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is smaller than the expression width.
    pub fn mk_zext(&self, e: &ExprRef, width: u32) -> ExprRef {
        let w = width_of(e, "zext");
        assert!(width >= w, "ExprBuilder: zext: invalid width ({w} > {width})");
        if width == w {
            return e.clone();
        }
        if let Some(c) = e.as_const() {
            return self.mk_const(c.zext(width));
        }
        if let Expr::Zext { expr, .. } = &**e {
            return self.mk_zext(expr, width);
        }
        self.intern(Expr::Zext {
            expr: e.clone(),
            width,
        })
    }

    /// Sign extension to `width`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is smaller than the expression width.
    pub fn mk_sext(&self, e: &ExprRef, width: u32) -> ExprRef {
        let w = width_of(e, "sext");
        assert!(width >= w, "ExprBuilder: sext: invalid width ({w} > {width})");
        if width == w {
            return e.clone();
        }
        if let Some(c) = e.as_const() {
            return self.mk_const(c.sext(width));
        }
        if let Expr::Sext { expr, .. } = &**e {
            return self.mk_sext(expr, width);
        }
        self.intern(Expr::Sext {
            expr: e.clone(),
            width,
        })
    }

    /// If-then-else over bit-vectors of one width.
    pub fn mk_ite(&self, guard: &ExprRef, then: &ExprRef, otherwise: &ExprRef) -> ExprRef {
        expect_bool(guard, "ite");
        check_same_width(then, otherwise, "ite");

        if let Some(g) = guard.as_bool_const() {
            return if g { then.clone() } else { otherwise.clone() };
        }
        if Arc::ptr_eq(then, otherwise) {
            return then.clone();
        }
        self.intern(Expr::Ite {
            guard: guard.clone(),
            then: then.clone(),
            otherwise: otherwise.clone(),
        })
    }

    // ---- arithmetic ----

    pub fn mk_neg(&self, e: &ExprRef) -> ExprRef {
        width_of(e, "neg");
        if let Some(c) = e.as_const() {
            return self.mk_const(c.neg());
        }
        if let Expr::Neg(inner) = &**e {
            return inner.clone();
        }
        self.intern(Expr::Neg(e.clone()))
    }

    pub fn mk_not(&self, e: &ExprRef) -> ExprRef {
        width_of(e, "not");
        if let Some(c) = e.as_const() {
            return self.mk_const(c.not());
        }
        if let Expr::Not(inner) = &**e {
            return inner.clone();
        }
        self.intern(Expr::Not(e.clone()))
    }

    fn flatten2(
        &self,
        select: fn(&Expr) -> Option<&Vec<ExprRef>>,
        a: &ExprRef,
        b: &ExprRef,
    ) -> Vec<ExprRef> {
        let mut out = Vec::new();
        for e in [a, b] {
            match select(e) {
                Some(nested) => out.extend(nested.iter().cloned()),
                None => out.push(e.clone()),
            }
        }
        out
    }

    pub fn mk_add(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let w = check_same_width(a, b, "add");
        let terms = self.flatten2(
            |e| match e {
                Expr::Add(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut acc: Option<BvConst> = None;
        let mut rest: Vec<ExprRef> = Vec::new();
        for t in terms {
            match t.as_const() {
                Some(c) => {
                    acc = Some(match acc {
                        Some(prev) => prev.add(c),
                        None => c.clone(),
                    })
                }
                None => rest.push(t),
            }
        }

        // x + (-x) cancels after the sub -> add(neg) canonicalization
        let mut i = 0;
        'cancel: while i < rest.len() {
            for j in (i + 1)..rest.len() {
                let negated = match (&*rest[i], &*rest[j]) {
                    (Expr::Neg(inner), _) if Arc::ptr_eq(inner, &rest[j]) => true,
                    (_, Expr::Neg(inner)) if Arc::ptr_eq(inner, &rest[i]) => true,
                    _ => false,
                };
                if negated {
                    rest.remove(j);
                    rest.remove(i);
                    continue 'cancel;
                }
            }
            i += 1;
        }

        if let Some(c) = acc.take().filter(|c| !c.is_zero()) {
            rest.push(self.mk_const(c));
        }
        match rest.len() {
            0 => self.mk_uconst(0, w),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::Add(rest))
            }
        }
    }

    pub fn mk_sub(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        check_same_width(a, b, "sub");
        self.mk_add(a, &self.mk_neg(b))
    }

    pub fn mk_mul(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let w = check_same_width(a, b, "mul");
        let factors = self.flatten2(
            |e| match e {
                Expr::Mul(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut acc: Option<BvConst> = None;
        let mut rest: Vec<ExprRef> = Vec::new();
        for f in factors {
            match f.as_const() {
                Some(c) => {
                    acc = Some(match acc {
                        Some(prev) => prev.mul(c),
                        None => c.clone(),
                    })
                }
                None => rest.push(f),
            }
        }

        if let Some(c) = &acc {
            if c.is_zero() {
                return self.mk_uconst(0, w);
            }
        }
        if let Some(c) = acc.take().filter(|c| !c.eq_value(&BvConst::new(1, w))) {
            rest.push(self.mk_const(c));
        }
        match rest.len() {
            0 => self.mk_uconst(1, w),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::Mul(rest))
            }
        }
    }

    pub fn mk_and(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let w = check_same_width(a, b, "and");
        let args = self.flatten2(
            |e| match e {
                Expr::And(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut acc: Option<BvConst> = None;
        let mut rest: Vec<ExprRef> = Vec::new();
        for e in args {
            match e.as_const() {
                Some(c) => {
                    acc = Some(match acc {
                        Some(prev) => prev.and(c),
                        None => c.clone(),
                    })
                }
                None => {
                    if !rest.iter().any(|r| Arc::ptr_eq(r, &e)) {
                        rest.push(e);
                    }
                }
            }
        }

        if let Some(c) = &acc {
            if c.is_zero() {
                return self.mk_uconst(0, w);
            }
        }
        if let Some(c) = acc.take().filter(|c| !c.has_all_bits()) {
            rest.push(self.mk_const(c));
        }
        match rest.len() {
            0 => self.mk_const(BvConst::new(0, w).not()),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::And(rest))
            }
        }
    }

    pub fn mk_or(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let w = check_same_width(a, b, "or");
        let args = self.flatten2(
            |e| match e {
                Expr::Or(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut acc: Option<BvConst> = None;
        let mut rest: Vec<ExprRef> = Vec::new();
        for e in args {
            match e.as_const() {
                Some(c) => {
                    acc = Some(match acc {
                        Some(prev) => prev.or(c),
                        None => c.clone(),
                    })
                }
                None => {
                    if !rest.iter().any(|r| Arc::ptr_eq(r, &e)) {
                        rest.push(e);
                    }
                }
            }
        }

        if let Some(c) = &acc {
            if c.has_all_bits() {
                return self.mk_const(c.clone());
            }
        }
        if let Some(c) = acc.take().filter(|c| !c.is_zero()) {
            rest.push(self.mk_const(c));
        }
        match rest.len() {
            0 => self.mk_uconst(0, w),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::Or(rest))
            }
        }
    }

    pub fn mk_xor(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let w = check_same_width(a, b, "xor");
        let args = self.flatten2(
            |e| match e {
                Expr::Xor(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut acc: Option<BvConst> = None;
        let mut rest: Vec<ExprRef> = Vec::new();
        for e in args {
            match e.as_const() {
                Some(c) => {
                    acc = Some(match acc {
                        Some(prev) => prev.xor(c),
                        None => c.clone(),
                    })
                }
                None => rest.push(e),
            }
        }

        // x ^ x cancels pairwise
        let mut i = 0;
        'cancel: while i < rest.len() {
            for j in (i + 1)..rest.len() {
                if Arc::ptr_eq(&rest[i], &rest[j]) {
                    rest.remove(j);
                    rest.remove(i);
                    continue 'cancel;
                }
            }
            i += 1;
        }

        if let Some(c) = acc.take().filter(|c| !c.is_zero()) {
            rest.push(self.mk_const(c));
        }
        match rest.len() {
            0 => self.mk_uconst(0, w),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::Xor(rest))
            }
        }
    }

    pub fn mk_shl(&self, value: &ExprRef, amount: &ExprRef) -> ExprRef {
        let w = check_same_width(value, amount, "shl");
        if let Some(k) = amount.as_const() {
            let k = const_shift_amount(k, w);
            if k == 0 {
                return value.clone();
            }
            if k >= w {
                return self.mk_uconst(0, w);
            }
            if let Some(c) = value.as_const() {
                return self.mk_const(c.shl(k));
            }
        }
        self.intern(Expr::Shl {
            value: value.clone(),
            amount: amount.clone(),
        })
    }

    pub fn mk_lshr(&self, value: &ExprRef, amount: &ExprRef) -> ExprRef {
        let w = check_same_width(value, amount, "lshr");
        if let Some(k) = amount.as_const() {
            let k = const_shift_amount(k, w);
            if k == 0 {
                return value.clone();
            }
            if k >= w {
                return self.mk_uconst(0, w);
            }
            if let Some(c) = value.as_const() {
                return self.mk_const(c.lshr(k));
            }
        }
        self.intern(Expr::LShr {
            value: value.clone(),
            amount: amount.clone(),
        })
    }

    pub fn mk_ashr(&self, value: &ExprRef, amount: &ExprRef) -> ExprRef {
        let w = check_same_width(value, amount, "ashr");
        if let Some(k) = amount.as_const() {
            let k = const_shift_amount(k, w);
            if k == 0 {
                return value.clone();
            }
            if let Some(c) = value.as_const() {
                return self.mk_const(c.ashr(k));
            }
        }
        self.intern(Expr::AShr {
            value: value.clone(),
            amount: amount.clone(),
        })
    }

    pub fn mk_sdiv(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        let w = check_same_width(lhs, rhs, "sdiv");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if !b.is_zero() {
                return self.mk_const(a.sdiv(b));
            }
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_uconst(1, w);
        }
        self.intern(Expr::Sdiv {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_udiv(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "udiv");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if !b.is_zero() {
                return self.mk_const(a.udiv(b));
            }
        }
        self.intern(Expr::Udiv {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_srem(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "srem");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if !b.is_zero() {
                return self.mk_const(a.srem(b));
            }
        }
        self.intern(Expr::Srem {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_urem(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "urem");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if !b.is_zero() {
                return self.mk_const(a.urem(b));
            }
        }
        self.intern(Expr::Urem {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    // ---- comparisons ----

    pub fn mk_eq(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "eq");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.eq_value(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_true();
        }
        // symmetric: order operands so both argument orders intern to one node
        let (lhs, rhs) = if ptr_key(lhs) <= ptr_key(rhs) {
            (lhs, rhs)
        } else {
            (rhs, lhs)
        };
        self.intern(Expr::Eq {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_neq(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        let eq = self.mk_eq(lhs, rhs);
        self.mk_bool_not(&eq)
    }

    pub fn mk_ult(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "ult");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.ult(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_false();
        }
        self.intern(Expr::Ult {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_ule(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "ule");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.ule(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_true();
        }
        self.intern(Expr::Ule {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_ugt(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "ugt");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.ugt(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_false();
        }
        self.intern(Expr::Ugt {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_uge(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "uge");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.uge(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_true();
        }
        self.intern(Expr::Uge {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_slt(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "slt");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.slt(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_false();
        }
        self.intern(Expr::Slt {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_sle(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "sle");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.sle(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_true();
        }
        self.intern(Expr::Sle {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_sgt(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "sgt");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.sgt(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_false();
        }
        self.intern(Expr::Sgt {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn mk_sge(&self, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
        check_same_width(lhs, rhs, "sge");
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return self.mk_bool_const(a.sge(b));
        }
        if Arc::ptr_eq(lhs, rhs) {
            return self.mk_true();
        }
        self.intern(Expr::Sge {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    // ---- booleans ----

    pub fn mk_bool_not(&self, e: &ExprRef) -> ExprRef {
        expect_bool(e, "bool_not");
        if let Some(b) = e.as_bool_const() {
            return self.mk_bool_const(!b);
        }
        if let Expr::BoolNot(inner) = &**e {
            return inner.clone();
        }
        self.intern(Expr::BoolNot(e.clone()))
    }

    pub fn mk_bool_and(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        expect_bool(a, "bool_and");
        expect_bool(b, "bool_and");
        let args = self.flatten2(
            |e| match e {
                Expr::BoolAnd(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut rest: Vec<ExprRef> = Vec::new();
        for e in args {
            match e.as_bool_const() {
                Some(false) => return self.mk_false(),
                Some(true) => {}
                None => {
                    if !rest.iter().any(|r| Arc::ptr_eq(r, &e)) {
                        rest.push(e);
                    }
                }
            }
        }
        match rest.len() {
            0 => self.mk_true(),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::BoolAnd(rest))
            }
        }
    }

    pub fn mk_bool_or(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        expect_bool(a, "bool_or");
        expect_bool(b, "bool_or");
        let args = self.flatten2(
            |e| match e {
                Expr::BoolOr(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );

        let mut rest: Vec<ExprRef> = Vec::new();
        for e in args {
            match e.as_bool_const() {
                Some(true) => return self.mk_true(),
                Some(false) => {}
                None => {
                    if !rest.iter().any(|r| Arc::ptr_eq(r, &e)) {
                        rest.push(e);
                    }
                }
            }
        }
        match rest.len() {
            0 => self.mk_false(),
            1 => rest.pop().expect("nonempty"),
            _ => {
                rest.sort_by_key(ptr_key);
                self.intern(Expr::BoolOr(rest))
            }
        }
    }

    // ---- conversions between bools and bit-vectors ----

    /// A 1-bit vector carrying a boolean: 1 when true, 0 when false.
    pub fn bool_to_bv(&self, e: &ExprRef) -> ExprRef {
        expect_bool(e, "bool_to_bv");
        if let Some(b) = e.as_bool_const() {
            return self.mk_uconst(u64::from(b), 1);
        }
        self.intern(Expr::BoolToBv(e.clone()))
    }

    /// Truthiness of a bit-vector: `e != 0`, with round-trips through
    /// [`Self::bool_to_bv`] (possibly zero-extended) undone structurally.
    pub fn bv_to_bool(&self, e: &ExprRef) -> ExprRef {
        let w = width_of(e, "bv_to_bool");
        if let Some(c) = e.as_const() {
            return self.mk_bool_const(!c.is_zero());
        }
        match &**e {
            Expr::BoolToBv(inner) => return inner.clone(),
            Expr::Zext { expr, .. } => {
                if let Expr::BoolToBv(inner) = &**expr {
                    return inner.clone();
                }
            }
            _ => {}
        }
        let zero = self.mk_uconst(0, w);
        self.mk_neq(e, &zero)
    }

    /// The most significant bit of `e` as a 1-bit vector.
    pub fn sign_bit(&self, e: &ExprRef) -> ExprRef {
        let w = width_of(e, "sign_bit");
        self.mk_extract(e, w - 1, w - 1)
    }

    // ---- floating point ----

    pub fn mk_fp_const(&self, c: FpConst) -> ExprRef {
        self.intern(Expr::FpConst(c))
    }

    /// Reinterpret the bits of a bit-vector as a float of `format`.
    ///
    /// # Panics
    ///
    /// Panics if the expression width does not match the format.
    pub fn mk_bv_to_fp(&self, format: FpFormat, e: &ExprRef) -> ExprRef {
        let w = width_of(e, "bv_to_fp");
        assert!(
            w == format.bits(),
            "ExprBuilder: bv_to_fp: width {w} does not match {format:?}"
        );
        if let Some(c) = e.as_const() {
            return self.mk_fp_const(FpConst::from_bits(format, c.as_u64()));
        }
        if let Expr::FpToBv(inner) = &**e {
            return inner.clone();
        }
        self.intern(Expr::BvToFp {
            format,
            expr: e.clone(),
        })
    }

    /// The IEEE bits of a float as a bit-vector.
    pub fn mk_fp_to_bv(&self, e: &ExprRef) -> ExprRef {
        let format = expect_fp(e, "fp_to_bv");
        if let Expr::FpConst(c) = &**e {
            return self.mk_uconst(c.bits(), format.bits());
        }
        if let Expr::BvToFp { expr, .. } = &**e {
            return expr.clone();
        }
        self.intern(Expr::FpToBv(e.clone()))
    }

    pub fn mk_fp_convert(&self, format: FpFormat, e: &ExprRef) -> ExprRef {
        let from = expect_fp(e, "fp_convert");
        if from == format {
            return e.clone();
        }
        if let Expr::FpConst(c) = &**e {
            return self.mk_fp_const(c.convert(format));
        }
        self.intern(Expr::FpConvert {
            format,
            expr: e.clone(),
        })
    }

    /// Signed integer to float conversion.
    pub fn mk_int_to_fp(&self, format: FpFormat, e: &ExprRef) -> ExprRef {
        let w = width_of(e, "int_to_fp");
        if let Some(c) = e.as_const() {
            if w <= 64 {
                return self.mk_fp_const(FpConst::new(format, c.as_i64() as f64));
            }
        }
        self.intern(Expr::IntToFp {
            format,
            expr: e.clone(),
        })
    }

    pub fn mk_fp_is_nan(&self, e: &ExprRef) -> ExprRef {
        expect_fp(e, "fp_is_nan");
        if let Expr::FpConst(c) = &**e {
            return self.mk_bool_const(c.is_nan());
        }
        self.intern(Expr::FpIsNan(e.clone()))
    }

    pub fn mk_fp_neg(&self, e: &ExprRef) -> ExprRef {
        let format = expect_fp(e, "fp_neg");
        if let Expr::FpConst(c) = &**e {
            let sign = 1u64 << (format.bits() - 1);
            return self.mk_fp_const(FpConst::from_bits(format, c.bits() ^ sign));
        }
        self.intern(Expr::FpNeg(e.clone()))
    }

    fn check_same_format(&self, a: &ExprRef, b: &ExprRef, op: &str) -> FpFormat {
        let fa = expect_fp(a, op);
        let fb = expect_fp(b, op);
        assert!(
            fa == fb,
            "ExprBuilder: {op}: format mismatch ({fa:?} vs {fb:?})"
        );
        fa
    }

    pub fn mk_fp_add(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let format = self.check_same_format(a, b, "fp_add");
        if let (Expr::FpConst(ca), Expr::FpConst(cb)) = (&**a, &**b) {
            return self.mk_fp_const(FpConst::new(format, ca.value() + cb.value()));
        }
        let args = self.flatten2(
            |e| match e {
                Expr::FpAdd(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );
        self.intern(Expr::FpAdd(args))
    }

    pub fn mk_fp_mul(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let format = self.check_same_format(a, b, "fp_mul");
        if let (Expr::FpConst(ca), Expr::FpConst(cb)) = (&**a, &**b) {
            return self.mk_fp_const(FpConst::new(format, ca.value() * cb.value()));
        }
        let args = self.flatten2(
            |e| match e {
                Expr::FpMul(args) => Some(args),
                _ => None,
            },
            a,
            b,
        );
        self.intern(Expr::FpMul(args))
    }

    pub fn mk_fp_div(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        let format = self.check_same_format(a, b, "fp_div");
        if let (Expr::FpConst(ca), Expr::FpConst(cb)) = (&**a, &**b) {
            return self.mk_fp_const(FpConst::new(format, ca.value() / cb.value()));
        }
        self.intern(Expr::FpDiv {
            lhs: a.clone(),
            rhs: b.clone(),
        })
    }

    pub fn mk_fp_lt(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        self.check_same_format(a, b, "fp_lt");
        if let (Expr::FpConst(ca), Expr::FpConst(cb)) = (&**a, &**b) {
            return self.mk_bool_const(ca.value() < cb.value());
        }
        self.intern(Expr::FpLt {
            lhs: a.clone(),
            rhs: b.clone(),
        })
    }

    pub fn mk_fp_eq(&self, a: &ExprRef, b: &ExprRef) -> ExprRef {
        self.check_same_format(a, b, "fp_eq");
        if let (Expr::FpConst(ca), Expr::FpConst(cb)) = (&**a, &**b) {
            return self.mk_bool_const(ca.value() == cb.value());
        }
        self.intern(Expr::FpEq {
            lhs: a.clone(),
            rhs: b.clone(),
        })
    }
}
