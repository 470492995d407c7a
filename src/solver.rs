//! Solver-facing types: check results and the SMT backend contract.

use std::collections::HashMap;

use crate::expr::{BvConst, ExprRef};

mod constraints;
mod z3;

pub use constraints::ConstraintManager;
pub use self::z3::Z3Backend;

/// Outcome of a satisfiability query.
///
/// `Unknown` must always be treated as "cannot conclude reachable" by
/// callers: dropping a path on `Unknown` is safe, following it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Sat,
    Unsat,
    Unknown,
}

/// An SMT backend, used in a fresh-context-per-query pattern: every call is
/// self-contained and no solver state survives between calls. Caching (the
/// current model) lives in the solver facade, not here.
pub trait SmtBackend: Send + Sync {
    /// Check the boolean `query`; on SAT, return an assignment for every
    /// symbol occurring in it.
    fn check_with_model(&self, query: &ExprRef) -> (CheckResult, Option<HashMap<u32, BvConst>>);

    /// Up to `n` distinct satisfying values of `e` under `pi`.
    fn eval_upto(&self, e: &ExprRef, pi: &ExprRef, n: u32) -> Vec<BvConst>;
}
