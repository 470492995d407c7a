//! Per-state solver facade: path constraints plus a cached model.
//!
//! The facade answers as much as it can from the cached model (cheap
//! evaluation) and only falls back to the SMT backend on a miss. Adding a
//! constraint invalidates exactly the model entries its symbols can reach
//! through the dependency graph.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::expr::{evaluate, BvConst, ExprBuilder, ExprRef, Sort};
use crate::solver::{CheckResult, ConstraintManager, SmtBackend};

/// Owns a state's constraint manager, its (possibly partial, possibly stale)
/// model, and a handle to the shared SMT backend.
#[derive(Clone)]
pub struct Solver {
    builder: Arc<ExprBuilder>,
    backend: Arc<dyn SmtBackend>,
    manager: ConstraintManager,
    model: HashMap<u32, BvConst>,
}

impl Solver {
    pub fn new(builder: Arc<ExprBuilder>, backend: Arc<dyn SmtBackend>) -> Self {
        Self {
            builder,
            backend,
            manager: ConstraintManager::new(),
            model: HashMap::new(),
        }
    }

    pub fn manager(&self) -> &ConstraintManager {
        &self.manager
    }

    /// The cached model entry for a symbol, if the cache holds one.
    pub fn model_value(&self, sym: u32) -> Option<&BvConst> {
        self.model.get(&sym)
    }

    /// The path condition scoped to `e`'s dependencies (or the whole path
    /// condition when `e` is `None`).
    pub fn pi(&self, e: Option<&ExprRef>) -> ExprRef {
        self.manager.pi(&self.builder, e)
    }

    fn add_inner(&mut self, c: &ExprRef, invalidate_model: bool) {
        if c.as_bool_const() != Some(true) {
            self.manager.add(c);
        }
        if invalidate_model {
            for sym in self.manager.dependencies(c) {
                self.model.remove(&sym);
            }
        }
    }

    /// Push a path constraint, invalidating every model entry it may touch.
    pub fn add(&mut self, c: &ExprRef) {
        self.add_inner(c, true);
    }

    fn check_sat(&mut self, c: &ExprRef, populate_model: bool) -> CheckResult {
        if let Some(value) = c.as_bool_const() {
            return if value {
                CheckResult::Sat
            } else {
                CheckResult::Unsat
            };
        }

        // cheap path: the cached model may already witness the constraint
        let under_model = evaluate(&self.builder, c, &self.model, false);
        if under_model.as_bool_const() == Some(true) {
            return CheckResult::Sat;
        }

        let pi = self.pi(Some(c));
        let query = self.builder.mk_bool_and(&pi, c);
        debug!(%query, "backend query");
        let (res, model) = self.backend.check_with_model(&query);
        if res == CheckResult::Sat && populate_model {
            if let Some(model) = model {
                self.model.extend(model);
            }
        }
        res
    }

    /// Is the path condition satisfiable? On SAT the cached model is
    /// refreshed from the backend's assignment.
    pub fn satisfiable(&mut self) -> CheckResult {
        let pi = self.pi(None);
        if let Some(value) = pi.as_bool_const() {
            return if value {
                CheckResult::Sat
            } else {
                CheckResult::Unsat
            };
        }

        let under_model = evaluate(&self.builder, &pi, &self.model, false);
        if under_model.as_bool_const() == Some(true) {
            return CheckResult::Sat;
        }

        let (res, model) = self.backend.check_with_model(&pi);
        if res == CheckResult::Sat {
            if let Some(model) = model {
                self.model.extend(model);
            }
        }
        res
    }

    /// Could `c` hold on this path? Does not mutate the constraint store.
    pub fn may_be_true(&mut self, c: &ExprRef) -> CheckResult {
        self.check_sat(c, false)
    }

    /// Check `pi ∧ c`; when satisfiable, add `c` without discarding the model
    /// that was just computed for it.
    pub fn check_sat_and_add_if_sat(&mut self, c: &ExprRef) -> CheckResult {
        let res = self.check_sat(c, true);
        if res == CheckResult::Sat {
            self.add_inner(c, false);
        }
        res
    }

    /// A concrete value of `e` under the current path condition, or `None`
    /// when the path is unsatisfiable (or the backend cannot tell).
    ///
    /// Missing symbols after a SAT result are completed with zero, so
    /// evaluation is total on satisfiable paths.
    pub fn evaluate(&mut self, e: &ExprRef) -> Option<BvConst> {
        let needed = self.manager.dependencies(e);
        if needed.iter().any(|sym| !self.model.contains_key(sym)) {
            let pi = self.pi(Some(e));
            if self.check_sat(&pi, true) != CheckResult::Sat {
                return None;
            }
        }

        let result = evaluate(&self.builder, e, &self.model, true);
        match result.sort() {
            Sort::Bv(_) => Some(result.as_const().expect("completion yields a constant").clone()),
            Sort::Bool => {
                let value = result
                    .as_bool_const()
                    .expect("completion yields a constant");
                Some(BvConst::new(u64::from(value), 1))
            }
            Sort::Fp(format) => {
                // fold the float back to its bits; completion guarantees a
                // constant here as well
                let bits = self.builder.mk_fp_to_bv(&result);
                bits.as_const().map(|c| c.clone()).or_else(|| {
                    debug!(?format, "float evaluation did not fold");
                    None
                })
            }
        }
    }

    /// Up to `n` distinct satisfying values of `e`.
    pub fn evaluate_upto(&mut self, e: &ExprRef, n: u32) -> Option<Vec<BvConst>> {
        let pi = self.pi(Some(e));
        if self.check_sat(&pi, true) != CheckResult::Sat {
            return None;
        }
        Some(self.backend.eval_upto(e, &pi, n))
    }
}
