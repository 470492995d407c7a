//! Symbol-indexed storage of path constraints.
//!
//! Constraints are indexed under every symbol they mention, and symbols that
//! ever co-occur in a constraint become adjacent in a dependency graph. A
//! query about an expression then only needs the constraints whose symbols
//! lie in the reflexive-transitive closure of the expression's support.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use indexmap::IndexSet;
use once_cell::sync::Lazy;

use crate::expr::{Expr, ExprBuilder, ExprRef};

/// An expression keyed by node identity. Interning makes this sound:
/// structurally equal expressions share one address.
#[derive(Clone)]
struct ByAddress(ExprRef);

impl PartialEq for ByAddress {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ByAddress {}

impl Hash for ByAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Process-global, append-only memo of `expr -> transitive symbol support`.
/// Entries hold strong references, so a memoized node's address can never be
/// reused; sharing the cache across all managers is sound because expression
/// identities are unique and immutable.
static SUPPORT_CACHE: Lazy<Mutex<HashMap<ByAddress, Arc<BTreeSet<u32>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The set of symbol ids occurring in `e`.
pub fn involved_symbols(e: &ExprRef) -> Arc<BTreeSet<u32>> {
    {
        let cache = SUPPORT_CACHE.lock().expect("support cache poisoned");
        if let Some(hit) = cache.get(&ByAddress(e.clone())) {
            return hit.clone();
        }
    }

    let mut support = BTreeSet::new();
    if let Expr::Sym { id, .. } = &**e {
        support.insert(*id);
    } else {
        for child in e.children() {
            support.extend(involved_symbols(&child).iter().copied());
        }
    }

    let support = Arc::new(support);
    let mut cache = SUPPORT_CACHE.lock().expect("support cache poisoned");
    cache
        .entry(ByAddress(e.clone()))
        .or_insert_with(|| support.clone())
        .clone()
}

/// Symbol-indexed constraint store with a symbol adjacency graph.
#[derive(Clone, Default)]
pub struct ConstraintManager {
    /// symbol id -> constraints mentioning it, in insertion order.
    constraints: BTreeMap<u32, IndexSet<ByAddress>>,
    /// symbol id -> symbols it ever co-occurred with (reflexive).
    dependencies: BTreeMap<u32, IndexSet<u32>>,
}

impl ConstraintManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the boolean constraint `c`: index it under every symbol of its
    /// support, and union the support cliquewise into the adjacency graph.
    pub fn add(&mut self, c: &ExprRef) {
        let support = involved_symbols(c);
        for &sym in support.iter() {
            self.constraints
                .entry(sym)
                .or_default()
                .insert(ByAddress(c.clone()));
            let row = self.dependencies.entry(sym).or_default();
            row.extend(support.iter().copied());
        }
    }

    /// Reflexive-transitive closure of `e`'s support over the adjacency
    /// graph.
    pub fn dependencies(&self, e: &ExprRef) -> BTreeSet<u32> {
        let mut queue: Vec<u32> = involved_symbols(e).iter().copied().collect();
        let mut closure = BTreeSet::new();

        while let Some(sym) = queue.pop() {
            if !closure.insert(sym) {
                continue;
            }
            if let Some(row) = self.dependencies.get(&sym) {
                queue.extend(row.iter().copied().filter(|s| !closure.contains(s)));
            }
        }
        closure
    }

    /// The path condition: the conjunction of every stored constraint whose
    /// symbols lie in `dependencies(e)` (every stored constraint when `e` is
    /// absent). Deterministic: symbols ascending, insertion order within a
    /// symbol, duplicates skipped by identity.
    pub fn pi(&self, builder: &ExprBuilder, e: Option<&ExprRef>) -> ExprRef {
        let scope: Option<BTreeSet<u32>> = e.map(|e| self.dependencies(e));

        let mut seen: IndexSet<ByAddress> = IndexSet::new();
        for (sym, constraints) in &self.constraints {
            if let Some(scope) = &scope {
                if !scope.contains(sym) {
                    continue;
                }
            }
            for c in constraints {
                seen.insert(c.clone());
            }
        }

        let mut pi = builder.mk_true();
        for c in &seen {
            pi = builder.mk_bool_and(&pi, &c.0);
        }
        pi
    }

    /// Every stored constraint, deduplicated, in deterministic order.
    pub fn all_constraints(&self) -> Vec<ExprRef> {
        let mut seen: IndexSet<ByAddress> = IndexSet::new();
        for constraints in self.constraints.values() {
            for c in constraints {
                seen.insert(c.clone());
            }
        }
        seen.into_iter().map(|c| c.0).collect()
    }
}
