//! Exploration disciplines: which state runs next.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::consts::RAND_EXPLORATION_SEED;
use crate::state::State;

/// A pluggable active-state collection.
pub trait ExplorationTechnique {
    /// Enqueue one successor.
    fn add_active(&mut self, state: State);

    /// Enqueue a batch of successors; disciplines that care about batch
    /// structure (shuffling) override this.
    fn add_actives(&mut self, states: Vec<State>) {
        for state in states {
            self.add_active(state);
        }
    }

    /// The next state to advance, or `None` when exploration is exhausted.
    fn next_state(&mut self) -> Option<State>;

    /// Number of queued states.
    fn num_states(&self) -> usize;
}

/// Breadth-first: states run in the order they were discovered.
#[derive(Default)]
pub struct BfsExploration {
    queue: VecDeque<State>,
}

impl BfsExploration {
    pub fn new(initial: State) -> Self {
        let mut this = Self::default();
        this.add_active(initial);
        this
    }
}

impl ExplorationTechnique for BfsExploration {
    fn add_active(&mut self, state: State) {
        self.queue.push_front(state);
    }

    fn next_state(&mut self) -> Option<State> {
        self.queue.pop_back()
    }

    fn num_states(&self) -> usize {
        self.queue.len()
    }
}

/// Depth-first: always follow the most recent fork.
#[derive(Default)]
pub struct DfsExploration {
    stack: Vec<State>,
}

impl DfsExploration {
    pub fn new(initial: State) -> Self {
        let mut this = Self::default();
        this.add_active(initial);
        this
    }
}

impl ExplorationTechnique for DfsExploration {
    fn add_active(&mut self, state: State) {
        self.stack.push(state);
    }

    fn next_state(&mut self) -> Option<State> {
        self.stack.pop()
    }

    fn num_states(&self) -> usize {
        self.stack.len()
    }
}

/// Depth-first with each fork's successors shuffled by a fixed-seed
/// generator, so runs are randomized but reproducible.
pub struct RandDfsExploration {
    stack: Vec<State>,
    rng: StdRng,
}

impl RandDfsExploration {
    pub fn new(initial: State) -> Self {
        let mut this = Self {
            stack: Vec::new(),
            rng: StdRng::seed_from_u64(RAND_EXPLORATION_SEED),
        };
        this.add_active(initial);
        this
    }
}

impl ExplorationTechnique for RandDfsExploration {
    fn add_active(&mut self, state: State) {
        self.stack.push(state);
    }

    fn add_actives(&mut self, mut states: Vec<State>) {
        states.shuffle(&mut self.rng);
        self.stack.extend(states);
    }

    fn next_state(&mut self) -> Option<State> {
        self.stack.pop()
    }

    fn num_states(&self) -> usize {
        self.stack.len()
    }
}

/// Coverage-guided: states that reach a new address run first, then states
/// in a new call context, then everything else.
pub struct CovExploration {
    new_addr_queue: Vec<State>,
    new_context_queue: Vec<State>,
    other_queue: Vec<State>,
    visited_addrs: HashSet<u64>,
    visited_contexts: HashSet<u64>,
}

/// Order-sensitive digest of `(pc, stacktrace)`.
fn context_checksum(state: &State) -> u64 {
    let mut hasher = DefaultHasher::new();
    state.pc().hash(&mut hasher);
    for addr in state.stacktrace() {
        addr.hash(&mut hasher);
    }
    hasher.finish()
}

impl CovExploration {
    pub fn new(initial: State) -> Self {
        let mut this = Self {
            new_addr_queue: Vec::new(),
            new_context_queue: Vec::new(),
            other_queue: Vec::new(),
            visited_addrs: HashSet::new(),
            visited_contexts: HashSet::new(),
        };
        this.add_active(initial);
        this
    }
}

impl ExplorationTechnique for CovExploration {
    fn add_active(&mut self, state: State) {
        let context = context_checksum(&state);
        if self.visited_addrs.insert(state.pc()) {
            self.visited_contexts.insert(context);
            self.new_addr_queue.push(state);
        } else if self.visited_contexts.insert(context) {
            self.new_context_queue.push(state);
        } else {
            self.other_queue.push(state);
        }
    }

    fn next_state(&mut self) -> Option<State> {
        self.new_addr_queue
            .pop()
            .or_else(|| self.new_context_queue.pop())
            .or_else(|| self.other_queue.pop())
    }

    fn num_states(&self) -> usize {
        self.new_addr_queue.len() + self.new_context_queue.len() + self.other_queue.len()
    }
}
