//! Basic-block stepping and exploration over symbolic states.

use crate::state::State;

mod exploration;
mod interpreter;
mod manager;

pub use exploration::{
    BfsExploration, CovExploration, DfsExploration, ExplorationTechnique, RandDfsExploration,
};
pub use interpreter::PcodeExecutor;
pub use manager::ExecutorManager;

/// The successors produced by stepping one state across one basic block.
#[derive(Default)]
pub struct ExecutorResult {
    /// States that keep running; for a conditional branch the fall-through
    /// state comes first.
    pub active: Vec<State>,
    /// States that terminated (program exit, unmodelled import).
    pub exited: Vec<State>,
}

/// Interpreter tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Fork on symbolic branches without solver queries; infeasible paths
    /// are pruned later, when something asks for their satisfiability.
    pub lazy_solving: bool,
    /// Fan-out cap when a symbolic program counter is concretized.
    pub max_pc_solutions: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            lazy_solving: false,
            max_pc_solutions: crate::consts::DEFAULT_MAX_PC_SOLUTIONS,
        }
    }
}
