//! Exploration drivers: find/avoid search and path enumeration.

use std::collections::BTreeSet;

use tracing::debug;

use super::{ExecConfig, ExecutorResult, ExplorationTechnique, PcodeExecutor};
use crate::error::ExecResult;
use crate::solver::CheckResult;
use crate::state::State;

/// Owns the interpreter, an exploration discipline, and the outflow lists of
/// finished states.
pub struct ExecutorManager<E: ExplorationTechnique> {
    executor: PcodeExecutor,
    exploration: E,
    exited: Vec<State>,
    avoided: Vec<State>,
    steps: usize,
}

impl<E: ExplorationTechnique> ExecutorManager<E> {
    /// Build a manager around an initial state; the exploration discipline is
    /// expected to already hold it.
    pub fn new(initial: &State, exploration: E) -> Self {
        Self::with_config(initial, exploration, ExecConfig::default())
    }

    pub fn with_config(initial: &State, exploration: E, config: ExecConfig) -> Self {
        let executor = PcodeExecutor::with_config(initial.builder(), initial.lifter(), config);
        Self {
            executor,
            exploration,
            exited: Vec::new(),
            avoided: Vec::new(),
            steps: 0,
        }
    }

    /// Basic blocks stepped so far, across all states.
    pub fn steps_executed(&self) -> usize {
        self.steps
    }

    pub fn num_states(&self) -> usize {
        self.exploration.num_states()
    }

    /// States that terminated so far.
    pub fn exited_states(&self) -> &[State] {
        &self.exited
    }

    /// States dropped because they reached an avoid address.
    pub fn avoided_states(&self) -> &[State] {
        &self.avoided
    }

    /// Explore until a state reaches an address in `find` on a satisfiable
    /// path. States reaching an address in `avoid` are parked; exhaustion
    /// returns `None`.
    pub fn explore(&mut self, find: &[u64], avoid: &[u64]) -> ExecResult<Option<State>> {
        let find: BTreeSet<u64> = find.iter().copied().collect();
        let avoid: BTreeSet<u64> = avoid.iter().copied().collect();

        while let Some(state) = self.exploration.next_state() {
            self.steps += 1;
            let ExecutorResult { active, exited } = self.executor.execute_basic_block(state)?;
            self.exited.extend(exited);

            let mut surviving = Vec::with_capacity(active.len());
            for mut succ in active {
                if find.contains(&succ.pc()) {
                    match succ.satisfiable() {
                        CheckResult::Sat => {
                            debug!(pc = format_args!("{:#x}", succ.pc()), "find address reached");
                            return Ok(Some(succ));
                        }
                        // an infeasible or undecidable hit is not a hit
                        CheckResult::Unsat | CheckResult::Unknown => continue,
                    }
                }
                if avoid.contains(&succ.pc()) {
                    self.avoided.push(succ);
                    continue;
                }
                surviving.push(succ);
            }
            self.exploration.add_actives(surviving);
        }
        Ok(None)
    }

    /// Single-target convenience form of [`Self::explore`].
    pub fn explore_to(&mut self, find: u64) -> ExecResult<Option<State>> {
        self.explore(&[find], &[])
    }

    /// Run every path to termination, handing each satisfiable exited state
    /// to `callback`.
    pub fn gen_paths(&mut self, mut callback: impl FnMut(State)) -> ExecResult<()> {
        while let Some(state) = self.exploration.next_state() {
            self.steps += 1;
            let ExecutorResult { active, exited } = self.executor.execute_basic_block(state)?;

            for mut done in exited {
                if done.satisfiable() == CheckResult::Sat {
                    callback(done);
                }
            }
            self.exploration.add_actives(active);
        }
        Ok(())
    }
}
