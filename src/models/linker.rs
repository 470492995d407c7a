//! Binding of imported functions to models.
//!
//! For every `FUNC` relocation of the loaded binary the linker allocates a
//! sentinel program counter in the architecture's reserved external range,
//! stores that sentinel at the relocation site, and records the model under
//! the sentinel in the state. When the interpreter later lands on a sentinel
//! it runs the model instead of lifting bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::consts::UNMODELLED_RETCODE;
use crate::error::ExecResult;
use crate::executor::ExecutorResult;
use crate::loader::RelocationType;
use crate::models::{libc, Model};
use crate::state::State;

/// Fallback for imports without a model: the state exits with a sentinel
/// return code instead of bringing the engine down.
struct UnmodelledFunction;

impl Model for UnmodelledFunction {
    fn name(&self) -> &'static str {
        "unmodelled_function"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        info!("called an unmodelled function, exiting state");
        state.set_exited(UNMODELLED_RETCODE);
        out.exited.push(state);
        Ok(())
    }
}

/// Registry of function models, keyed by import name.
pub struct Linker {
    models: BTreeMap<&'static str, Arc<dyn Model>>,
}

impl Linker {
    /// A linker with the stock model directory registered.
    pub fn new() -> Self {
        let mut linker = Self {
            models: BTreeMap::new(),
        };
        for model in libc::all_models() {
            linker.register_model(model);
        }
        linker
    }

    pub fn register_model(&mut self, model: Arc<dyn Model>) {
        self.models.insert(model.name(), model);
    }

    pub fn model(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.models.get(name).cloned()
    }

    /// Resolve the binary's dynamic relocations into `state`.
    pub fn link(&self, state: &mut State) -> ExecResult<()> {
        let arch = state.arch();
        let ptr_bits = arch.ptr_size();
        let ptr_bytes = (ptr_bits / 8) as u64;
        let mut sentinel = arch.ext_func_base();

        // slot zero is the exit wrapper the entry trampoline returns into
        let wrapper = self
            .model("libc_start_main_exit_wrapper")
            .expect("stock models are registered");
        state.register_linked_function(sentinel, wrapper);
        state.set_exit_wrapper(sentinel);
        sentinel += ptr_bytes;

        let relocations: Vec<_> = state
            .address_space()
            .relocations()
            .iter()
            .filter(|r| r.ty() == RelocationType::Func)
            .cloned()
            .collect();

        for reloc in relocations {
            let model: Arc<dyn Model> = match self.model(reloc.name()) {
                Some(model) => model,
                None => {
                    info!(name = reloc.name(), "no model for linked function");
                    Arc::new(UnmodelledFunction)
                }
            };

            let addr_expr = state.builder().mk_uconst(sentinel, ptr_bits);
            state.write_at(reloc.addr(), &addr_expr)?;
            state.register_linked_function(sentinel, model);
            sentinel += ptr_bytes;
        }
        Ok(())
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}
