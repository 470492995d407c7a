//! Models of external functions and syscalls.
//!
//! A model is a side-effecting stub the interpreter runs instead of lifting
//! machine code: it reads its parameters through the architecture's calling
//! convention, mutates the state (heap, file system, memory), writes a
//! return value, and either returns through the ABI or marks the state as
//! exited.

use crate::arch::CallConv;
use crate::error::ExecResult;
use crate::executor::ExecutorResult;
use crate::state::State;

pub mod libc;
mod linker;
pub mod syscalls;

pub use linker::Linker;
pub use syscalls::{LinuxSyscalls, Platform};

/// An external-function or syscall stub.
pub trait Model: Send + Sync {
    /// The import name this model binds to.
    fn name(&self) -> &'static str;

    /// The calling convention the model reads its parameters with.
    fn call_conv(&self) -> CallConv {
        CallConv::Cdecl
    }

    /// Run the model on `state`, pushing every successor (active or exited)
    /// into `out`.
    fn exec(&self, state: State, out: &mut ExecutorResult) -> ExecResult<()>;
}
