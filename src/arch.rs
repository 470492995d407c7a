//! Architecture contract: ABI knowledge the interpreter and models consume.

use crate::error::ExecResult;
use crate::executor::ExecutorResult;
use crate::expr::ExprRef;
use crate::state::State;

mod amd64;

pub use amd64::Amd64;

/// Byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// Calling conventions the models understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// The platform's default C convention.
    Cdecl,
}

/// Architecture description: endianness, address layout, and the ABI
/// accessors the function models are written against.
pub trait Arch: Send + Sync {
    fn description(&self) -> &str;

    fn endianness(&self) -> Endianness;

    /// Pointer width in bits.
    fn ptr_size(&self) -> u32;

    /// Initial stack pointer of a fresh state.
    fn stack_base(&self) -> u64;

    /// Base of the bump-allocated heap.
    fn heap_base(&self) -> u64;

    /// Base of the reserved range where the linker parks external-function
    /// sentinel addresses.
    fn ext_func_base(&self) -> u64;

    /// Populate the initial register file of a fresh state.
    fn init_state(&self, state: &mut State) -> ExecResult<()>;

    /// Push a pointer-wide value onto the stack.
    ///
    /// # Panics
    ///
    /// Panics if `val` is not pointer-wide.
    fn stack_push(&self, state: &mut State, val: &ExprRef) -> ExecResult<()>;

    /// Pop a pointer-wide value off the stack.
    fn stack_pop(&self, state: &mut State) -> ExecResult<ExprRef>;

    /// Overwrite the return-address slot the next `handle_return` will pop.
    fn set_return(&self, state: &mut State, addr: &ExprRef) -> ExecResult<()>;

    /// Pop a return address, set the program counter, and emit the state as
    /// an active successor. Symbolic return addresses are rejected.
    fn handle_return(&self, state: State, out: &mut ExecutorResult) -> ExecResult<()>;

    /// Integer parameter `i` under convention `cv`.
    fn get_int_param(&self, cv: CallConv, state: &mut State, i: u32) -> ExecResult<ExprRef>;

    /// Place integer parameters for an outgoing call.
    fn set_int_params(&self, cv: CallConv, state: &mut State, vals: &[ExprRef]) -> ExecResult<()>;

    /// Write the integer return value (zero-extended to pointer width).
    fn set_return_int_value(
        &self,
        cv: CallConv,
        state: &mut State,
        val: &ExprRef,
    ) -> ExecResult<()>;

    /// Read the integer return value.
    fn get_return_int_value(&self, cv: CallConv, state: &mut State) -> ExecResult<ExprRef>;

    /// The syscall number of a pending `CALLOTHER` syscall.
    fn get_syscall_num(&self, state: &mut State) -> ExecResult<ExprRef>;

    /// Syscall argument `i`.
    fn get_syscall_param(&self, state: &mut State, i: u32) -> ExecResult<ExprRef>;
}
