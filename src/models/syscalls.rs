//! Syscall dispatch: the platform model the interpreter consults on
//! `CALLOTHER`.
//!
//! Syscall models read their arguments through the architecture's syscall
//! convention and resume at the already-set program counter (the instruction
//! fall-through) rather than popping a return address.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ExecError, ExecResult};
use crate::executor::ExecutorResult;
use crate::expr::{BvConst, ExprRef};
use crate::models::Model;
use crate::state::State;

/// Maps syscall numbers to models.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    fn syscall(&self, num: u64) -> Option<Arc<dyn Model>>;
}

fn concrete(e: &ExprRef, reason: &'static str) -> ExecResult<u64> {
    e.as_const()
        .map(BvConst::as_u64)
        .ok_or(ExecError::ModelAbi {
            model: "syscall",
            reason,
        })
}

fn ret_value(state: &mut State, value: u64) -> ExecResult<()> {
    let arch = state.arch();
    let width = arch.ptr_size();
    let value = state.builder().mk_uconst(value, width);
    arch.set_return_int_value(crate::arch::CallConv::Cdecl, state, &value)
}

struct SysRead;

impl Model for SysRead {
    fn name(&self) -> &'static str {
        "sys_read"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let fd = arch.get_syscall_param(&mut state, 0)?;
        let buf = arch.get_syscall_param(&mut state, 1)?;
        let size = arch.get_syscall_param(&mut state, 2)?;
        let fd = concrete(&fd, "symbolic file descriptor")? as i32;
        let buf = concrete(&buf, "symbolic buffer address")?;
        let size = concrete(&size, "symbolic size")?;

        if size > 0 {
            let data = state.fs().read(fd, size as usize)?;
            state.write_buf(buf, &data)?;
        }
        debug!(fd, size, "sys_read");

        ret_value(&mut state, size)?;
        out.active.push(state);
        Ok(())
    }
}

struct SysWrite;

impl Model for SysWrite {
    fn name(&self) -> &'static str {
        "sys_write"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let fd = arch.get_syscall_param(&mut state, 0)?;
        let buf = arch.get_syscall_param(&mut state, 1)?;
        let size = arch.get_syscall_param(&mut state, 2)?;
        let fd = concrete(&fd, "symbolic file descriptor")? as i32;
        let buf = concrete(&buf, "symbolic buffer address")?;
        let size = concrete(&size, "symbolic size")?;

        if size > 0 {
            let data = state.read_buf(buf, size as usize)?;
            state.fs().write(fd, &data)?;
        }
        debug!(fd, size, "sys_write");

        ret_value(&mut state, size)?;
        out.active.push(state);
        Ok(())
    }
}

struct SysOpen;

impl Model for SysOpen {
    fn name(&self) -> &'static str {
        "sys_open"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let path = arch.get_syscall_param(&mut state, 0)?;
        let path = concrete(&path, "symbolic path pointer")?;

        let mut name = String::new();
        for off in 0.. {
            let byte = state.read_at(path + off, 1)?;
            let byte = byte.as_const().ok_or(ExecError::ModelAbi {
                model: "syscall",
                reason: "symbolic path contents",
            })?;
            if byte.is_zero() {
                break;
            }
            name.push(byte.as_u64() as u8 as char);
        }

        let fd = state.fs().open(&name);
        debug!(path = %name, fd, "sys_open");
        ret_value(&mut state, fd as u32 as u64)?;
        out.active.push(state);
        Ok(())
    }
}

struct SysClose;

impl Model for SysClose {
    fn name(&self) -> &'static str {
        "sys_close"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let fd = arch.get_syscall_param(&mut state, 0)?;
        let fd = concrete(&fd, "symbolic file descriptor")? as i32;

        state.fs().close(fd)?;
        ret_value(&mut state, 0)?;
        out.active.push(state);
        Ok(())
    }
}

struct SysExit;

impl Model for SysExit {
    fn name(&self) -> &'static str {
        "sys_exit"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let code = arch.get_syscall_param(&mut state, 0)?;
        let code = concrete(&code, "symbolic exit code")?;
        state.set_exited(code as u32 as i32);
        out.exited.push(state);
        Ok(())
    }
}

/// The Linux syscall table (the subset the engine models).
pub struct LinuxSyscalls {
    table: BTreeMap<u64, Arc<dyn Model>>,
}

impl LinuxSyscalls {
    pub fn new() -> Self {
        let mut table: BTreeMap<u64, Arc<dyn Model>> = BTreeMap::new();
        table.insert(0, Arc::new(SysRead));
        table.insert(1, Arc::new(SysWrite));
        table.insert(2, Arc::new(SysOpen));
        table.insert(3, Arc::new(SysClose));
        table.insert(60, Arc::new(SysExit));
        Self { table }
    }
}

impl Default for LinuxSyscalls {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LinuxSyscalls {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn syscall(&self, num: u64) -> Option<Arc<dyn Model>> {
        self.table.get(&num).cloned()
    }
}
