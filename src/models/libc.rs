//! Models of the C library functions the engine intercepts.
//!
//! Every model reads its parameters through the calling convention, performs
//! its side effect on the state, writes the return value into the ABI slot,
//! and returns through the architecture (or exits the state). Pointers and
//! sizes must be concrete; models do not fork on symbolic addresses.

use std::sync::Arc;

use tracing::debug;

use crate::arch::CallConv;
use crate::consts::{FD_STDOUT, MAX_STRING_FORKS};
use crate::error::{ExecError, ExecResult};
use crate::executor::ExecutorResult;
use crate::expr::{BvConst, ExprRef};
use crate::models::Model;
use crate::solver::CheckResult;
use crate::state::State;

fn concrete(
    e: &ExprRef,
    model: &'static str,
    reason: &'static str,
) -> ExecResult<u64> {
    e.as_const()
        .map(BvConst::as_u64)
        .ok_or(ExecError::ModelAbi { model, reason })
}

/// A string read out of a state's memory, possibly after forking on symbolic
/// bytes. `bytes` runs up to and including the NUL terminator, except when a
/// length bound cut the walk short.
pub(crate) struct ResolvedString {
    pub state: State,
    pub bytes: Vec<ExprRef>,
}

impl ResolvedString {
    /// Length excluding the terminator.
    fn len(&self) -> u64 {
        self.bytes.len() as u64 - 1
    }

    /// The bytes as one expression, first byte most significant (buffer
    /// order).
    fn as_expr(&self) -> ExprRef {
        let builder = self.state.builder();
        let mut it = self.bytes.iter();
        let mut acc = it.next().expect("strings hold at least the NUL").clone();
        for byte in it {
            acc = builder.mk_concat(&acc, byte);
        }
        acc
    }
}

/// Walk the NUL-terminated string at `addr`, forking when a byte is symbolic
/// and may or may not be the terminator. At most `max_forks` early
/// terminations are explored; when the budget runs out the string is forced
/// to end at the current byte. `max_len` bounds the walk for the `strn*`
/// family (the cut-short result carries no terminator).
pub(crate) fn resolve_string(
    state: State,
    addr: u64,
    max_forks: u32,
    max_len: Option<u64>,
) -> ExecResult<Vec<ResolvedString>> {
    let builder = state.builder();
    let zero = builder.mk_uconst(0, 8);

    let mut results = Vec::new();
    let mut forks = 0u32;
    let mut cur = state;
    let mut bytes: Vec<ExprRef> = Vec::new();

    loop {
        if let Some(max_len) = max_len {
            if bytes.len() as u64 >= max_len {
                results.push(ResolvedString { state: cur, bytes });
                break;
            }
        }

        let byte = cur.read_at(addr + bytes.len() as u64, 1)?;
        if let Some(c) = byte.as_const() {
            bytes.push(byte.clone());
            if c.is_zero() {
                results.push(ResolvedString { state: cur, bytes });
                break;
            }
            continue;
        }

        let is_nul = builder.mk_eq(&byte, &zero);
        let not_nul = builder.mk_bool_not(&is_nul);

        if forks >= max_forks {
            // budget exhausted: force the terminator here
            if cur.solver().check_sat_and_add_if_sat(&is_nul) == CheckResult::Sat {
                bytes.push(zero);
                results.push(ResolvedString { state: cur, bytes });
            }
            break;
        }

        let mut terminated = cur.clone();
        if terminated.solver().check_sat_and_add_if_sat(&is_nul) == CheckResult::Sat {
            forks += 1;
            let mut done = bytes.clone();
            done.push(zero.clone());
            results.push(ResolvedString {
                state: terminated,
                bytes: done,
            });
        }

        if cur.solver().check_sat_and_add_if_sat(&not_nul) == CheckResult::Sat {
            bytes.push(byte);
        } else {
            break;
        }
    }
    Ok(results)
}

fn ret_const(
    state: &mut State,
    cv: CallConv,
    value: u64,
    width: u32,
) -> ExecResult<()> {
    let arch = state.arch();
    let value = state.builder().mk_uconst(value, width);
    arch.set_return_int_value(cv, state, &value)
}

// ---- process lifetime ----

/// The trampoline `__libc_start_main` returns into: the program is done and
/// the ABI return register holds the exit code.
pub struct StartMainExitWrapper;

impl Model for StartMainExitWrapper {
    fn name(&self) -> &'static str {
        "libc_start_main_exit_wrapper"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let arch = state.arch();
        let retcode = arch.get_return_int_value(self.call_conv(), &mut state)?;
        let retcode = match retcode.as_const() {
            Some(c) => c.extract(31, 0).as_i64() as i32,
            None => 0,
        };
        state.set_exited(retcode);
        out.exited.push(state);
        Ok(())
    }
}

pub struct LibcStartMain;

impl Model for LibcStartMain {
    fn name(&self) -> &'static str {
        "__libc_start_main"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let main_addr = state.get_int_param(self.call_conv(), 0)?;
        let main_addr = concrete(&main_addr, "__libc_start_main", "symbolic main address")?;

        // returning from main lands in the exit wrapper
        let arch = state.arch();
        let wrapper = state.exit_wrapper();
        let wrapper = state.builder().mk_uconst(wrapper, arch.ptr_size());
        arch.set_return(&mut state, &wrapper)?;

        state.set_pc(main_addr);
        out.active.push(state);
        Ok(())
    }
}

pub struct Exit;

impl Model for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let code = state.get_int_param(self.call_conv(), 0)?;
        let code = code.as_const().ok_or(ExecError::ModelAbi {
            model: "exit",
            reason: "symbolic exit code",
        })?;
        state.set_exited(code.extract(31, 0).as_i64() as i32);
        out.exited.push(state);
        Ok(())
    }
}

// ---- allocation ----

pub struct Malloc;

impl Model for Malloc {
    fn name(&self) -> &'static str {
        "malloc"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let size = state.get_int_param(self.call_conv(), 0)?;
        let size = concrete(&size, "malloc", "symbolic allocation size")?;

        let ptr = state.allocate(size);
        let width = state.arch().ptr_size();
        ret_const(&mut state, self.call_conv(), ptr, width)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Calloc;

impl Model for Calloc {
    fn name(&self) -> &'static str {
        "calloc"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let nmemb = state.get_int_param(self.call_conv(), 0)?;
        let size = state.get_int_param(self.call_conv(), 1)?;
        let nmemb = concrete(&nmemb, "calloc", "symbolic member count")?;
        let size = concrete(&size, "calloc", "symbolic allocation size")?;

        let total = nmemb * size;
        let ptr = state.allocate(total);
        let zero = state.builder().mk_uconst(0, 8);
        for i in 0..total {
            state.write_at(ptr + i, &zero)?;
        }

        let width = state.arch().ptr_size();
        ret_const(&mut state, self.call_conv(), ptr, width)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Realloc;

impl Model for Realloc {
    fn name(&self) -> &'static str {
        "realloc"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let old = state.get_int_param(self.call_conv(), 0)?;
        let size = state.get_int_param(self.call_conv(), 1)?;
        let old = concrete(&old, "realloc", "symbolic pointer")?;
        let size = concrete(&size, "realloc", "symbolic allocation size")?;

        let ptr = state.allocate(size);
        if old != 0 && size > 0 {
            let data = state.read_buf(old, size as usize)?;
            state.write_buf(ptr, &data)?;
        }

        let width = state.arch().ptr_size();
        ret_const(&mut state, self.call_conv(), ptr, width)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Free;

impl Model for Free {
    fn name(&self) -> &'static str {
        "free"
    }

    fn exec(&self, state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        // the bump allocator never reclaims
        state.arch().handle_return(state, out)
    }
}

// ---- memory and strings ----

pub struct Memcpy;

impl Model for Memcpy {
    fn name(&self) -> &'static str {
        "memcpy"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let dst = state.get_int_param(self.call_conv(), 0)?;
        let src = state.get_int_param(self.call_conv(), 1)?;
        let size = state.get_int_param(self.call_conv(), 2)?;
        let dst_addr = concrete(&dst, "memcpy", "symbolic destination")?;
        let src_addr = concrete(&src, "memcpy", "symbolic source")?;
        let size = concrete(&size, "memcpy", "symbolic size")?;

        if size > 0 {
            let data = state.read_buf(src_addr, size as usize)?;
            state.write_buf(dst_addr, &data)?;
        }

        let arch = state.arch();
        arch.set_return_int_value(self.call_conv(), &mut state, &dst)?;
        arch.handle_return(state, out)
    }
}

pub struct Memcmp;

impl Model for Memcmp {
    fn name(&self) -> &'static str {
        "memcmp"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let lhs = state.get_int_param(self.call_conv(), 0)?;
        let rhs = state.get_int_param(self.call_conv(), 1)?;
        let size = state.get_int_param(self.call_conv(), 2)?;
        let lhs = concrete(&lhs, "memcmp", "symbolic buffer")?;
        let rhs = concrete(&rhs, "memcmp", "symbolic buffer")?;
        let size = concrete(&size, "memcmp", "symbolic size")?;

        let builder = state.builder();
        let width = state.arch().ptr_size();
        let result = if size == 0 {
            builder.mk_uconst(0, width)
        } else {
            // collapsed to equal/unequal; the sign of the libc result is not
            // modelled
            let a = state.read_buf(lhs, size as usize)?;
            let b = state.read_buf(rhs, size as usize)?;
            let eq = builder.mk_eq(&a, &b);
            let zero = builder.mk_uconst(0, width);
            let one = builder.mk_uconst(1, width);
            builder.mk_ite(&eq, &zero, &one)
        };

        let arch = state.arch();
        arch.set_return_int_value(self.call_conv(), &mut state, &result)?;
        arch.handle_return(state, out)
    }
}

pub struct Strlen;

impl Model for Strlen {
    fn name(&self) -> &'static str {
        "strlen"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let ptr = state.get_int_param(self.call_conv(), 0)?;
        let ptr = concrete(&ptr, "strlen", "symbolic string pointer")?;

        let width = state.arch().ptr_size();
        for resolved in resolve_string(state, ptr, MAX_STRING_FORKS, None)? {
            let len = resolved.len();
            let mut succ = resolved.state;
            ret_const(&mut succ, self.call_conv(), len, width)?;
            succ.arch().handle_return(succ, out)?;
        }
        Ok(())
    }
}

pub struct Strncpy;

impl Model for Strncpy {
    fn name(&self) -> &'static str {
        "strncpy"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let dst = state.get_int_param(self.call_conv(), 0)?;
        let src = state.get_int_param(self.call_conv(), 1)?;
        let n = state.get_int_param(self.call_conv(), 2)?;
        let dst_addr = concrete(&dst, "strncpy", "symbolic destination")?;
        let src_addr = concrete(&src, "strncpy", "symbolic source")?;
        let n = concrete(&n, "strncpy", "symbolic length")?;

        for resolved in resolve_string(state, src_addr, MAX_STRING_FORKS, Some(n))? {
            let data = resolved.as_expr();
            let mut succ = resolved.state;
            succ.write_buf(dst_addr, &data)?;
            let arch = succ.arch();
            arch.set_return_int_value(self.call_conv(), &mut succ, &dst)?;
            arch.handle_return(succ, out)?;
        }
        Ok(())
    }
}

pub struct Puts;

impl Model for Puts {
    fn name(&self) -> &'static str {
        "puts"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let ptr = state.get_int_param(self.call_conv(), 0)?;
        let ptr = concrete(&ptr, "puts", "symbolic string pointer")?;

        for resolved in resolve_string(state, ptr, MAX_STRING_FORKS, None)? {
            let len = resolved.len();
            let ResolvedString {
                state: mut succ,
                bytes,
            } = resolved;
            let builder = succ.builder();
            let newline = builder.mk_uconst(b'\n' as u64, 8);

            // the string without its terminator, then a newline
            for byte in &bytes[..bytes.len() - 1] {
                succ.fs().write(FD_STDOUT, byte)?;
            }
            succ.fs().write(FD_STDOUT, &newline)?;
            debug!(len, "puts");

            ret_const(&mut succ, self.call_conv(), len + 1, 32)?;
            succ.arch().handle_return(succ, out)?;
        }
        Ok(())
    }
}

// ---- file handling ----

pub struct Read;

impl Model for Read {
    fn name(&self) -> &'static str {
        "read"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let fd = state.get_int_param(self.call_conv(), 0)?;
        let buf = state.get_int_param(self.call_conv(), 1)?;
        let size = state.get_int_param(self.call_conv(), 2)?;
        let fd = concrete(&fd, "read", "symbolic file descriptor")? as i32;
        let buf = concrete(&buf, "read", "symbolic buffer address")?;
        let size = concrete(&size, "read", "symbolic size")?;

        if size > 0 {
            let data = state.fs().read(fd, size as usize)?;
            state.write_buf(buf, &data)?;
        }

        let width = state.arch().ptr_size();
        ret_const(&mut state, self.call_conv(), size, width)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Open;

impl Model for Open {
    fn name(&self) -> &'static str {
        "open"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let path = state.get_int_param(self.call_conv(), 0)?;
        let path = concrete(&path, "open", "symbolic path pointer")?;

        // flags and mode are ignored; every path is readable and writable
        let mut name = String::new();
        for off in 0.. {
            let byte = state.read_at(path + off, 1)?;
            let byte = byte.as_const().ok_or(ExecError::ModelAbi {
                model: "open",
                reason: "symbolic path contents",
            })?;
            if byte.is_zero() {
                break;
            }
            name.push(byte.as_u64() as u8 as char);
        }

        let fd = state.fs().open(&name);
        debug!(path = %name, fd, "open");
        ret_const(&mut state, self.call_conv(), fd as u32 as u64, 32)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Close;

impl Model for Close {
    fn name(&self) -> &'static str {
        "close"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let fd = state.get_int_param(self.call_conv(), 0)?;
        let fd = concrete(&fd, "close", "symbolic file descriptor")? as i32;

        state.fs().close(fd)?;
        ret_const(&mut state, self.call_conv(), 0, 32)?;
        state.arch().handle_return(state, out)
    }
}

// ---- pseudo-randomness ----

pub struct Rand;

impl Model for Rand {
    fn name(&self) -> &'static str {
        "rand"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let value = state.rand_next();
        ret_const(&mut state, self.call_conv(), value as u64, 32)?;
        state.arch().handle_return(state, out)
    }
}

pub struct Srand;

impl Model for Srand {
    fn name(&self) -> &'static str {
        "srand"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let seed = state.get_int_param(self.call_conv(), 0)?;
        let seed = concrete(&seed, "srand", "symbolic seed")?;
        state.srand(seed as u32);
        state.arch().handle_return(state, out)
    }
}

/// Every libc model, for registration with the linker.
pub(crate) fn all_models() -> Vec<Arc<dyn Model>> {
    vec![
        Arc::new(StartMainExitWrapper),
        Arc::new(LibcStartMain),
        Arc::new(Exit),
        Arc::new(Malloc),
        Arc::new(Calloc),
        Arc::new(Realloc),
        Arc::new(Free),
        Arc::new(Memcpy),
        Arc::new(Memcmp),
        Arc::new(Strlen),
        Arc::new(Strncpy),
        Arc::new(Puts),
        Arc::new(Read),
        Arc::new(Open),
        Arc::new(Close),
        Arc::new(Rand),
        Arc::new(Srand),
    ]
}
