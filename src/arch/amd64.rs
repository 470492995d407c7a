//! x86-64 System V ABI.

use super::{Arch, CallConv, Endianness};
use crate::error::{ExecError, ExecResult};
use crate::executor::ExecutorResult;
use crate::expr::ExprRef;
use crate::state::State;

const STACK_BASE: u64 = 0xc_0000_0000;
const HEAP_BASE: u64 = 0xd_0000_0000;
const EXT_FUNC_BASE: u64 = 0xf_0000_0000;
const FS_BASE: u64 = 0xe_0000_0000;

const INT_PARAM_REGS: [&str; 6] = ["RDI", "RSI", "RDX", "RCX", "R8", "R9"];
const SYSCALL_PARAM_REGS: [&str; 6] = ["RDI", "RSI", "RDX", "R10", "R8", "R9"];

/// 64-bit x86, little-endian, System V calling convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct Amd64;

impl Arch for Amd64 {
    fn description(&self) -> &str {
        "x86_64 : 64-bit : LE"
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn ptr_size(&self) -> u32 {
        64
    }

    fn stack_base(&self) -> u64 {
        STACK_BASE
    }

    fn heap_base(&self) -> u64 {
        HEAP_BASE
    }

    fn ext_func_base(&self) -> u64 {
        EXT_FUNC_BASE
    }

    fn init_state(&self, state: &mut State) -> ExecResult<()> {
        let builder = state.builder();
        let rsp = builder.mk_uconst(STACK_BASE, 64);
        let fs = builder.mk_uconst(FS_BASE, 64);
        let flag = builder.mk_uconst(0, 8);

        state.reg_write("RSP", &rsp)?;
        state.reg_write("FS_OFFSET", &fs)?;
        for name in ["PF", "AF", "ZF", "SF", "IF", "DF", "OF", "CF"] {
            state.reg_write(name, &flag)?;
        }
        Ok(())
    }

    fn stack_push(&self, state: &mut State, val: &ExprRef) -> ExecResult<()> {
        assert!(
            val.width() == self.ptr_size(),
            "Amd64: stack_push: value width {} is not pointer-wide",
            val.width()
        );

        let builder = state.builder();
        let eight = builder.mk_uconst(8, 64);
        let rsp = state.reg_read("RSP")?;
        let rsp = builder.mk_sub(&rsp, &eight);
        state.write(&rsp, val)?;
        state.reg_write("RSP", &rsp)
    }

    fn stack_pop(&self, state: &mut State) -> ExecResult<ExprRef> {
        let builder = state.builder();
        let eight = builder.mk_uconst(8, 64);
        let rsp = state.reg_read("RSP")?;
        let val = state.read(&rsp, 8)?;
        let rsp = builder.mk_add(&rsp, &eight);
        state.reg_write("RSP", &rsp)?;
        Ok(val)
    }

    fn set_return(&self, state: &mut State, addr: &ExprRef) -> ExecResult<()> {
        assert!(
            addr.width() == self.ptr_size(),
            "Amd64: set_return: address width {} is not pointer-wide",
            addr.width()
        );

        let rsp = state.reg_read("RSP")?;
        state.write(&rsp, addr)
    }

    fn handle_return(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        let ret_addr = self.stack_pop(&mut state)?;
        let ret_addr = ret_addr
            .as_const()
            .ok_or(ExecError::SymbolicReturnTarget)?
            .as_u64();

        state.register_ret();
        state.set_pc(ret_addr);
        out.active.push(state);
        Ok(())
    }

    fn get_int_param(&self, cv: CallConv, state: &mut State, i: u32) -> ExecResult<ExprRef> {
        match cv {
            CallConv::Cdecl => match INT_PARAM_REGS.get(i as usize) {
                Some(reg) => state.reg_read(reg),
                None => {
                    // spilled past the six register parameters: skip the
                    // return address at [RSP]
                    let builder = state.builder();
                    let stack_off = (i as u64 + 1 - 6) * 8;
                    let off = builder.mk_uconst(stack_off, 64);
                    let rsp = state.reg_read("RSP")?;
                    let addr = builder.mk_add(&rsp, &off);
                    state.read(&addr, 8)
                }
            },
        }
    }

    fn set_int_params(&self, cv: CallConv, state: &mut State, vals: &[ExprRef]) -> ExecResult<()> {
        match cv {
            CallConv::Cdecl => {
                for (i, val) in vals.iter().enumerate() {
                    match INT_PARAM_REGS.get(i) {
                        Some(reg) => state.reg_write(reg, val)?,
                        None => self.stack_push(state, val)?,
                    }
                }
                Ok(())
            }
        }
    }

    fn set_return_int_value(
        &self,
        cv: CallConv,
        state: &mut State,
        val: &ExprRef,
    ) -> ExecResult<()> {
        match cv {
            CallConv::Cdecl => {
                let zext = state.builder().mk_zext(val, 64);
                state.reg_write("RAX", &zext)
            }
        }
    }

    fn get_return_int_value(&self, cv: CallConv, state: &mut State) -> ExecResult<ExprRef> {
        match cv {
            CallConv::Cdecl => state.reg_read("RAX"),
        }
    }

    fn get_syscall_num(&self, state: &mut State) -> ExecResult<ExprRef> {
        state.reg_read("RAX")
    }

    fn get_syscall_param(&self, state: &mut State, i: u32) -> ExecResult<ExprRef> {
        match SYSCALL_PARAM_REGS.get(i as usize) {
            Some(reg) => state.reg_read(reg),
            None => Err(ExecError::ModelAbi {
                model: "syscall",
                reason: "stack-spilled syscall arguments are not part of the ABI",
            }),
        }
    }
}
