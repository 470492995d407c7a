//! The IR interpreter: steps one state across one basic block.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ExecConfig, ExecutorResult};
use crate::consts::UNMODELLED_RETCODE;
use crate::error::{ExecError, ExecResult};
use crate::expr::{ExprBuilder, ExprRef, FpFormat, Sort};
use crate::lifter::{Instruction, Lifter, Op, OpCode, SpaceKind, VarNode};
use crate::solver::CheckResult;
use crate::state::{MapMemory, State, UninitReadPolicy};

/// What happens after one IR operation.
enum OpStep {
    /// Keep executing: the next op of the same instruction.
    Continue(State),
    /// Intra-instruction branch: jump by a relative op index.
    Jump(State, i64),
    /// Control left the instruction; every successor is already in the
    /// output.
    Done,
}

/// Executes lifted basic blocks over symbolic states.
pub struct PcodeExecutor {
    builder: Arc<ExprBuilder>,
    lifter: Arc<dyn Lifter>,
    config: ExecConfig,
}

impl PcodeExecutor {
    pub fn new(builder: Arc<ExprBuilder>, lifter: Arc<dyn Lifter>) -> Self {
        Self::with_config(builder, lifter, ExecConfig::default())
    }

    pub fn with_config(
        builder: Arc<ExprBuilder>,
        lifter: Arc<dyn Lifter>,
        config: ExecConfig,
    ) -> Self {
        Self {
            builder,
            lifter,
            config,
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Advance `state` across the basic block at its program counter,
    /// producing zero or more successors.
    ///
    /// If the program counter is bound to a linked external-function model,
    /// the model runs instead of lifted code. Otherwise instructions execute
    /// in order until a control transfer occurs; running off the end of the
    /// block falls through to the next address.
    pub fn execute_basic_block(&self, mut state: State) -> ExecResult<ExecutorResult> {
        let mut out = ExecutorResult::default();
        let pc = state.pc();

        if let Some(model) = state.linked_model(pc) {
            debug!(pc = format_args!("{pc:#x}"), model = model.name(), "model call");
            model.exec(state, &mut out)?;
            return Ok(out);
        }

        let block = {
            let bytes = state.code_at(pc)?;
            self.lifter.lift(pc, bytes)?
        };
        let mut idx = block.index_of(pc).ok_or(ExecError::Lift {
            addr: pc,
            reason: "lifted block does not start at the program counter".into(),
        })?;

        let instructions = block.instructions();
        let mut cur = state;
        while idx < instructions.len() {
            let insn = &instructions[idx];
            cur.set_pc(insn.address);

            let mut tmps =
                MapMemory::new("tmp", UninitReadPolicy::Error, self.builder.clone());
            let mut op_idx = 0usize;
            while op_idx < insn.ops.len() {
                let op = &insn.ops[op_idx];
                match self.execute_op(cur, &mut tmps, insn, op, &mut out)? {
                    OpStep::Continue(state) => {
                        cur = state;
                        op_idx += 1;
                    }
                    OpStep::Jump(state, rel) => {
                        cur = state;
                        let target = op_idx as i64 + rel;
                        assert!(
                            target >= 0 && (target as usize) <= insn.ops.len(),
                            "PcodeExecutor: intra-instruction branch out of range"
                        );
                        op_idx = target as usize;
                    }
                    OpStep::Done => return Ok(out),
                }
            }
            idx += 1;
        }

        // block ended without a branch: fall through
        cur.set_pc(block.end_address());
        out.active.push(cur);
        Ok(out)
    }

    fn resolve_varnode(
        &self,
        state: &mut State,
        tmps: &mut MapMemory,
        vn: &VarNode,
    ) -> ExecResult<ExprRef> {
        match vn.space {
            SpaceKind::Const => Ok(self
                .builder
                .mk_const(crate::expr::BvConst::new(vn.offset, vn.bits()))),
            SpaceKind::Register => state.reg_read_slice(vn.offset, vn.size as usize),
            SpaceKind::Ram => state.read_at(vn.offset, vn.size as usize),
            SpaceKind::Unique => {
                let end = state.arch().endianness();
                tmps.read(vn.offset, vn.size as usize, end)
            }
        }
    }

    fn write_varnode(
        &self,
        state: &mut State,
        tmps: &mut MapMemory,
        vn: &VarNode,
        value: ExprRef,
    ) -> ExecResult<()> {
        // booleans widen to their storage size before hitting memory
        let value = match value.sort() {
            Sort::Bool => {
                let bit = self.builder.bool_to_bv(&value);
                self.builder.mk_zext(&bit, vn.bits())
            }
            Sort::Bv(w) if w == 1 && vn.bits() == 8 => self.builder.mk_zext(&value, 8),
            _ => value,
        };
        assert!(
            value.width() == vn.bits(),
            "PcodeExecutor: write_varnode: value width {} does not fit a {}-byte varnode",
            value.width(),
            vn.size
        );

        match vn.space {
            SpaceKind::Const => panic!("PcodeExecutor: write_varnode: constant output"),
            SpaceKind::Register => state.reg_write_slice(vn.offset, &value),
            SpaceKind::Ram => state.write_at(vn.offset, &value),
            SpaceKind::Unique => {
                let end = state.arch().endianness();
                tmps.write(vn.offset, &value, end);
                Ok(())
            }
        }
    }

    /// Resize a shift amount to the value width, guarding against distances
    /// the narrower operand cannot express.
    fn shift_expr(
        &self,
        value: &ExprRef,
        amount: &ExprRef,
        op: fn(&ExprBuilder, &ExprRef, &ExprRef) -> ExprRef,
        overflow: impl Fn(&ExprBuilder, &ExprRef) -> ExprRef,
    ) -> ExprRef {
        let b = &self.builder;
        let w = value.width();
        let aw = amount.width();

        if aw == w {
            return op(b, value, amount);
        }
        if aw < w {
            let amount = b.mk_zext(amount, w);
            return op(b, value, &amount);
        }

        let truncated = b.mk_extract(amount, w - 1, 0);
        let shifted = op(b, value, &truncated);
        let bound = b.mk_uconst(w as u64, aw);
        let too_far = b.mk_uge(amount, &bound);
        b.mk_ite(&too_far, &overflow(b, value), &shifted)
    }

    fn to_float(&self, e: &ExprRef, op: OpCode) -> ExecResult<ExprRef> {
        let bytes = e.width() / 8;
        let format = FpFormat::from_byte_size(bytes)
            .ok_or(ExecError::UnsupportedOperandSize { op, size: bytes })?;
        Ok(self.builder.mk_bv_to_fp(format, e))
    }

    fn float_format_for(&self, vn: &VarNode, op: OpCode) -> ExecResult<FpFormat> {
        FpFormat::from_byte_size(vn.size).ok_or(ExecError::UnsupportedOperandSize {
            op,
            size: vn.size,
        })
    }

    /// Concretize a symbolic program counter: fork one successor per
    /// satisfying value (bounded), each constrained to that value.
    fn fork_symbolic_pc(
        &self,
        mut state: State,
        pc_expr: &ExprRef,
        out: &mut ExecutorResult,
    ) -> ExecResult<()> {
        let values = match state.solver().evaluate_upto(pc_expr, self.config.max_pc_solutions) {
            Some(values) => values,
            None => return Ok(()), // infeasible path dies here
        };
        debug!(targets = values.len(), "symbolic program counter fan-out");

        for value in values {
            let mut succ = state.clone();
            let target = value.as_u64();
            let lit = self.builder.mk_const(value);
            let pinned = self.builder.mk_eq(pc_expr, &lit);
            succ.solver().add(&pinned);
            succ.set_pc(target);
            out.active.push(succ);
        }
        Ok(())
    }

    fn dispatch_syscall(
        &self,
        mut state: State,
        out: &mut ExecutorResult,
    ) -> ExecResult<()> {
        let arch = state.arch();
        let num = arch.get_syscall_num(&mut state)?;
        let num = num.as_const().ok_or(ExecError::ModelAbi {
            model: "syscall",
            reason: "symbolic syscall number",
        })?;
        let num = num.as_u64();

        let model = state.platform().and_then(|p| p.syscall(num));
        match model {
            Some(model) => model.exec(state, out),
            None => {
                info!(num, "unmodelled syscall, exiting state");
                state.set_exited(UNMODELLED_RETCODE);
                out.exited.push(state);
                Ok(())
            }
        }
    }

    fn execute_op(
        &self,
        mut state: State,
        tmps: &mut MapMemory,
        insn: &Instruction,
        op: &Op,
        out: &mut ExecutorResult,
    ) -> ExecResult<OpStep> {
        let b = self.builder.clone();

        macro_rules! input {
            ($i:expr) => {
                self.resolve_varnode(&mut state, tmps, &op.inputs[$i])?
            };
        }
        macro_rules! output {
            ($value:expr) => {{
                let out_vn = op.output.as_ref().expect("op has an output");
                self.write_varnode(&mut state, tmps, out_vn, $value)?;
            }};
        }

        match op.opcode {
            OpCode::Copy => {
                let value = input!(0);
                output!(value);
            }
            OpCode::Load => {
                let ptr = input!(1);
                let ptr = ptr
                    .as_const()
                    .ok_or(ExecError::SymbolicAddress("load"))?
                    .as_u64();
                let out_vn = op.output.as_ref().expect("LOAD has an output");
                let value = state.read_at(ptr, out_vn.size as usize)?;
                output!(value);
            }
            OpCode::Store => {
                let ptr = input!(1);
                let ptr = ptr
                    .as_const()
                    .ok_or(ExecError::SymbolicAddress("store"))?
                    .as_u64();
                let value = input!(2);
                state.write_at(ptr, &value)?;
            }
            OpCode::Branch => {
                let target = &op.inputs[0];
                if target.space == SpaceKind::Const {
                    return Ok(OpStep::Jump(state, target.offset as i64));
                }
                state.set_pc(target.offset);
                out.active.push(state);
                return Ok(OpStep::Done);
            }
            OpCode::CBranch => {
                let target = op.inputs[0];
                let cond = input!(1);
                let cond = b.bv_to_bool(&cond);

                if let Some(value) = cond.as_bool_const() {
                    if !value {
                        return Ok(OpStep::Continue(state));
                    }
                    if target.space == SpaceKind::Const {
                        return Ok(OpStep::Jump(state, target.offset as i64));
                    }
                    state.set_pc(target.offset);
                    out.active.push(state);
                    return Ok(OpStep::Done);
                }

                if target.space == SpaceKind::Const {
                    return Err(ExecError::SymbolicIntraBranch);
                }

                let fall_pc = insn.fallthrough();
                let taken_pc = target.offset;
                let not_cond = b.mk_bool_not(&cond);

                // fall-through successor first, then the taken branch
                let mut fall = state.clone();
                let mut taken = state;
                if self.config.lazy_solving {
                    fall.solver().add(&not_cond);
                    fall.set_pc(fall_pc);
                    out.active.push(fall);

                    taken.solver().add(&cond);
                    taken.set_pc(taken_pc);
                    out.active.push(taken);
                } else {
                    if fall.solver().check_sat_and_add_if_sat(&not_cond) == CheckResult::Sat {
                        fall.set_pc(fall_pc);
                        out.active.push(fall);
                    }
                    if taken.solver().check_sat_and_add_if_sat(&cond) == CheckResult::Sat {
                        taken.set_pc(taken_pc);
                        out.active.push(taken);
                    }
                }
                return Ok(OpStep::Done);
            }
            OpCode::BranchInd => {
                let target = input!(0);
                match target.as_const() {
                    Some(c) => {
                        state.set_pc(c.as_u64());
                        out.active.push(state);
                    }
                    None => self.fork_symbolic_pc(state, &target, out)?,
                }
                return Ok(OpStep::Done);
            }
            OpCode::Call => {
                let target = &op.inputs[0];
                state.register_call(insn.fallthrough());
                state.set_pc(target.offset);
                out.active.push(state);
                return Ok(OpStep::Done);
            }
            OpCode::CallInd => {
                let target = input!(0);
                state.register_call(insn.fallthrough());
                match target.as_const() {
                    Some(c) => {
                        state.set_pc(c.as_u64());
                        out.active.push(state);
                    }
                    None => self.fork_symbolic_pc(state, &target, out)?,
                }
                return Ok(OpStep::Done);
            }
            OpCode::CallOther => {
                // syscall models resume at the fall-through address
                state.set_pc(insn.fallthrough());
                self.dispatch_syscall(state, out)?;
                return Ok(OpStep::Done);
            }
            OpCode::Return => {
                let target = input!(0);
                let target = target
                    .as_const()
                    .ok_or(ExecError::SymbolicReturnTarget)?
                    .as_u64();
                state.register_ret();
                state.set_pc(target);
                out.active.push(state);
                return Ok(OpStep::Done);
            }
            OpCode::Piece => {
                let high = input!(0);
                let low = input!(1);
                output!(b.mk_concat(&high, &low));
            }
            OpCode::SubPiece => {
                let value = input!(0);
                let offset = op.inputs[1].offset as u32 * 8;
                let out_vn = op.output.as_ref().expect("SUBPIECE has an output");
                output!(b.mk_extract(&value, offset + out_vn.bits() - 1, offset));
            }
            OpCode::IntAdd => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_add(&x, &y));
            }
            OpCode::IntSub => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_sub(&x, &y));
            }
            OpCode::IntMul => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_mul(&x, &y));
            }
            OpCode::IntSDiv => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_sdiv(&x, &y));
            }
            OpCode::IntUDiv => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_udiv(&x, &y));
            }
            OpCode::IntSRem => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_srem(&x, &y));
            }
            OpCode::IntURem => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_urem(&x, &y));
            }
            OpCode::IntAnd => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_and(&x, &y));
            }
            OpCode::IntOr => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_or(&x, &y));
            }
            OpCode::IntXor => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_xor(&x, &y));
            }
            OpCode::IntLeft => {
                let (x, y) = (input!(0), input!(1));
                output!(self.shift_expr(&x, &y, ExprBuilder::mk_shl, |b, v| {
                    b.mk_uconst(0, v.width())
                }));
            }
            OpCode::IntRight => {
                let (x, y) = (input!(0), input!(1));
                output!(self.shift_expr(&x, &y, ExprBuilder::mk_lshr, |b, v| {
                    b.mk_uconst(0, v.width())
                }));
            }
            OpCode::IntSRight => {
                let (x, y) = (input!(0), input!(1));
                output!(self.shift_expr(&x, &y, ExprBuilder::mk_ashr, |b, v| {
                    let all = b.mk_uconst(v.width() as u64 - 1, v.width());
                    b.mk_ashr(v, &all)
                }));
            }
            OpCode::IntEqual => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_eq(&x, &y));
            }
            OpCode::IntNotEqual => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_neq(&x, &y));
            }
            OpCode::IntLess => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_ult(&x, &y));
            }
            OpCode::IntSLess => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_slt(&x, &y));
            }
            OpCode::IntLessEqual => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_ule(&x, &y));
            }
            OpCode::IntSLessEqual => {
                let (x, y) = (input!(0), input!(1));
                output!(b.mk_sle(&x, &y));
            }
            OpCode::IntCarry => {
                // unsigned overflow of x + y: the sum wraps below x
                let (x, y) = (input!(0), input!(1));
                let sum = b.mk_add(&x, &y);
                output!(b.mk_ult(&sum, &x));
            }
            OpCode::IntSCarry => {
                // signed overflow of x + y: operands agree in sign, the sum
                // does not
                let (x, y) = (input!(0), input!(1));
                let sum = b.mk_add(&x, &y);
                let sx = b.sign_bit(&x);
                let sy = b.sign_bit(&y);
                let ss = b.sign_bit(&sum);
                let same = b.mk_eq(&sx, &sy);
                let flipped = b.mk_neq(&ss, &sx);
                output!(b.mk_bool_and(&same, &flipped));
            }
            OpCode::IntSBorrow => {
                // signed overflow of x - y: operands differ in sign, the
                // difference leaves x's
                let (x, y) = (input!(0), input!(1));
                let diff = b.mk_sub(&x, &y);
                let sx = b.sign_bit(&x);
                let sy = b.sign_bit(&y);
                let sd = b.sign_bit(&diff);
                let differ = b.mk_neq(&sx, &sy);
                let flipped = b.mk_neq(&sd, &sx);
                output!(b.mk_bool_and(&differ, &flipped));
            }
            OpCode::IntNegate => {
                let x = input!(0);
                output!(b.mk_not(&x));
            }
            OpCode::Int2Comp => {
                let x = input!(0);
                output!(b.mk_neg(&x));
            }
            OpCode::IntZext => {
                let x = input!(0);
                let out_vn = op.output.as_ref().expect("ZEXT has an output");
                output!(b.mk_zext(&x, out_vn.bits()));
            }
            OpCode::IntSext => {
                let x = input!(0);
                let out_vn = op.output.as_ref().expect("SEXT has an output");
                output!(b.mk_sext(&x, out_vn.bits()));
            }
            OpCode::Ite => {
                let cond = input!(0);
                let cond = b.bv_to_bool(&cond);
                let (then, otherwise) = (input!(1), input!(2));
                output!(b.mk_ite(&cond, &then, &otherwise));
            }
            OpCode::BoolNegate => {
                let x = input!(0);
                let x = b.bv_to_bool(&x);
                output!(b.mk_bool_not(&x));
            }
            OpCode::BoolAnd => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (b.bv_to_bool(&x), b.bv_to_bool(&y));
                output!(b.mk_bool_and(&x, &y));
            }
            OpCode::BoolOr => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (b.bv_to_bool(&x), b.bv_to_bool(&y));
                output!(b.mk_bool_or(&x, &y));
            }
            OpCode::BoolXor => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (b.bv_to_bool(&x), b.bv_to_bool(&y));
                let not_x = b.mk_bool_not(&x);
                let not_y = b.mk_bool_not(&y);
                let left = b.mk_bool_and(&x, &not_y);
                let right = b.mk_bool_and(&not_x, &y);
                output!(b.mk_bool_or(&left, &right));
            }
            OpCode::FloatAdd => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                output!(b.mk_fp_to_bv(&b.mk_fp_add(&x, &y)));
            }
            OpCode::FloatSub => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                let neg_y = b.mk_fp_neg(&y);
                output!(b.mk_fp_to_bv(&b.mk_fp_add(&x, &neg_y)));
            }
            OpCode::FloatMul => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                output!(b.mk_fp_to_bv(&b.mk_fp_mul(&x, &y)));
            }
            OpCode::FloatDiv => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                output!(b.mk_fp_to_bv(&b.mk_fp_div(&x, &y)));
            }
            OpCode::FloatNeg => {
                let x = input!(0);
                let x = self.to_float(&x, op.opcode)?;
                output!(b.mk_fp_to_bv(&b.mk_fp_neg(&x)));
            }
            OpCode::FloatEqual => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                output!(b.mk_fp_eq(&x, &y));
            }
            OpCode::FloatNotEqual => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                let eq = b.mk_fp_eq(&x, &y);
                output!(b.mk_bool_not(&eq));
            }
            OpCode::FloatLess => {
                let (x, y) = (input!(0), input!(1));
                let (x, y) = (self.to_float(&x, op.opcode)?, self.to_float(&y, op.opcode)?);
                output!(b.mk_fp_lt(&x, &y));
            }
            OpCode::FloatNan => {
                let x = input!(0);
                let x = self.to_float(&x, op.opcode)?;
                output!(b.mk_fp_is_nan(&x));
            }
            OpCode::FloatInt2Float => {
                let x = input!(0);
                let out_vn = op.output.as_ref().expect("INT2FLOAT has an output");
                let format = self.float_format_for(out_vn, op.opcode)?;
                output!(b.mk_fp_to_bv(&b.mk_int_to_fp(format, &x)));
            }
            OpCode::FloatFloat2Float => {
                let x = input!(0);
                let x = self.to_float(&x, op.opcode)?;
                let out_vn = op.output.as_ref().expect("FLOAT2FLOAT has an output");
                let format = self.float_format_for(out_vn, op.opcode)?;
                output!(b.mk_fp_to_bv(&b.mk_fp_convert(format, &x)));
            }
        }

        Ok(OpStep::Continue(state))
    }
}
