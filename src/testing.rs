//! Test utilities: a table-driven lifter and state construction helpers.
//!
//! The engine's tests are architecture-neutral: instead of decoding machine
//! bytes they program a [`TestLifter`] with hand-built IR blocks and run the
//! ordinary interpreter over them. Register names follow the x86-64 register
//! file so the [`Amd64`] ABI implementation works unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::arch::Amd64;
use crate::error::{ExecError, ExecResult};
use crate::executor::ExecutorResult;
use crate::expr::ExprBuilder;
use crate::lifter::{Block, Instruction, Lifter, Op, OpCode, SpaceKind, VarNode};
use crate::loader::AddressSpace;
use crate::models::Model;
use crate::solver::Z3Backend;
use crate::state::State;

/// Register layout of the test lifter: 64-bit registers at 8-byte strides,
/// 32-bit views at the same offsets, byte-wide flags above them.
fn register_table() -> HashMap<&'static str, VarNode> {
    let mut regs = HashMap::new();
    let names64 = [
        "RAX", "RCX", "RDX", "RBX", "RSP", "RBP", "RSI", "RDI", "R8", "R9", "R10", "R11", "R12",
        "R13", "R14", "R15",
    ];
    let names32 = [
        "EAX", "ECX", "EDX", "EBX", "ESP", "EBP", "ESI", "EDI",
    ];
    for (i, name) in names64.iter().enumerate() {
        regs.insert(*name, VarNode::new(SpaceKind::Register, i as u64 * 8, 8));
    }
    for (i, name) in names32.iter().enumerate() {
        regs.insert(*name, VarNode::new(SpaceKind::Register, i as u64 * 8, 4));
    }
    for (i, name) in ["CF", "PF", "AF", "ZF", "SF", "IF", "DF", "OF"].iter().enumerate() {
        regs.insert(*name, VarNode::new(SpaceKind::Register, 0x200 + i as u64, 1));
    }
    regs.insert("FS_OFFSET", VarNode::new(SpaceKind::Register, 0x300, 8));
    regs
}

/// A lifter whose "decoding" is a lookup in a set of preprogrammed blocks.
pub struct TestLifter {
    blocks: Mutex<Vec<Arc<Block>>>,
    regs: HashMap<&'static str, VarNode>,
}

impl TestLifter {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            regs: register_table(),
        }
    }

    /// Program a block; any instruction address within it becomes liftable.
    pub fn add_block(&self, block: Block) {
        self.blocks
            .lock()
            .expect("test lifter poisoned")
            .push(Arc::new(block));
    }

    /// The register varnode for `name`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown name; tests address registers by the fixed table.
    pub fn reg_vn(&self, name: &str) -> VarNode {
        *self
            .regs
            .get(name)
            .unwrap_or_else(|| panic!("TestLifter: unknown register `{name}`"))
    }
}

impl Default for TestLifter {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifter for TestLifter {
    fn lift(&self, addr: u64, _bytes: &[u8]) -> ExecResult<Arc<Block>> {
        self.blocks
            .lock()
            .expect("test lifter poisoned")
            .iter()
            .find(|b| b.index_of(addr).is_some())
            .cloned()
            .ok_or(ExecError::Lift {
                addr,
                reason: "no programmed block".into(),
            })
    }

    fn reg(&self, name: &str) -> Option<VarNode> {
        self.regs.get(name).copied()
    }

    fn reg_name(&self, varnode: &VarNode) -> Option<String> {
        self.regs
            .iter()
            .find(|&(_, vn)| vn == varnode)
            .map(|(name, _)| name.to_string())
    }
}

// ---- varnode shorthands ----

pub fn const_vn(value: u64, size: u32) -> VarNode {
    VarNode::new(SpaceKind::Const, value, size)
}

pub fn ram_vn(addr: u64, size: u32) -> VarNode {
    VarNode::new(SpaceKind::Ram, addr, size)
}

pub fn tmp_vn(offset: u64, size: u32) -> VarNode {
    VarNode::new(SpaceKind::Unique, offset, size)
}

/// A branch target in ram space (targets carry no size).
pub fn target_vn(addr: u64) -> VarNode {
    VarNode::new(SpaceKind::Ram, addr, 8)
}

pub fn op(opcode: OpCode, inputs: Vec<VarNode>, output: Option<VarNode>) -> Op {
    Op::new(opcode, inputs, output)
}

/// An instruction of `length` bytes at `address`.
pub fn insn(address: u64, length: u32, ops: Vec<Op>) -> Instruction {
    Instruction {
        address,
        length,
        ops,
    }
}

/// A model that immediately exits the state with the given code; handy as a
/// branch sink in exploration tests.
pub struct ExitWith(pub i32);

impl Model for ExitWith {
    fn name(&self) -> &'static str {
        "test_exit"
    }

    fn exec(&self, mut state: State, out: &mut ExecutorResult) -> ExecResult<()> {
        state.set_exited(self.0);
        out.exited.push(state);
        Ok(())
    }
}

/// A fresh state over `space` and `lifter`, with the x86-64 ABI, the Z3
/// backend, and a stack segment mapped below the initial stack pointer.
pub fn fresh_state(
    space: AddressSpace,
    lifter: Arc<TestLifter>,
    pc: u64,
) -> ExecResult<(State, Arc<ExprBuilder>)> {
    let builder = Arc::new(ExprBuilder::new());
    let state = State::new(
        Arc::new(space),
        lifter,
        Arc::new(Amd64),
        Arc::new(Z3Backend),
        builder.clone(),
        pc,
    )?;
    Ok((state, builder))
}
