//! Lifted intermediate representation and the lifter contract.
//!
//! The engine never decodes machine bytes itself: a [`Lifter`] turns the
//! bytes at an address into a [`Block`] of p-code-like operations over
//! [`VarNode`] operands. Production lifters wrap an external decoder (SLEIGH
//! implementations locate their processor specifications through the
//! `SLEIGH_PROCESSORS` environment variable); tests substitute a table-driven
//! stub.

use std::sync::Arc;

use crate::error::ExecResult;

/// Address spaces an operand can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    /// The offset field is a literal value, not an address.
    Const,
    /// The register file.
    Register,
    /// Main memory.
    Ram,
    /// Per-instruction scratch storage, discarded between instructions.
    Unique,
}

/// A slice of storage: `(space, offset, size-in-bytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarNode {
    pub space: SpaceKind,
    pub offset: u64,
    pub size: u32,
}

impl VarNode {
    pub const fn new(space: SpaceKind, offset: u64, size: u32) -> Self {
        Self {
            space,
            offset,
            size,
        }
    }

    /// Width of the operand in bits.
    pub const fn bits(&self) -> u32 {
        self.size * 8
    }
}

/// Operation codes of the lifted IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Copy,
    Load,
    Store,
    Branch,
    CBranch,
    BranchInd,
    Call,
    CallInd,
    CallOther,
    Return,
    Piece,
    SubPiece,
    IntAdd,
    IntSub,
    IntMul,
    IntSDiv,
    IntUDiv,
    IntSRem,
    IntURem,
    IntAnd,
    IntOr,
    IntXor,
    IntLeft,
    IntRight,
    IntSRight,
    IntEqual,
    IntNotEqual,
    IntLess,
    IntSLess,
    IntLessEqual,
    IntSLessEqual,
    IntCarry,
    IntSCarry,
    IntSBorrow,
    IntNegate,
    Int2Comp,
    IntZext,
    IntSext,
    Ite,
    BoolNegate,
    BoolAnd,
    BoolOr,
    BoolXor,
    FloatAdd,
    FloatSub,
    FloatMul,
    FloatDiv,
    FloatNeg,
    FloatEqual,
    FloatNotEqual,
    FloatLess,
    FloatNan,
    FloatInt2Float,
    FloatFloat2Float,
}

/// One IR operation: an opcode, its inputs, and an optional output.
#[derive(Debug, Clone)]
pub struct Op {
    pub opcode: OpCode,
    pub inputs: Vec<VarNode>,
    pub output: Option<VarNode>,
}

impl Op {
    pub fn new(opcode: OpCode, inputs: Vec<VarNode>, output: Option<VarNode>) -> Self {
        Self {
            opcode,
            inputs,
            output,
        }
    }
}

/// A lifted machine instruction: its address, encoded length, and expansion.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub address: u64,
    pub length: u32,
    pub ops: Vec<Op>,
}

impl Instruction {
    /// Address of the instruction that follows in memory.
    pub fn fallthrough(&self) -> u64 {
        self.address + self.length as u64
    }
}

/// A lifted basic block: a maximal straight-line instruction sequence.
#[derive(Debug, Clone)]
pub struct Block {
    instructions: Vec<Instruction>,
}

impl Block {
    /// # Panics
    ///
    /// Panics if `instructions` is empty; a block always holds at least one
    /// instruction.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        assert!(!instructions.is_empty(), "Block: empty instruction list");
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Index of the instruction at `addr` within this block.
    pub fn index_of(&self, addr: u64) -> Option<usize> {
        self.instructions.iter().position(|i| i.address == addr)
    }

    /// First address past the block.
    pub fn end_address(&self) -> u64 {
        let last = self.instructions.last().expect("blocks are nonempty");
        last.fallthrough()
    }
}

/// The machine-code to IR translation contract.
///
/// Implementations are expected to cache lifted blocks keyed by address;
/// callers re-lift freely.
pub trait Lifter: Send + Sync {
    /// Lift the basic block starting at `addr` from `bytes` (the readable
    /// bytes mapped at that address).
    fn lift(&self, addr: u64, bytes: &[u8]) -> ExecResult<Arc<Block>>;

    /// The storage slice of a named register.
    fn reg(&self, name: &str) -> Option<VarNode>;

    /// The name of a register storage slice, if it is one.
    fn reg_name(&self, varnode: &VarNode) -> Option<String>;
}
