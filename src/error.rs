//! Engine error taxonomy.
//!
//! Hard failures that abort an execution surface as [`ExecError`] and
//! propagate to the driver. Misuse of the value primitives (`BvConst`,
//! `ExprBuilder`) panics instead: those contracts are static and a violation
//! is a bug in the caller. Path-level conditions (unmodelled imports,
//! `exit(n)`) never raise an error; they mark the state as exited.

use std::io;

use thiserror::Error;

use crate::lifter::OpCode;

/// Hard failure while stepping a state.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A load/store pointer did not resolve to a constant. Symbolic memory
    /// addresses are rejected by design; models concretize pointers first.
    #[error("symbolic address in {0} access")]
    SymbolicAddress(&'static str),
    /// A return target did not resolve to a constant.
    #[error("symbolic return target")]
    SymbolicReturnTarget,
    /// A conditional branch between IR ops had a symbolic condition.
    #[error("symbolic condition on an intra-instruction branch")]
    SymbolicIntraBranch,
    /// The lifter produced an opcode the interpreter does not implement.
    #[error("unsupported opcode {0:?}")]
    UnsupportedOpcode(OpCode),
    /// An operand had a size no operator accepts (e.g. a float operand that
    /// is neither 4 nor 8 bytes).
    #[error("unsupported operand size {size} for {op:?}")]
    UnsupportedOperandSize { op: OpCode, size: u32 },
    /// No mapped, readable bytes at the program counter.
    #[error("no code mapped at {0:#x}")]
    UnmappedCode(u64),
    /// Uninitialized read under the `Error` policy.
    #[error("uninitialized read at {addr:#x} in `{region}`")]
    UninitializedRead { region: String, addr: u64 },
    /// A register name the lifter does not know.
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    /// Operation on a file descriptor that is not open.
    #[error("unknown file descriptor {0}")]
    BadFileDescriptor(i32),
    /// A model was invoked outside its ABI contract (e.g. a symbolic
    /// allocation size it cannot concretize).
    #[error("model `{model}`: {reason}")]
    ModelAbi {
        model: &'static str,
        reason: &'static str,
    },
    /// Lifting failed on the bytes at the program counter.
    #[error("lifter failure at {addr:#x}: {reason}")]
    Lift { addr: u64, reason: String },
    /// I/O failure while persisting state artifacts.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias for operations that can hard-fail.
pub type ExecResult<T> = Result<T, ExecError>;
