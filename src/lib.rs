//! Oryx: a symbolic execution engine core for machine-code binaries.
//!
//! The engine interprets lifted p-code over forkable symbolic states: path
//! conditions are formulas over bit-vectors, kept in a hash-consed expression
//! DAG, and reachability questions go to an SMT backend. Loading and lifting
//! are pluggable ([`loader::AddressSpace`], [`lifter::Lifter`]); the
//! interpreter, memory model, constraint management and exploration
//! disciplines live here.

pub mod arch;
pub mod consts;
pub mod error;
pub mod executor;
pub mod expr;
pub mod lifter;
pub mod loader;
pub mod models;
pub mod solver;
pub mod state;

#[cfg(feature = "test-helpers")]
pub mod testing;

pub mod prelude {
    pub use crate::arch::{Amd64, Arch, CallConv, Endianness};
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::executor::{
        BfsExploration, CovExploration, DfsExploration, ExecConfig, ExecutorManager,
        ExecutorResult, ExplorationTechnique, PcodeExecutor, RandDfsExploration,
    };
    pub use crate::expr::{BvConst, Expr, ExprBuilder, ExprKind, ExprRef, FpConst, FpFormat, Sort};
    pub use crate::lifter::{Block, Instruction, Lifter, Op, OpCode, SpaceKind, VarNode};
    pub use crate::loader::{AddressSpace, Perm, Relocation, RelocationType, Symbol, SymbolType};
    pub use crate::models::{Linker, LinuxSyscalls, Model, Platform};
    pub use crate::solver::{CheckResult, ConstraintManager, SmtBackend, Z3Backend};
    pub use crate::state::{FileSystem, MapMemory, Solver, State, UninitReadPolicy};
}
