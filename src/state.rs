//! The symbolic execution state.
//!
//! A [`State`] is one point of the explored state space: registers, memory,
//! file system, path constraints, control state. Forking clones the state;
//! clones are independent values that only share the immutable pieces (the
//! loaded image, the lifter, the architecture, the expression builder, the
//! linked-model table).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::arch::{Arch, CallConv};
use crate::error::{ExecError, ExecResult};
use crate::expr::{BvConst, ExprBuilder, ExprRef};
use crate::lifter::Lifter;
use crate::loader::AddressSpace;
use crate::models::{Model, Platform};
use crate::solver::{CheckResult, SmtBackend};

mod filesystem;
mod memory;
mod solver;

pub use filesystem::{File, FileSystem};
pub use memory::{MapMemory, UninitReadPolicy};
pub use solver::Solver;

/// A forkable machine state.
#[derive(Clone)]
pub struct State {
    builder: Arc<ExprBuilder>,
    arch: Arc<dyn Arch>,
    lifter: Arc<dyn Lifter>,
    address_space: Arc<AddressSpace>,

    regs: MapMemory,
    ram: MapMemory,
    fs: FileSystem,
    solver: Solver,

    pc: u64,
    stacktrace: Vec<u64>,
    argv: Vec<ExprRef>,
    heap_cursor: u64,

    linked: Arc<BTreeMap<u64, Arc<dyn Model>>>,
    platform: Option<Arc<dyn Platform>>,
    exit_wrapper: u64,

    /// glibc TYPE_0 generator state for the rand/srand models.
    rng_state: u32,

    exited: bool,
    retcode: i32,
}

impl State {
    /// Build a fresh state at `pc` and let the architecture populate the
    /// initial register file.
    pub fn new(
        address_space: Arc<AddressSpace>,
        lifter: Arc<dyn Lifter>,
        arch: Arc<dyn Arch>,
        backend: Arc<dyn SmtBackend>,
        builder: Arc<ExprBuilder>,
        pc: u64,
    ) -> ExecResult<Self> {
        let mut state = Self {
            regs: MapMemory::new("reg", UninitReadPolicy::Symbol, builder.clone()),
            ram: MapMemory::with_backing(
                "mem",
                UninitReadPolicy::Symbol,
                builder.clone(),
                address_space.clone(),
            ),
            fs: FileSystem::new(builder.clone()),
            solver: Solver::new(builder.clone(), backend),
            pc,
            stacktrace: Vec::new(),
            argv: Vec::new(),
            heap_cursor: arch.heap_base(),
            linked: Arc::new(BTreeMap::new()),
            platform: None,
            exit_wrapper: 0,
            rng_state: crate::consts::LIBC_RAND_DEFAULT_SEED,
            exited: false,
            retcode: 0,
            builder,
            arch: arch.clone(),
            lifter,
            address_space,
        };

        let arch_init = arch;
        arch_init.init_state(&mut state)?;
        Ok(state)
    }

    // ---- shared context ----

    pub fn builder(&self) -> Arc<ExprBuilder> {
        self.builder.clone()
    }

    pub fn arch(&self) -> Arc<dyn Arch> {
        self.arch.clone()
    }

    pub fn lifter(&self) -> Arc<dyn Lifter> {
        self.lifter.clone()
    }

    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.address_space
    }

    // ---- control state ----

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    pub fn stacktrace(&self) -> &[u64] {
        &self.stacktrace
    }

    /// Record a call: remember where it will return to.
    pub fn register_call(&mut self, retaddr: u64) {
        self.stacktrace.push(retaddr);
    }

    /// Record a return; returning with an empty trace is allowed (the entry
    /// function returning into its trampoline).
    pub fn register_ret(&mut self) {
        self.stacktrace.pop();
    }

    pub fn exited(&self) -> bool {
        self.exited
    }

    pub fn retcode(&self) -> i32 {
        self.retcode
    }

    pub fn set_exited(&mut self, retcode: i32) {
        self.exited = true;
        self.retcode = retcode;
    }

    // ---- memory ----

    /// The mapped code bytes from `addr` to the end of its segment.
    pub fn code_at(&self, addr: u64) -> ExecResult<&[u8]> {
        self.address_space
            .get_ref(addr)
            .ok_or(ExecError::UnmappedCode(addr))
    }

    /// RAM read at a constant address expression.
    pub fn read(&mut self, addr: &ExprRef, len: usize) -> ExecResult<ExprRef> {
        let addr = Self::concrete_addr(addr)?;
        self.read_at(addr, len)
    }

    pub fn read_at(&mut self, addr: u64, len: usize) -> ExecResult<ExprRef> {
        let end = self.arch.endianness();
        self.ram.read(addr, len, end)
    }

    /// RAM write at a constant address expression.
    pub fn write(&mut self, addr: &ExprRef, data: &ExprRef) -> ExecResult<()> {
        let addr = Self::concrete_addr(addr)?;
        self.write_at(addr, data)
    }

    pub fn write_at(&mut self, addr: u64, data: &ExprRef) -> ExecResult<()> {
        let end = self.arch.endianness();
        self.ram.write(addr, data, end);
        Ok(())
    }

    /// Read a buffer as an ordered byte stream: the byte at `addr` becomes
    /// the most significant part, independent of CPU endianness.
    pub fn read_buf(&mut self, addr: u64, len: usize) -> ExecResult<ExprRef> {
        self.ram.read(addr, len, crate::arch::Endianness::Big)
    }

    /// Write a buffer as an ordered byte stream; inverse of [`Self::read_buf`].
    pub fn write_buf(&mut self, addr: u64, data: &ExprRef) -> ExecResult<()> {
        self.ram.write(addr, data, crate::arch::Endianness::Big);
        Ok(())
    }

    fn concrete_addr(addr: &ExprRef) -> ExecResult<u64> {
        addr.as_const()
            .map(BvConst::as_u64)
            .ok_or(ExecError::SymbolicAddress("memory"))
    }

    // ---- registers ----

    pub fn reg_read(&mut self, name: &str) -> ExecResult<ExprRef> {
        let varnode = self
            .lifter
            .reg(name)
            .ok_or_else(|| ExecError::UnknownRegister(name.to_string()))?;
        self.reg_read_slice(varnode.offset, varnode.size as usize)
    }

    pub fn reg_write(&mut self, name: &str, data: &ExprRef) -> ExecResult<()> {
        let varnode = self
            .lifter
            .reg(name)
            .ok_or_else(|| ExecError::UnknownRegister(name.to_string()))?;
        self.reg_write_slice(varnode.offset, data)
    }

    pub fn reg_read_slice(&mut self, offset: u64, size: usize) -> ExecResult<ExprRef> {
        let end = self.arch.endianness();
        self.regs.read(offset, size, end)
    }

    pub fn reg_write_slice(&mut self, offset: u64, data: &ExprRef) -> ExecResult<()> {
        let end = self.arch.endianness();
        self.regs.write(offset, data, end);
        Ok(())
    }

    // ---- heap ----

    /// Bump-allocate `size` bytes, 16-byte aligned.
    pub fn allocate(&mut self, size: u64) -> u64 {
        let ptr = self.heap_cursor;
        self.heap_cursor += (size + 0xf) & !0xf;
        ptr
    }

    // ---- argv ----

    pub fn argv(&self) -> &[ExprRef] {
        &self.argv
    }

    pub fn set_argv(&mut self, argv: Vec<ExprRef>) {
        self.argv = argv;
    }

    /// Convenience: concrete argv strings as byte expressions.
    pub fn set_argv_strings(&mut self, argv: &[&str]) {
        let exprs = argv
            .iter()
            .map(|arg| {
                let bytes = arg.as_bytes();
                let c = BvConst::from_bytes(bytes, crate::arch::Endianness::Big);
                self.builder.mk_const(c)
            })
            .collect();
        self.argv = exprs;
    }

    // ---- linked external functions ----

    /// Bind `addr` (a sentinel outside any mapped segment) to a model.
    pub fn register_linked_function(&mut self, addr: u64, model: Arc<dyn Model>) {
        Arc::make_mut(&mut self.linked).insert(addr, model);
    }

    pub fn linked_model(&self, addr: u64) -> Option<Arc<dyn Model>> {
        self.linked.get(&addr).cloned()
    }

    /// The syscall dispatch table; states without one treat every syscall as
    /// unmodelled.
    pub fn platform(&self) -> Option<Arc<dyn Platform>> {
        self.platform.clone()
    }

    pub fn set_platform(&mut self, platform: Arc<dyn Platform>) {
        self.platform = Some(platform);
    }

    pub fn set_exit_wrapper(&mut self, addr: u64) {
        self.exit_wrapper = addr;
    }

    /// The sentinel the entry trampoline returns to; reaching it ends the
    /// program with the ABI return value as exit code.
    pub fn exit_wrapper(&self) -> u64 {
        self.exit_wrapper
    }

    // ---- libc prng model state ----

    /// One step of the glibc TYPE_0 linear congruential generator.
    pub fn rand_next(&mut self) -> u32 {
        self.rng_state = (self
            .rng_state
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12_345))
            & 0x7fff_ffff;
        self.rng_state
    }

    pub fn srand(&mut self, seed: u32) {
        self.rng_state = seed;
    }

    // ---- ABI conveniences ----

    pub fn get_int_param(&mut self, cv: CallConv, i: u32) -> ExecResult<ExprRef> {
        let arch = self.arch.clone();
        arch.get_int_param(cv, self, i)
    }

    // ---- solver ----

    pub fn solver(&mut self) -> &mut Solver {
        &mut self.solver
    }

    pub fn solver_ref(&self) -> &Solver {
        &self.solver
    }

    /// The state's full path condition.
    pub fn pi(&self) -> ExprRef {
        self.solver.pi(None)
    }

    pub fn satisfiable(&mut self) -> CheckResult {
        self.solver.satisfiable()
    }

    // ---- persisted artifacts ----

    /// Write the concrete contents of every file in the file system to
    /// `out_dir`, evaluating each symbolic byte under the state's model.
    /// Returns the written paths.
    pub fn dump_fs(&mut self, out_dir: &Path) -> ExecResult<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;

        // collect byte expressions first, then evaluate: the borrow of the
        // file system must end before the solver runs
        let mut files: Vec<(String, Vec<ExprRef>)> = Vec::new();
        for file in self.fs.files_mut() {
            let size = file.size();
            let mut bytes = Vec::with_capacity(size as usize);
            for off in 0..size {
                bytes.push(file.byte_at(off));
            }
            files.push((file.name().to_string(), bytes));
        }

        let mut written = Vec::new();
        for (name, bytes) in files {
            let mut data = Vec::with_capacity(bytes.len());
            for byte in bytes {
                let value = self.solver.evaluate(&byte).ok_or_else(|| {
                    ExecError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "unsatisfiable state cannot be dumped",
                    ))
                })?;
                data.push(value.as_u64() as u8);
            }

            let file_name = name.replace('/', "_");
            let path = out_dir.join(file_name);
            std::fs::write(&path, &data)?;
            debug!(path = %path.display(), bytes = data.len(), "dumped file");
            written.push(path);
        }
        Ok(written)
    }

    pub fn fs(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    pub fn fs_ref(&self) -> &FileSystem {
        &self.fs
    }
}
