//! Byte-granular symbolic memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arch::Endianness;
use crate::error::{ExecError, ExecResult};
use crate::expr::{ExprBuilder, ExprRef};
use crate::loader::AddressSpace;

/// What a read of a byte that was never written should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninitReadPolicy {
    /// A fresh 8-bit symbol named `<map>_0x<addr>`.
    Symbol,
    /// A concrete zero byte.
    Zero,
    /// A hard failure; used for scratch storage that must be written first.
    Error,
}

/// A byte-addressed symbolic store over an optional read-only backing image.
///
/// Reads that miss the map fall through to the backing address space (and
/// memoize the concrete byte), then to the uninitialized-read policy. Writes
/// always populate the map. Multi-byte accesses decompose into byte
/// operations in the requested endianness.
#[derive(Clone)]
pub struct MapMemory {
    name: String,
    policy: UninitReadPolicy,
    bytes: BTreeMap<u64, ExprRef>,
    backing: Option<Arc<AddressSpace>>,
    builder: Arc<ExprBuilder>,
}

impl MapMemory {
    pub fn new(
        name: impl Into<String>,
        policy: UninitReadPolicy,
        builder: Arc<ExprBuilder>,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            bytes: BTreeMap::new(),
            backing: None,
            builder,
        }
    }

    pub fn with_backing(
        name: impl Into<String>,
        policy: UninitReadPolicy,
        builder: Arc<ExprBuilder>,
        backing: Arc<AddressSpace>,
    ) -> Self {
        Self {
            backing: Some(backing),
            ..Self::new(name, policy, builder)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written (or memoized) so far, ascending by address.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &ExprRef)> {
        self.bytes.iter().map(|(addr, e)| (*addr, e))
    }

    pub fn read_byte(&mut self, addr: u64) -> ExecResult<ExprRef> {
        if let Some(byte) = self.bytes.get(&addr) {
            return Ok(byte.clone());
        }

        if let Some(backing) = &self.backing {
            if let Some(byte) = backing.read_byte(addr) {
                let byte = self.builder.mk_uconst(byte as u64, 8);
                self.bytes.insert(addr, byte.clone());
                return Ok(byte);
            }
        }

        let fresh = match self.policy {
            UninitReadPolicy::Symbol => self
                .builder
                .mk_sym(&format!("{}_0x{addr:x}", self.name), 8),
            UninitReadPolicy::Zero => self.builder.mk_uconst(0, 8),
            UninitReadPolicy::Error => {
                return Err(ExecError::UninitializedRead {
                    region: self.name.clone(),
                    addr,
                })
            }
        };
        self.bytes.insert(addr, fresh.clone());
        Ok(fresh)
    }

    /// # Panics
    ///
    /// Panics unless `value` is exactly 8 bits wide.
    pub fn write_byte(&mut self, addr: u64, value: ExprRef) {
        assert!(
            value.width() == 8,
            "MapMemory: write_byte: expected an 8-bit value, got {}",
            value.width()
        );
        self.bytes.insert(addr, value);
    }

    /// Read `len` bytes at `addr` as one `len * 8`-bit expression.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn read(&mut self, addr: u64, len: usize, end: Endianness) -> ExecResult<ExprRef> {
        assert!(len > 0, "MapMemory: read: zero length");

        let mut res = self.read_byte(addr)?;
        for i in 1..len as u64 {
            let byte = self.read_byte(addr + i)?;
            res = match end {
                // little endian: later addresses are more significant
                Endianness::Little => self.builder.mk_concat(&byte, &res),
                Endianness::Big => self.builder.mk_concat(&res, &byte),
            };
        }
        Ok(res)
    }

    /// Write a whole-byte-width expression at `addr`.
    ///
    /// # Panics
    ///
    /// Panics unless the value width is a nonzero multiple of 8.
    pub fn write(&mut self, addr: u64, value: &ExprRef, end: Endianness) {
        let width = value.width();
        assert!(
            width > 0 && width % 8 == 0,
            "MapMemory: write: value width {width} is not a multiple of 8"
        );

        let len = width / 8;
        for i in 0..len {
            let (high, low) = match end {
                Endianness::Little => (i * 8 + 7, i * 8),
                Endianness::Big => ((len - i - 1) * 8 + 7, (len - i - 1) * 8),
            };
            let byte = self.builder.mk_extract(value, high, low);
            self.write_byte(addr + i as u64, byte);
        }
    }
}
