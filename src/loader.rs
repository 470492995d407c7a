//! The loaded program image: segments, symbols, relocations.
//!
//! Binary parsing itself (ELF/PE) is a loader concern outside this crate; a
//! loader populates an [`AddressSpace`] and hands it to the engine. The
//! address space is immutable once execution starts and is shared read-only
//! by every forked state.

use bitflags::bitflags;

use crate::arch::Endianness;

bitflags! {
    /// Segment permissions.
    pub struct Perm: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXEC = 0b100;
    }
}

/// Classification of a loaded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Function,
    ExtFunction,
    Local,
    Global,
    Unknown,
}

/// A named address in the binary.
#[derive(Debug, Clone)]
pub struct Symbol {
    addr: u64,
    name: String,
    ty: SymbolType,
}

impl Symbol {
    pub fn new(addr: u64, name: impl Into<String>, ty: SymbolType) -> Self {
        Self {
            addr,
            name: name.into(),
            ty,
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> SymbolType {
        self.ty
    }
}

/// Kind of a dynamic relocation the linker resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationType {
    Func,
}

/// A dynamic relocation: the site to patch and the imported name.
#[derive(Debug, Clone)]
pub struct Relocation {
    addr: u64,
    name: String,
    ty: RelocationType,
}

impl Relocation {
    pub fn new(addr: u64, name: impl Into<String>, ty: RelocationType) -> Self {
        Self {
            addr,
            name: name.into(),
            ty,
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> RelocationType {
        self.ty
    }
}

/// A contiguous mapped region with its backing bytes.
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    addr: u64,
    data: Vec<u8>,
    perm: Perm,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn perm(&self) -> Perm {
        self.perm
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.addr + self.data.len() as u64
    }

    fn read(&self, addr: u64) -> Option<u8> {
        self.contains(addr)
            .then(|| self.data[(addr - self.addr) as usize])
    }

    fn tail(&self, addr: u64) -> Option<&[u8]> {
        self.contains(addr)
            .then(|| &self.data[(addr - self.addr) as usize..])
    }
}

/// The program image the engine executes over.
#[derive(Debug, Default)]
pub struct AddressSpace {
    segments: Vec<Segment>,
    symbols: Vec<Symbol>,
    relocations: Vec<Relocation>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `data` at `addr`.
    pub fn register_segment(
        &mut self,
        name: impl Into<String>,
        addr: u64,
        data: Vec<u8>,
        perm: Perm,
    ) {
        self.segments.push(Segment {
            name: name.into(),
            addr,
            data,
            perm,
        });
    }

    /// Map a zero-filled region of `size` bytes at `addr`.
    pub fn register_zero_segment(
        &mut self,
        name: impl Into<String>,
        addr: u64,
        size: usize,
        perm: Perm,
    ) {
        self.register_segment(name, addr, vec![0; size], perm);
    }

    /// Record a symbol. Symbols accumulate: registering a second symbol at an
    /// address keeps both.
    pub fn register_symbol(&mut self, addr: u64, name: impl Into<String>, ty: SymbolType) {
        self.symbols.push(Symbol::new(addr, name, ty));
    }

    pub fn register_relocation(&mut self, addr: u64, name: impl Into<String>, ty: RelocationType) {
        self.relocations.push(Relocation::new(addr, name, ty));
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Every symbol registered at `addr`.
    pub fn symbols_at(&self, addr: u64) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.addr == addr)
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn read_byte(&self, addr: u64) -> Option<u8> {
        self.segments.iter().find_map(|s| s.read(addr))
    }

    fn read_int(&self, addr: u64, n: u32, end: Endianness) -> Option<u64> {
        let mut out = 0u64;
        for i in 0..n {
            let byte = self.read_byte(addr + i as u64)? as u64;
            let shift = match end {
                Endianness::Little => i * 8,
                Endianness::Big => (n - i - 1) * 8,
            };
            out |= byte << shift;
        }
        Some(out)
    }

    pub fn read_word(&self, addr: u64, end: Endianness) -> Option<u16> {
        self.read_int(addr, 2, end).map(|v| v as u16)
    }

    pub fn read_dword(&self, addr: u64, end: Endianness) -> Option<u32> {
        self.read_int(addr, 4, end).map(|v| v as u32)
    }

    pub fn read_qword(&self, addr: u64, end: Endianness) -> Option<u64> {
        self.read_int(addr, 8, end)
    }

    /// The mapped bytes from `addr` to the end of its segment, for code
    /// fetch.
    pub fn get_ref(&self, addr: u64) -> Option<&[u8]> {
        self.segments.iter().find_map(|s| s.tail(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_accumulate_at_one_address() {
        let mut space = AddressSpace::new();
        space.register_symbol(0x1000, "main", SymbolType::Function);
        space.register_symbol(0x1000, "entry", SymbolType::Global);

        let names: Vec<_> = space.symbols_at(0x1000).map(|s| s.name()).collect();
        assert_eq!(names, vec!["main", "entry"]);
    }

    #[test]
    fn backed_reads_cross_segments() {
        let mut space = AddressSpace::new();
        space.register_segment(".text", 0x400000, vec![0xde, 0xad], Perm::READ | Perm::EXEC);
        space.register_segment(".data", 0x600000, vec![0x01], Perm::READ | Perm::WRITE);

        assert_eq!(space.read_byte(0x400001), Some(0xad));
        assert_eq!(space.read_byte(0x600000), Some(0x01));
        assert_eq!(space.read_byte(0x500000), None);
        assert_eq!(
            space.read_word(0x400000, Endianness::Big),
            Some(0xdead)
        );
    }
}
