//! The FLE object model.
//!
//! Every input to and output of the linker is expressed in this
//! pre-parsed, in-memory form. A front end parses on-disk images into
//! [`FleObject`]s and a back end serializes the linked result; the linker
//! itself only ever transforms values of these types.

use alloc::{collections::BTreeMap, string::String, vec::Vec};
use bitflags::bitflags;
use elf::abi::{PF_R, PF_W, PF_X, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE};

/// The kind of an FLE object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A relocatable object (`.o`).
    Relocatable,
    /// An archive of relocatable objects (`.ar`); the objects live in
    /// [`FleObject::members`].
    Archive,
    /// A shared library (`.so`). Shared inputs contribute only symbol
    /// visibility; they are never merged into the output.
    Shared,
    /// A linked executable (`.exe`).
    Executable,
}

impl ObjectKind {
    /// The dotted suffix the FLE format stamps on objects of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Relocatable => ".o",
            ObjectKind::Archive => ".ar",
            ObjectKind::Shared => ".so",
            ObjectKind::Executable => ".exe",
        }
    }
}

impl core::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbol binding, ordered by resolution strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    /// Visible only inside the defining object.
    Local,
    /// A strong definition; at most one per name across a link.
    Global,
    /// Yields to a global definition of the same name.
    Weak,
}

/// A symbol as carried by an object.
///
/// An empty `section` marks the symbol as undefined: a reference to be
/// satisfied by some other object in the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub binding: SymbolBinding,
    /// Name of the owning section; empty for undefined symbols.
    pub section: String,
    /// Offset of the symbol inside its section.
    pub offset: u64,
    pub size: u64,
    pub name: String,
}

impl Symbol {
    /// A global definition at `offset` inside `section`.
    pub fn global(name: &str, section: &str, offset: u64, size: u64) -> Self {
        Symbol {
            binding: SymbolBinding::Global,
            section: section.into(),
            offset,
            size,
            name: name.into(),
        }
    }

    /// A weak definition at `offset` inside `section`.
    pub fn weak(name: &str, section: &str, offset: u64, size: u64) -> Self {
        Symbol {
            binding: SymbolBinding::Weak,
            ..Symbol::global(name, section, offset, size)
        }
    }

    /// A local definition at `offset` inside `section`.
    pub fn local(name: &str, section: &str, offset: u64, size: u64) -> Self {
        Symbol {
            binding: SymbolBinding::Local,
            ..Symbol::global(name, section, offset, size)
        }
    }

    /// An undefined reference to `name`.
    pub fn undefined(name: &str) -> Self {
        Symbol {
            binding: SymbolBinding::Global,
            section: String::new(),
            offset: 0,
            size: 0,
            name: name.into(),
        }
    }

    /// Whether the symbol carries a definition.
    pub fn is_defined(&self) -> bool {
        !self.section.is_empty()
    }
}

/// A relocation against a byte range inside its carrying section.
///
/// `r_type` holds an `elf::abi::R_X86_64_*` value. `offset` is relative
/// to the start of the section the relocation lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub r_type: u32,
    pub offset: u64,
    pub symbol: String,
    /// Signed addend; for PC-relative forms the front end already folds
    /// the instruction-tail correction into it.
    pub addend: i64,
}

impl Relocation {
    pub fn new(r_type: u32, offset: u64, symbol: &str, addend: i64) -> Self {
        Relocation {
            r_type,
            offset,
            symbol: symbol.into(),
            addend,
        }
    }
}

/// A section: raw bytes plus the relocations targeting them.
///
/// `.bss`-style sections own no bytes; their extent comes from the
/// matching [`SectionHeader`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleSection {
    pub data: Vec<u8>,
    pub relocs: Vec<Relocation>,
}

impl FleSection {
    pub fn new() -> Self {
        FleSection::default()
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        FleSection {
            data,
            relocs: Vec::new(),
        }
    }
}

bitflags! {
    /// Section attribute flags.
    ///
    /// The three low bits are the ELF `SHF_*` values; `NOBITS` is the FLE
    /// model's marker for sections that occupy no file bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const WRITE = SHF_WRITE as u32;
        const ALLOC = SHF_ALLOC as u32;
        const EXEC = SHF_EXECINSTR as u32;
        const NOBITS = 0x8;
    }
}

bitflags! {
    /// Segment permission flags, with the ELF `PF_*` bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const X = PF_X as u32;
        const W = PF_W as u32;
        const R = PF_R as u32;
    }
}

/// A section header.
///
/// `size` may exceed the section's byte length; `.bss` declares bytes it
/// never carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: String,
    pub sh_type: u32,
    pub flags: SectionFlags,
    /// Virtual address of the section.
    pub addr: u64,
    /// Offset of the section in the encoded file.
    pub offset: u64,
    pub size: u64,
}

/// A program header: one loadable segment per output section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Name of the output section this segment maps.
    pub section: String,
    pub vaddr: u64,
    pub memsz: u64,
    pub flags: SegmentFlags,
}

/// A relocation left for the dynamic loader to apply at program start.
///
/// Unlike [`Relocation`], `offset` is an absolute virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynReloc {
    pub r_type: u32,
    pub offset: u64,
    pub symbol: String,
    pub addend: i64,
}

/// An FLE object: the unit of input and output for the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleObject {
    pub name: String,
    pub kind: ObjectKind,
    /// Sections by name. The map is ordered so traversals are
    /// reproducible; merge order across a link follows this iteration.
    pub sections: BTreeMap<String, FleSection>,
    pub symbols: Vec<Symbol>,
    pub shdrs: Vec<SectionHeader>,
    pub phdrs: Vec<ProgramHeader>,
    pub dyn_relocs: Vec<DynReloc>,
    /// Member objects of an archive, in their declared order.
    pub members: Vec<FleObject>,
    /// Names of the shared libraries the object depends on.
    pub needed: Vec<String>,
    /// Entry address; set on executable output only.
    pub entry: Option<u64>,
}

impl FleObject {
    /// An empty object of the given kind.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        FleObject {
            name: name.into(),
            kind,
            sections: BTreeMap::new(),
            symbols: Vec::new(),
            shdrs: Vec::new(),
            phdrs: Vec::new(),
            dyn_relocs: Vec::new(),
            members: Vec::new(),
            needed: Vec::new(),
            entry: None,
        }
    }

    /// Finds the section header named `name`, if any.
    pub fn shdr(&self, name: &str) -> Option<&SectionHeader> {
        self.shdrs.iter().find(|shdr| shdr.name == name)
    }

    /// Effective size of the section named `name`: the declared header
    /// size when one exists and is non-zero, the byte length otherwise.
    pub fn section_size(&self, name: &str) -> u64 {
        let data_len = self
            .sections
            .get(name)
            .map_or(0, |sec| sec.data.len() as u64);
        match self.shdr(name) {
            Some(shdr) if shdr.size > 0 => shdr.size,
            _ => data_len,
        }
    }
}
