//! Output finalization.
//!
//! The merged buffers become the output object's sections, every present
//! section gets a program header, shared output additionally gets section
//! headers, and executables get their entry address.

use super::{
    layout::{Layout, OutputSection},
    resolve::SymbolTable,
};
use crate::{
    Error, Result,
    fle::{FleObject, FleSection, ProgramHeader, SectionHeader},
};
use alloc::vec::Vec;

/// Move the merged buffers into the output object.
///
/// A section is kept when it has bytes; `.bss` is kept unconditionally so
/// its extent survives even without content.
pub(crate) fn install_sections(output: &mut FleObject, out_data: [Vec<u8>; 6]) {
    for (sec, data) in OutputSection::ALL.into_iter().zip(out_data) {
        if !data.is_empty() || sec == OutputSection::Bss {
            output
                .sections
                .insert(sec.name().into(), FleSection::with_data(data));
        }
    }
}

/// Synthesize one loadable segment per present output section, with the
/// per-role permissions: `R|X` for code, `R` for constants, `R|W` for
/// mutable data.
pub(crate) fn program_headers(output: &mut FleObject, layout: &Layout) {
    let mut phdrs = Vec::new();
    for name in output.sections.keys() {
        let Some(sec) = OutputSection::classify(name) else {
            continue;
        };
        phdrs.push(ProgramHeader {
            section: name.clone(),
            vaddr: layout.vbase(sec),
            memsz: layout.total(sec),
            flags: sec.segment_flags(),
        });
    }
    output.phdrs = phdrs;
}

/// Synthesize section headers for shared output, in layout order, with
/// monotonically increasing file offsets.
pub(crate) fn section_headers(output: &mut FleObject, layout: &Layout) {
    let mut file_off = 0u64;
    for sec in OutputSection::ALL {
        if !output.sections.contains_key(sec.name()) {
            continue;
        }
        output.shdrs.push(SectionHeader {
            name: sec.name().into(),
            sh_type: sec.sh_type(),
            flags: sec.header_flags(),
            addr: layout.vbase(sec),
            offset: file_off,
            size: layout.total(sec),
        });
        file_off += layout.total(sec);
    }
}

/// Resolve the entry symbol of an executable.
pub(crate) fn entry_address(symtab: &SymbolTable, entry: &str) -> Result<u64> {
    let resolved = symtab.global(entry).ok_or_else(|| Error::UndefinedEntry {
        name: entry.into(),
    })?;

    #[cfg(feature = "log")]
    log::debug!("entry {} at 0x{:x}", entry, resolved.addr);

    Ok(resolved.addr)
}
