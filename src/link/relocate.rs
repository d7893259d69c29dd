//! Relocation application.
//!
//! For every relocation inside a merged input section the applier decides
//! how its symbol resolves — statically, through the GOT or PLT, or at
//! load time via a dynamic relocation — and then patches the output bytes
//! with the x86-64 formulas in [`crate::arch`].

use super::{
    SymbolScope,
    layout::{Layout, OutputSection, SectionMap},
    plan::IndirectionPlan,
    pltgot::PltGot,
    resolve::SymbolTable,
};
use crate::{
    Error, Result, arch,
    fle::{DynReloc, FleObject, Relocation},
};
use alloc::vec::Vec;
use elf::abi::{
    R_X86_64_32, R_X86_64_32S, R_X86_64_64, R_X86_64_GOTPCREL, R_X86_64_PC32, R_X86_64_PLT32,
};

/// Everything the applier consults while patching.
pub(crate) struct RelocEnv<'a> {
    pub(crate) map: &'a SectionMap,
    pub(crate) layout: &'a Layout,
    pub(crate) symtab: &'a SymbolTable,
    pub(crate) plan: &'a IndirectionPlan,
    pub(crate) pltgot: &'a PltGot,
    pub(crate) scope: &'a SymbolScope,
    pub(crate) shared_output: bool,
}

/// Apply every relocation in every merged section of `selected`.
pub(crate) fn apply(
    env: &RelocEnv<'_>,
    selected: &[FleObject],
    out: &mut [Vec<u8>; 6],
    dyn_relocs: &mut Vec<DynReloc>,
) -> Result<()> {
    for obj in selected {
        for (sec_name, sec) in &obj.sections {
            let Some((target, sec_off)) = env.map.get(&obj.name, sec_name) else {
                continue;
            };
            for reloc in &sec.relocs {
                apply_one(env, obj, reloc, target, sec_off, out, dyn_relocs)?;
            }
        }
    }
    Ok(())
}

fn apply_one(
    env: &RelocEnv<'_>,
    obj: &FleObject,
    reloc: &Relocation,
    target: OutputSection,
    sec_off: u64,
    out: &mut [Vec<u8>; 6],
    dyn_relocs: &mut Vec<DynReloc>,
) -> Result<()> {
    let name = &reloc.symbol;
    let p = env.layout.vbase(target) + sec_off + reloc.offset;
    let pos = (sec_off + reloc.offset) as usize;
    let a = reloc.addend;

    // The object's own local definition shadows globals of the same name.
    let mut resolved = env.symtab.lookup(&obj.name, name).map(|r| r.addr);
    let is_external = env.scope.is_external(name);

    // GOTPCREL addresses the slot, not the symbol; the slot itself is
    // filled by the loader through its dynamic relocation.
    if reloc.r_type == R_X86_64_GOTPCREL {
        let got_off = env
            .plan
            .got_offset(name)
            .ok_or_else(|| Error::MissingGotEntry { name: name.clone() })?;
        if !env.shared_output && !is_external && resolved.is_none() {
            return Err(Error::UndefinedSymbol { name: name.clone() });
        }
        resolved = Some(env.layout.vbase(OutputSection::Got) + got_off);
    }

    let s = match resolved {
        Some(s) => s,
        None => {
            if env.shared_output {
                // Shared output defers unresolved references to load time.
                dyn_relocs.push(DynReloc {
                    r_type: reloc.r_type,
                    offset: p,
                    symbol: name.clone(),
                    addend: a,
                });
                return Ok(());
            }
            if !is_external {
                return Err(Error::UndefinedSymbol { name: name.clone() });
            }
            match reloc.r_type {
                // Calls into shared libraries go through the PLT.
                R_X86_64_PC32 | R_X86_64_PLT32 => {
                    let plt_off = env
                        .pltgot
                        .plt_offset(name)
                        .ok_or_else(|| Error::MissingPltEntry { name: name.clone() })?;
                    env.layout.vbase(OutputSection::Plt) + plt_off
                }
                // Absolute references are fixed up by the loader.
                R_X86_64_32 | R_X86_64_32S | R_X86_64_64 => {
                    dyn_relocs.push(DynReloc {
                        r_type: reloc.r_type,
                        offset: p,
                        symbol: name.clone(),
                        addend: a,
                    });
                    return Ok(());
                }
                other => return Err(Error::UnsupportedExternalReloc { r_type: other }),
            }
        }
    };

    arch::patch(&mut out[target.index()], pos, reloc.r_type, s, a, p)
}
