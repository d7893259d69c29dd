//! GOT and PLT table synthesis.
//!
//! The GOT is zero-filled to its planned size and left to the dynamic
//! loader: every slot gets an `R_X86_64_64` dynamic relocation, whether
//! the symbol resolved statically or not. PLT stubs are emitted for
//! executable output only, one 6-byte indirect jump per planned name.

use super::{
    layout::{Layout, OutputSection},
    plan::IndirectionPlan,
};
use crate::{
    Error, Result,
    arch::{self, PLT_ENTRY_SIZE},
    fle::DynReloc,
};
use alloc::{string::String, vec::Vec};
use elf::abi::R_X86_64_64;
use hashbrown::HashMap;

/// The synthesized tables: where each PLT stub landed inside `.plt`.
pub(crate) struct PltGot {
    plt_offsets: HashMap<String, u64>,
}

impl PltGot {
    /// Fill the GOT and emit PLT stubs into the output buffers.
    ///
    /// Stubs are appended after any merged `.plt` input bytes. Each stub
    /// jumps indirectly through its symbol's GOT slot; the displacement
    /// is relative to the end of the 6-byte instruction.
    pub(crate) fn synthesize(
        plan: &IndirectionPlan,
        layout: &Layout,
        out: &mut [Vec<u8>; 6],
        shared_output: bool,
    ) -> Result<Self> {
        let mut plt_offsets = HashMap::new();

        if plan.got_len() > 0 {
            let total = layout.total(OutputSection::Got) as usize;
            out[OutputSection::Got.index()].resize(total, 0);
        }

        if !shared_output && plan.plt_len() > 0 {
            let plt_base = out[OutputSection::Plt.index()].len() as u64;
            let got_vbase = layout.vbase(OutputSection::Got);
            let plt_vbase = layout.vbase(OutputSection::Plt);
            for (index, name) in plan.plt_names().iter().enumerate() {
                let got_off = plan
                    .got_offset(name)
                    .ok_or_else(|| Error::MissingGotEntry { name: name.clone() })?;
                let stub_off = plt_base + (index * PLT_ENTRY_SIZE) as u64;
                let got_rel = (got_vbase + got_off) as i64
                    - (plt_vbase + stub_off + PLT_ENTRY_SIZE as u64) as i64;
                out[OutputSection::Plt.index()]
                    .extend_from_slice(&arch::generate_plt_stub(got_rel as i32));
                plt_offsets.insert(name.clone(), stub_off);
            }
        }

        Ok(PltGot { plt_offsets })
    }

    /// Byte offset of `name`'s stub inside `.plt`.
    pub(crate) fn plt_offset(&self, name: &str) -> Option<u64> {
        self.plt_offsets.get(name).copied()
    }
}

/// Emit one loader-applied relocation per GOT slot so the loader fills
/// it with the symbol's address at program start.
pub(crate) fn emit_got_relocs(
    plan: &IndirectionPlan,
    layout: &Layout,
    dyn_relocs: &mut Vec<DynReloc>,
) {
    for name in plan.got_names() {
        let Some(got_off) = plan.got_offset(name) else {
            continue;
        };
        dyn_relocs.push(DynReloc {
            r_type: R_X86_64_64,
            offset: layout.vbase(OutputSection::Got) + got_off,
            symbol: name.clone(),
            addend: 0,
        });
    }
}
