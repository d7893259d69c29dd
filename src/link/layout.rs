//! Output section layout and merging.
//!
//! Input sections are classified by name prefix into six fixed output
//! sections, sized in one pass, assigned page-aligned virtual addresses,
//! and then merged byte-for-byte in a second pass that records where each
//! input section landed.

use super::plan::IndirectionPlan;
use crate::{
    arch::{GOT_ENTRY_SIZE, PLT_ENTRY_SIZE},
    fle::{FleObject, SectionFlags, SegmentFlags},
};
use alloc::{string::String, vec::Vec};
use elf::abi::{SHT_NOBITS, SHT_PROGBITS};
use hashbrown::HashMap;

/// Base virtual address of the output image.
pub(crate) const LOAD_BASE: u64 = 0x40_0000;

/// Alignment of every output section's virtual base.
pub(crate) const PAGE_SIZE: u64 = 0x1000;

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// The six output sections, in their fixed layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputSection {
    Text,
    Plt,
    Rodata,
    Data,
    Got,
    Bss,
}

impl OutputSection {
    /// All output sections in layout order.
    pub(crate) const ALL: [OutputSection; 6] = [
        OutputSection::Text,
        OutputSection::Plt,
        OutputSection::Rodata,
        OutputSection::Data,
        OutputSection::Got,
        OutputSection::Bss,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            OutputSection::Text => ".text",
            OutputSection::Plt => ".plt",
            OutputSection::Rodata => ".rodata",
            OutputSection::Data => ".data",
            OutputSection::Got => ".got",
            OutputSection::Bss => ".bss",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Classify an input section by name prefix. Sections matching none
    /// of the six roots are dropped from the link.
    pub(crate) fn classify(name: &str) -> Option<OutputSection> {
        OutputSection::ALL
            .into_iter()
            .find(|out| name.starts_with(out.name()))
    }

    /// Segment permissions for the section's program header.
    pub(crate) fn segment_flags(self) -> SegmentFlags {
        match self {
            OutputSection::Text | OutputSection::Plt => SegmentFlags::R | SegmentFlags::X,
            OutputSection::Rodata => SegmentFlags::R,
            OutputSection::Data | OutputSection::Got | OutputSection::Bss => {
                SegmentFlags::R | SegmentFlags::W
            }
        }
    }

    /// Attribute flags for the section's header in shared output.
    pub(crate) fn header_flags(self) -> SectionFlags {
        let mut flags = SectionFlags::ALLOC;
        match self {
            OutputSection::Text | OutputSection::Plt => flags |= SectionFlags::EXEC,
            OutputSection::Data | OutputSection::Got => flags |= SectionFlags::WRITE,
            OutputSection::Bss => flags |= SectionFlags::WRITE | SectionFlags::NOBITS,
            OutputSection::Rodata => {}
        }
        flags
    }

    pub(crate) fn sh_type(self) -> u32 {
        match self {
            OutputSection::Bss => SHT_NOBITS,
            _ => SHT_PROGBITS,
        }
    }
}

/// Virtual bases and total sizes of the output sections.
pub(crate) struct Layout {
    vbase: [u64; 6],
    total: [u64; 6],
}

impl Layout {
    /// Accumulate per-section totals and assign virtual addresses.
    ///
    /// Sizing adds every classified input section's effective size, the
    /// planned GOT, and (executable output only) the planned PLT. The
    /// first page at the load base is left to the image header; each
    /// section then starts at the cursor aligned up to the page size.
    pub(crate) fn compute(
        selected: &[FleObject],
        plan: &IndirectionPlan,
        shared_output: bool,
    ) -> Self {
        let mut total = [0u64; 6];
        for obj in selected {
            for name in obj.sections.keys() {
                if let Some(out) = OutputSection::classify(name) {
                    total[out.index()] += obj.section_size(name);
                }
            }
        }
        total[OutputSection::Got.index()] += (plan.got_len() * GOT_ENTRY_SIZE) as u64;
        if !shared_output {
            total[OutputSection::Plt.index()] += (plan.plt_len() * PLT_ENTRY_SIZE) as u64;
        }

        let mut vbase = [0u64; 6];
        let mut cursor = LOAD_BASE + PAGE_SIZE;
        for out in OutputSection::ALL {
            cursor = align_up(cursor, PAGE_SIZE);
            vbase[out.index()] = cursor;
            cursor += total[out.index()];

            #[cfg(feature = "log")]
            log::debug!(
                "laid out {} at 0x{:x} ({} bytes)",
                out.name(),
                vbase[out.index()],
                total[out.index()]
            );
        }

        Layout { vbase, total }
    }

    pub(crate) fn vbase(&self, out: OutputSection) -> u64 {
        self.vbase[out.index()]
    }

    pub(crate) fn total(&self, out: OutputSection) -> u64 {
        self.total[out.index()]
    }

    /// Recover the owning output section of an absolute address by
    /// half-open interval membership over the ordered section bases.
    /// Addresses past the data interval land in `.bss`.
    pub(crate) fn section_for(&self, addr: u64) -> OutputSection {
        if addr >= self.vbase(OutputSection::Text) && addr < self.vbase(OutputSection::Rodata) {
            OutputSection::Text
        } else if addr >= self.vbase(OutputSection::Rodata)
            && addr < self.vbase(OutputSection::Data)
        {
            OutputSection::Rodata
        } else if addr >= self.vbase(OutputSection::Data) && addr < self.vbase(OutputSection::Bss)
        {
            OutputSection::Data
        } else {
            OutputSection::Bss
        }
    }
}

/// Where every merged input section landed:
/// `(object, input section) -> (output section, byte offset)`.
pub(crate) struct SectionMap {
    entries: HashMap<(String, String), (OutputSection, u64)>,
}

impl SectionMap {
    pub(crate) fn get(&self, object: &str, section: &str) -> Option<(OutputSection, u64)> {
        self.entries
            .get(&(String::from(object), String::from(section)))
            .copied()
    }
}

/// Concatenate classified input sections into the output buffers.
///
/// Traversal order matches the sizing pass, so write offsets line up with
/// the accumulated totals. `.bss` input advances its offset without
/// contributing bytes.
pub(crate) fn merge(selected: &[FleObject]) -> (SectionMap, [Vec<u8>; 6]) {
    let mut entries = HashMap::new();
    let mut out: [Vec<u8>; 6] = Default::default();
    let mut write_off = [0u64; 6];

    for obj in selected {
        for (name, sec) in &obj.sections {
            let Some(target) = OutputSection::classify(name) else {
                continue;
            };
            entries.insert(
                (obj.name.clone(), name.clone()),
                (target, write_off[target.index()]),
            );
            if target != OutputSection::Bss {
                out[target.index()].extend_from_slice(&sec.data);
            }
            write_off[target.index()] += obj.section_size(name);
        }
    }

    (SectionMap { entries }, out)
}
