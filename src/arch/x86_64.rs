//! x86-64 relocation formulas and PLT stub encoding.
//!
//! The linker models the five relocation kinds the FLE toolchain emits:
//! `R_X86_64_32`, `R_X86_64_32S`, `R_X86_64_64`, `R_X86_64_PC32`, and
//! `R_X86_64_GOTPCREL`. `R_X86_64_PLT32` is accepted and folded into
//! `PC32` semantics, matching the front end's convention.

use crate::{Error, Result};
use elf::abi::{
    R_X86_64_32, R_X86_64_32S, R_X86_64_64, R_X86_64_GOTPCREL, R_X86_64_PC32, R_X86_64_PLT32,
};

/// Size of one GOT slot in bytes.
pub const GOT_ENTRY_SIZE: usize = 8;

/// Size of one PLT stub in bytes.
pub const PLT_ENTRY_SIZE: usize = 6;

/// Encode a PLT stub: `jmp [rip + got_rel]`.
///
/// The 6-byte instruction ends at the address `got_rel` was computed
/// against, so the displacement needs no further correction.
pub fn generate_plt_stub(got_rel: i32) -> [u8; PLT_ENTRY_SIZE] {
    let mut stub = [0u8; PLT_ENTRY_SIZE];
    stub[0] = 0xff;
    stub[1] = 0x25;
    stub[2..6].copy_from_slice(&got_rel.to_le_bytes());
    stub
}

/// Whether a relocation type always reserves a GOT slot for its symbol.
pub(crate) fn needs_got(r_type: u32) -> bool {
    r_type == R_X86_64_GOTPCREL
}

/// Whether a relocation type calls through the PLT when its symbol lives
/// in a shared library.
pub(crate) fn needs_plt(r_type: u32) -> bool {
    matches!(r_type, R_X86_64_PC32 | R_X86_64_PLT32)
}

/// Patch the relocated field at `pos` inside `data`, little-endian.
///
/// `s` is the resolved symbol address, `a` the addend, and `p` the
/// absolute address of the field itself.
pub(crate) fn patch(data: &mut [u8], pos: usize, r_type: u32, s: u64, a: i64, p: u64) -> Result<()> {
    match r_type {
        // Absolute 32-bit: S + A. The signed form shares the bit pattern.
        R_X86_64_32 | R_X86_64_32S => {
            let val = s.wrapping_add_signed(a) as u32;
            data[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
        }
        // PC-relative 32-bit: S + A - P.
        R_X86_64_PC32 | R_X86_64_PLT32 | R_X86_64_GOTPCREL => {
            let val = s.wrapping_add_signed(a).wrapping_sub(p) as u32;
            data[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
        }
        // Absolute 64-bit: S + A.
        R_X86_64_64 => {
            let val = s.wrapping_add_signed(a);
            data[pos..pos + 8].copy_from_slice(&val.to_le_bytes());
        }
        _ => return Err(Error::UnsupportedReloc { r_type }),
    }
    Ok(())
}

/// Map x86-64 relocation types to human readable names.
pub fn rel_type_to_str(r_type: u32) -> &'static str {
    match r_type {
        R_X86_64_32 => "R_X86_64_32",
        R_X86_64_32S => "R_X86_64_32S",
        R_X86_64_64 => "R_X86_64_64",
        R_X86_64_PC32 => "R_X86_64_PC32",
        R_X86_64_PLT32 => "R_X86_64_PLT32",
        R_X86_64_GOTPCREL => "R_X86_64_GOTPCREL",
        _ => "UNKNOWN",
    }
}
