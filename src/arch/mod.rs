//! Target architecture support.
//!
//! The machine-dependent pieces of the linker — relocation formulas, the
//! PLT stub encoding, and the predicates deciding which relocation kinds
//! need indirection tables — live here, one module per target. The
//! pipeline itself is target-agnostic; x86-64 is the only target wired up.

mod x86_64;

pub use x86_64::{GOT_ENTRY_SIZE, PLT_ENTRY_SIZE, generate_plt_stub, rel_type_to_str};

pub(crate) use x86_64::{needs_got, needs_plt, patch};
