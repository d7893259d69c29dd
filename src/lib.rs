//! # fleld
//!
//! **fleld** is the core of a static linker for the FLE object model. It
//! consumes a collection of pre-parsed, in-memory objects — relocatable
//! units, archives, and shared libraries — and produces a single linked
//! output object: a position-dependent executable or a shared library.
//! Parsing on-disk images into [`fle::FleObject`]s and serializing the
//! linked result back out are the jobs of a separate front end and back
//! end; this crate never touches an encoded file.
//!
//! ## Core Features
//!
//! * **Archive member selection**: members are pulled until the
//!   undefined-symbol set closes, in a reproducible input order.
//! * **Layout and merging**: input sections merge into the six fixed
//!   output sections at page-aligned virtual addresses.
//! * **Symbol resolution**: strong/weak/local rules with per-object
//!   mangling of local names.
//! * **x86-64 relocation**: `R_X86_64_{32,32S,64,PC32,GOTPCREL}` byte
//!   patching, with dynamic relocations for load-time symbols.
//! * **GOT/PLT synthesis**: indirection tables and 6-byte stubs for
//!   calls into shared libraries.
//!
//! ## Quick Start
//!
//! ```rust
//! use fleld::{LinkOptions, link};
//! use fleld::fle::{FleObject, FleSection, ObjectKind, Symbol};
//!
//! // One relocatable object: a `.text` section holding a single `ret`
//! // and a global `_start` at its first byte.
//! let mut start = FleObject::new("start.o", ObjectKind::Relocatable);
//! start
//!     .sections
//!     .insert(".text".into(), FleSection::with_data(vec![0xc3]));
//! start.symbols.push(Symbol::global("_start", ".text", 0, 1));
//!
//! let exe = link(&[start], &LinkOptions::new())?;
//! assert_eq!(exe.entry, Some(0x40_1000));
//! # Ok::<(), fleld::Error>(())
//! ```
#![no_std]
#![warn(
    clippy::unnecessary_wraps,
    clippy::unnecessary_lazy_evaluations,
    clippy::collapsible_if,
    clippy::explicit_iter_loop,
    clippy::needless_question_mark,
    clippy::needless_return,
    clippy::redundant_clone,
    clippy::redundant_else
)]
extern crate alloc;

pub mod arch;
mod error;
pub mod fle;
pub mod link;
pub mod listing;

pub use error::Error;
pub use link::{LinkOptions, link};

/// A type alias for `Result`s returned by `fleld` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly
/// specify the [`Error`] type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
