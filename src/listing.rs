//! Textual symbol listing.
//!
//! Formats an object's symbol table the way `nm` prints it: one
//! `<offset> <type letter> <name>` line per defined symbol, with the
//! letter derived from the owning section and the binding. The crate does
//! no I/O; callers print the returned text themselves.

use crate::fle::{FleObject, Symbol, SymbolBinding};
use alloc::string::String;
use core::fmt::Write;

/// Derive the listing letter for a symbol.
///
/// Returns `None` for symbols the listing skips: undefined symbols and
/// symbols in sections outside `.text`/`.data`/`.bss`/`.rodata`.
pub fn type_letter(sym: &Symbol) -> Option<char> {
    if !sym.is_defined() {
        return None;
    }
    let global = sym.binding == SymbolBinding::Global;
    let weak = sym.binding == SymbolBinding::Weak;

    let letter = if sym.section.starts_with(".text") {
        match (weak, global) {
            (true, _) => 'W',
            (false, true) => 'T',
            (false, false) => 't',
        }
    } else if sym.section.starts_with(".data") {
        match (weak, global) {
            (true, _) => 'V',
            (false, true) => 'D',
            (false, false) => 'd',
        }
    } else if sym.section.starts_with(".bss") {
        match (weak, global) {
            (true, _) => 'V',
            (false, true) => 'B',
            (false, false) => 'b',
        }
    } else if sym.section.starts_with(".rodata") {
        if global { 'R' } else { 'r' }
    } else {
        return None;
    };
    Some(letter)
}

/// Render the listing for `obj`, one line per listable symbol, in the
/// object's symbol order.
pub fn format_symbols(obj: &FleObject) -> String {
    let mut text = String::new();
    for sym in &obj.symbols {
        if let Some(letter) = type_letter(sym) {
            // Writing into a String cannot fail.
            let _ = writeln!(text, "{:016x} {} {}", sym.offset, letter, sym.name);
        }
    }
    text
}
