//! GOT and PLT planning.
//!
//! Before any bytes move, the planner walks every relocation in the
//! selected objects and decides which symbols get a GOT slot and which
//! additionally get a PLT stub. Entry order is first-encounter order
//! across the traversal; a name gets at most one slot of each kind.

use super::SymbolScope;
use crate::{
    arch::{self, GOT_ENTRY_SIZE},
    fle::FleObject,
};
use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use hashbrown::HashMap;

/// The planned indirection tables: which names occupy the GOT and the
/// PLT, and in which order.
pub(crate) struct IndirectionPlan {
    got_order: Vec<String>,
    plt_order: Vec<String>,
    got_index: HashMap<String, usize>,
    plt_index: HashMap<String, usize>,
}

impl IndirectionPlan {
    /// Walk all relocations and reserve slots.
    ///
    /// A `GOTPCREL` relocation always reserves a GOT slot. Beyond that,
    /// only executable output with shared libraries present plans
    /// indirection: a symbol defined solely by a shared library gets a
    /// GOT slot, and a PLT stub too when the reference is a call
    /// (`PC32`).
    pub(crate) fn build(
        selected: &[FleObject],
        scope: &SymbolScope,
        shared_output: bool,
    ) -> Self {
        let mut plan = IndirectionPlan {
            got_order: Vec::new(),
            plt_order: Vec::new(),
            got_index: HashMap::new(),
            plt_index: HashMap::new(),
        };

        for obj in selected {
            for sec in obj.sections.values() {
                for reloc in &sec.relocs {
                    if arch::needs_got(reloc.r_type) {
                        plan.reserve_got(&reloc.symbol);
                    }
                    if shared_output || !scope.have_shared() {
                        continue;
                    }
                    if scope.defined_static(&reloc.symbol) || !scope.in_shared(&reloc.symbol) {
                        continue;
                    }
                    plan.reserve_got(&reloc.symbol);
                    if arch::needs_plt(reloc.r_type) {
                        plan.reserve_plt(&reloc.symbol);
                    }
                }
            }
        }

        #[cfg(feature = "log")]
        log::debug!(
            "planned {} GOT entries, {} PLT stubs",
            plan.got_order.len(),
            plan.plt_order.len()
        );

        plan
    }

    fn reserve_got(&mut self, name: &str) {
        if !self.got_index.contains_key(name) {
            self.got_index.insert(name.to_string(), self.got_order.len());
            self.got_order.push(name.to_string());
        }
    }

    fn reserve_plt(&mut self, name: &str) {
        if !self.plt_index.contains_key(name) {
            self.plt_index.insert(name.to_string(), self.plt_order.len());
            self.plt_order.push(name.to_string());
        }
    }

    /// GOT entry names in first-encounter order.
    pub(crate) fn got_names(&self) -> &[String] {
        &self.got_order
    }

    /// PLT stub names in first-encounter order.
    pub(crate) fn plt_names(&self) -> &[String] {
        &self.plt_order
    }

    pub(crate) fn got_len(&self) -> usize {
        self.got_order.len()
    }

    pub(crate) fn plt_len(&self) -> usize {
        self.plt_order.len()
    }

    /// Byte offset of `name`'s slot inside the GOT.
    pub(crate) fn got_offset(&self, name: &str) -> Option<u64> {
        self.got_index
            .get(name)
            .map(|index| (index * GOT_ENTRY_SIZE) as u64)
    }
}
