//! Symbol resolution.
//!
//! Every defined symbol across the selected objects is turned into an
//! absolute virtual address. Non-local names share one table and follow
//! the strong/weak rules; locals are kept apart under a per-object
//! mangled key so same-named locals never collide.

use super::layout::{Layout, SectionMap};
use crate::{
    Error, Result,
    fle::{FleObject, Symbol, SymbolBinding},
};
use alloc::{
    collections::btree_map::{BTreeMap, Entry},
    format,
    string::String,
    vec::Vec,
};
use hashbrown::HashMap;

/// A symbol with its binding and resolved absolute address.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolved {
    pub(crate) binding: SymbolBinding,
    pub(crate) addr: u64,
}

/// The mangled key a local symbol resolves under.
pub(crate) fn mangle_local(object: &str, name: &str) -> String {
    format!("{}::{}", object, name)
}

/// The resolved-symbol tables of a link.
pub(crate) struct SymbolTable {
    /// Global and weak names. Ordered so the exported symbol list is
    /// reproducible.
    globals: BTreeMap<String, Resolved>,
    /// Local symbols under their mangled keys.
    locals: HashMap<String, Resolved>,
}

impl SymbolTable {
    /// Resolve every defined symbol in `selected`.
    ///
    /// Local symbols are appended to `output` immediately, carrying their
    /// mangled name, owning output section, in-section offset, and
    /// declared size. Non-local insertion follows the strong/weak rules:
    /// a second strong definition fails, strong replaces weak, and the
    /// first weak definition wins against later weaks.
    pub(crate) fn resolve(
        selected: &[FleObject],
        map: &SectionMap,
        layout: &Layout,
        output: &mut Vec<Symbol>,
    ) -> Result<Self> {
        let mut table = SymbolTable {
            globals: BTreeMap::new(),
            locals: HashMap::new(),
        };

        for obj in selected {
            for sym in &obj.symbols {
                if !sym.is_defined() {
                    continue;
                }
                let Some((target, sec_off)) = map.get(&obj.name, &sym.section) else {
                    continue;
                };
                let addr = layout.vbase(target) + sec_off + sym.offset;

                if sym.binding == SymbolBinding::Local {
                    let mangled = mangle_local(&obj.name, &sym.name);
                    table.locals.insert(
                        mangled.clone(),
                        Resolved {
                            binding: SymbolBinding::Local,
                            addr,
                        },
                    );
                    output.push(Symbol {
                        binding: SymbolBinding::Local,
                        section: target.name().into(),
                        offset: addr - layout.vbase(target),
                        size: sym.size,
                        name: mangled,
                    });
                    continue;
                }

                match table.globals.entry(sym.name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Resolved {
                            binding: sym.binding,
                            addr,
                        });
                    }
                    Entry::Occupied(mut slot) => {
                        let existing = slot.get_mut();
                        match (existing.binding, sym.binding) {
                            (SymbolBinding::Global, SymbolBinding::Global) => {
                                return Err(Error::MultipleStrongDefinition {
                                    name: sym.name.clone(),
                                });
                            }
                            (SymbolBinding::Weak, SymbolBinding::Global) => {
                                *existing = Resolved {
                                    binding: SymbolBinding::Global,
                                    addr,
                                };
                            }
                            // Strong beats weak; the first weak wins.
                            _ => {}
                        }
                    }
                }
            }
        }

        Ok(table)
    }

    /// Look up `name` as seen from `object`: the object's own local
    /// definition shadows any global of the same name.
    pub(crate) fn lookup(&self, object: &str, name: &str) -> Option<Resolved> {
        self.locals
            .get(&mangle_local(object, name))
            .or_else(|| self.globals.get(name))
            .copied()
    }

    /// Look up a non-local name.
    pub(crate) fn global(&self, name: &str) -> Option<Resolved> {
        self.globals.get(name).copied()
    }

    /// Append every resolved non-local symbol to the output list.
    ///
    /// The owning output section is recovered from the address by
    /// interval membership over the layout, and exported entries carry no
    /// size.
    pub(crate) fn export_into(&self, layout: &Layout, output: &mut Vec<Symbol>) {
        for (name, resolved) in &self.globals {
            let section = layout.section_for(resolved.addr);
            output.push(Symbol {
                binding: resolved.binding,
                section: section.name().into(),
                offset: resolved.addr - layout.vbase(section),
                size: 0,
                name: name.clone(),
            });
        }
    }
}
