//! The link pipeline.
//!
//! [`link`] drives the passes in their fixed order: archive member
//! selection, GOT/PLT planning, layout, section merging, table synthesis,
//! symbol resolution, relocation, and output finalization. Each pass is a
//! plain transformation over the object model; nothing here suspends or
//! touches the outside world.

mod archive;
mod finalize;
mod layout;
mod plan;
mod pltgot;
mod relocate;
mod resolve;

use crate::{
    Result,
    fle::{FleObject, ObjectKind, SymbolBinding},
};
use alloc::{string::String, vec::Vec};
use hashbrown::HashSet;

/// Configuration for a single link.
///
/// Built with a chain of setters:
///
/// ```rust
/// use fleld::LinkOptions;
///
/// let options = LinkOptions::new().shared(true).output_file("libdemo.so");
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    shared: bool,
    output_file: Option<String>,
    entry_point: Option<String>,
}

impl LinkOptions {
    /// Options for a position-dependent executable named `a.out` with
    /// entry `_start`.
    pub fn new() -> Self {
        LinkOptions::default()
    }

    /// Produce a shared library instead of an executable.
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Name stamped onto the output object.
    pub fn output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = Some(name.into());
        self
    }

    /// Symbol used as the entry point of executable output.
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    fn output_name(&self) -> String {
        match &self.output_file {
            Some(name) => name.clone(),
            None if self.shared => "lib.so".into(),
            None => "a.out".into(),
        }
    }

    fn entry_name(&self) -> &str {
        self.entry_point.as_deref().unwrap_or("_start")
    }
}

/// Which names the static and shared sides of a link define.
///
/// A symbol is *external* when only a shared library defines it; such
/// references resolve at load time through the GOT, the PLT, or a dynamic
/// relocation.
pub(crate) struct SymbolScope {
    defined_static: HashSet<String>,
    shared_defined: HashSet<String>,
    have_shared: bool,
}

impl SymbolScope {
    fn collect(selected: &[FleObject], shared_libs: &[&FleObject]) -> Self {
        let mut defined_static = HashSet::new();
        for obj in selected {
            for sym in &obj.symbols {
                if sym.binding != SymbolBinding::Local && sym.is_defined() {
                    defined_static.insert(sym.name.clone());
                }
            }
        }

        let mut shared_defined = HashSet::new();
        for lib in shared_libs {
            for sym in &lib.symbols {
                if sym.binding != SymbolBinding::Local && sym.is_defined() {
                    shared_defined.insert(sym.name.clone());
                }
            }
        }

        SymbolScope {
            defined_static,
            shared_defined,
            have_shared: !shared_libs.is_empty(),
        }
    }

    pub(crate) fn defined_static(&self, name: &str) -> bool {
        self.defined_static.contains(name)
    }

    pub(crate) fn is_external(&self, name: &str) -> bool {
        !self.defined_static.contains(name) && self.shared_defined.contains(name)
    }

    pub(crate) fn in_shared(&self, name: &str) -> bool {
        self.shared_defined.contains(name)
    }

    pub(crate) fn have_shared(&self) -> bool {
        self.have_shared
    }
}

/// Links `objects` into a single output object.
///
/// Archive members are pulled as needed to close the undefined-symbol
/// set; shared libraries contribute symbol visibility only and end up in
/// the output's `needed` list. The inputs are left untouched — the output
/// owns all of its contents.
///
/// # Errors
/// Returns the first [`crate::Error`] the pipeline hits; no partial
/// output is produced.
pub fn link(objects: &[FleObject], options: &LinkOptions) -> Result<FleObject> {
    let selected = archive::select_members(objects);
    let shared_libs: Vec<&FleObject> = objects
        .iter()
        .filter(|obj| obj.kind == ObjectKind::Shared)
        .collect();

    let kind = if options.shared {
        ObjectKind::Shared
    } else {
        ObjectKind::Executable
    };
    let mut output = FleObject::new(options.output_name(), kind);
    for lib in &shared_libs {
        output.needed.push(lib.name.clone());
    }

    #[cfg(feature = "log")]
    log::info!(
        "linking {} ({} selected objects, {} shared libraries)",
        output.name,
        selected.len(),
        shared_libs.len()
    );

    let scope = SymbolScope::collect(&selected, &shared_libs);
    let plan = plan::IndirectionPlan::build(&selected, &scope, options.shared);
    let layout = layout::Layout::compute(&selected, &plan, options.shared);
    let (map, mut out_data) = layout::merge(&selected);
    let pltgot = pltgot::PltGot::synthesize(&plan, &layout, &mut out_data, options.shared)?;

    let symtab = resolve::SymbolTable::resolve(&selected, &map, &layout, &mut output.symbols)?;
    symtab.export_into(&layout, &mut output.symbols);

    let env = relocate::RelocEnv {
        map: &map,
        layout: &layout,
        symtab: &symtab,
        plan: &plan,
        pltgot: &pltgot,
        scope: &scope,
        shared_output: options.shared,
    };
    relocate::apply(&env, &selected, &mut out_data, &mut output.dyn_relocs)?;
    pltgot::emit_got_relocs(&plan, &layout, &mut output.dyn_relocs);

    finalize::install_sections(&mut output, out_data);
    finalize::program_headers(&mut output, &layout);
    if options.shared {
        finalize::section_headers(&mut output, &layout);
    } else {
        output.entry = Some(finalize::entry_address(&symtab, options.entry_name())?);
    }

    Ok(output)
}
