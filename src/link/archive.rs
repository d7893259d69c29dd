//! Archive member selection.
//!
//! Archives contribute an object only when it satisfies a name the link
//! still leaves undefined. Selection iterates to a fixpoint: every pass
//! either pulls at least one member that was not pulled before or stops,
//! so the loop always terminates, and the order of pulls is reproducible
//! from the input order.

use crate::fle::{FleObject, ObjectKind, SymbolBinding};
use alloc::{string::String, vec::Vec};
use hashbrown::HashSet;

/// Collect the defined and still-undefined non-local names across `objs`.
fn defined_and_undefined(objs: &[FleObject]) -> (HashSet<String>, HashSet<String>) {
    let mut defined = HashSet::new();
    let mut undefined = HashSet::new();
    for obj in objs {
        for sym in &obj.symbols {
            if sym.binding == SymbolBinding::Local {
                continue;
            }
            if sym.is_defined() {
                defined.insert(sym.name.clone());
            } else {
                undefined.insert(sym.name.clone());
            }
        }
    }
    (defined, undefined)
}

/// Whether `member` defines any name in `undefined` as a non-local symbol
/// with a real section behind it.
fn provides_any(member: &FleObject, undefined: &HashSet<String>) -> bool {
    member.symbols.iter().any(|sym| {
        sym.binding != SymbolBinding::Local && sym.is_defined() && undefined.contains(&sym.name)
    })
}

/// Select the objects participating in the link: every non-archive,
/// non-shared input, plus any archive member needed to close the
/// undefined-symbol set. Members are copied out of their archives;
/// shared libraries never enter the selected set.
pub(crate) fn select_members(objects: &[FleObject]) -> Vec<FleObject> {
    let mut selected = Vec::new();
    let mut archives = Vec::new();
    for obj in objects {
        match obj.kind {
            ObjectKind::Archive => archives.push(obj),
            ObjectKind::Shared => {}
            _ => selected.push(obj.clone()),
        }
    }

    // Pulled members are tracked by (archive, member, index) so a member
    // is never pulled twice even when archives repeat names.
    let mut pulled: HashSet<(String, String, usize)> = HashSet::new();
    loop {
        let (defined, mut undefined) = defined_and_undefined(&selected);
        undefined.retain(|name| !defined.contains(name));
        if undefined.is_empty() {
            break;
        }

        let mut changed = false;
        for archive in &archives {
            for (index, member) in archive.members.iter().enumerate() {
                let id = (archive.name.clone(), member.name.clone(), index);
                if pulled.contains(&id) {
                    continue;
                }
                if provides_any(member, &undefined) {
                    #[cfg(feature = "log")]
                    log::debug!("pulling member {}({})", archive.name, member.name);
                    selected.push(member.clone());
                    pulled.insert(id);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    selected
}
