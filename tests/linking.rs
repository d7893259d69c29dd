use elf::abi::{R_X86_64_64, R_X86_64_COPY, R_X86_64_GOTPCREL, R_X86_64_PC32};
use fleld::arch::generate_plt_stub;
use fleld::fle::{
    DynReloc, FleObject, FleSection, ObjectKind, Relocation, SectionFlags, SectionHeader,
    SegmentFlags, Symbol, SymbolBinding,
};
use fleld::{Error, LinkOptions, link, listing};

const TEXT_BASE: u64 = 0x40_1000;
const PAGE: u64 = 0x1000;

fn rel_obj(name: &str) -> FleObject {
    FleObject::new(name, ObjectKind::Relocatable)
}

/// A relocatable object holding one `.text` section.
fn text_obj(name: &str, data: Vec<u8>, symbols: Vec<Symbol>, relocs: Vec<Relocation>) -> FleObject {
    let mut obj = rel_obj(name);
    let mut sec = FleSection::with_data(data);
    sec.relocs = relocs;
    obj.sections.insert(".text".into(), sec);
    obj.symbols = symbols;
    obj
}

fn archive(name: &str, members: Vec<FleObject>) -> FleObject {
    let mut ar = FleObject::new(name, ObjectKind::Archive);
    ar.members = members;
    ar
}

/// A shared library exporting each of `exports` as a global definition.
fn shared_lib(name: &str, exports: &[&str]) -> FleObject {
    let mut lib = FleObject::new(name, ObjectKind::Shared);
    for (i, export) in exports.iter().enumerate() {
        lib.symbols.push(Symbol::global(export, ".text", i as u64, 1));
    }
    lib
}

fn find_sym<'a>(obj: &'a FleObject, name: &str) -> &'a Symbol {
    obj.symbols
        .iter()
        .find(|sym| sym.name == name)
        .unwrap_or_else(|| panic!("symbol {} not in output", name))
}

fn patched_i32(data: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
}

#[test]
fn links_single_object() {
    let start = text_obj(
        "a.o",
        vec![0x90; 4],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![],
    );

    let exe = link(&[start], &LinkOptions::new()).unwrap();

    assert_eq!(exe.kind, ObjectKind::Executable);
    assert_eq!(exe.name, "a.out");
    assert_eq!(exe.entry, Some(TEXT_BASE));
    assert_eq!(exe.sections[".text"].data, vec![0x90; 4]);

    let sym = find_sym(&exe, "_start");
    assert_eq!(sym.section, ".text");
    assert_eq!(sym.offset, 0);

    let phdr = exe.phdrs.iter().find(|p| p.section == ".text").unwrap();
    assert_eq!(phdr.vaddr, TEXT_BASE);
    assert_eq!(phdr.memsz, 4);
    assert_eq!(phdr.flags, SegmentFlags::R | SegmentFlags::X);
}

#[test]
fn strong_definition_beats_weak() {
    let a = text_obj(
        "a.o",
        vec![0xc3],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::weak("f", ".text", 0, 1),
        ],
        vec![],
    );
    let b = text_obj(
        "b.o",
        vec![0xc3],
        vec![Symbol::global("f", ".text", 0, 1)],
        vec![],
    );

    // Weak first: the strong definition in b.o wins at 0x401001.
    let exe = link(&[a.clone(), b.clone()], &LinkOptions::new()).unwrap();
    let f = find_sym(&exe, "f");
    assert_eq!(f.binding, SymbolBinding::Global);
    assert_eq!((f.section.as_str(), f.offset), (".text", 1));

    // Strong first: later weak definitions leave it untouched.
    let exe = link(&[b, a], &LinkOptions::new()).unwrap();
    let f = find_sym(&exe, "f");
    assert_eq!(f.binding, SymbolBinding::Global);
    assert_eq!((f.section.as_str(), f.offset), (".text", 0));
}

#[test]
fn weak_definitions_keep_first() {
    let a = text_obj(
        "a.o",
        vec![0x90, 0xc3],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::weak("f", ".text", 1, 1),
        ],
        vec![],
    );
    let b = text_obj(
        "b.o",
        vec![0xc3],
        vec![Symbol::weak("f", ".text", 0, 1)],
        vec![],
    );

    let exe = link(&[a.clone(), b.clone()], &LinkOptions::new()).unwrap();
    assert_eq!(find_sym(&exe, "f").offset, 1);

    let exe = link(&[b, a], &LinkOptions::new()).unwrap();
    assert_eq!(find_sym(&exe, "f").offset, 0);
}

#[test]
fn patches_pc32_call() {
    let a = text_obj(
        "a.o",
        vec![0xe8, 0, 0, 0, 0],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![Relocation::new(R_X86_64_PC32, 1, "f", -4)],
    );
    let b = text_obj(
        "b.o",
        vec![0xc3],
        vec![Symbol::global("f", ".text", 0, 1)],
        vec![],
    );

    let exe = link(&[a, b], &LinkOptions::new()).unwrap();

    // S = 0x401005, P = 0x401001, A = -4: the displacement is exactly 0.
    let text = &exe.sections[".text"].data;
    assert_eq!(text[0], 0xe8);
    assert_eq!(patched_i32(text, 1), 0);
    assert_eq!(text[5], 0xc3);
}

#[test]
fn pulls_needed_archive_member() {
    let main = text_obj(
        "main.o",
        vec![0xe8, 0, 0, 0, 0],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("add"),
        ],
        vec![Relocation::new(R_X86_64_PC32, 1, "add", -4)],
    );
    let sub = text_obj(
        "sub.o",
        vec![0xc3],
        vec![Symbol::global("sub", ".text", 0, 1)],
        vec![],
    );
    let add = text_obj(
        "add.o",
        vec![0xc3],
        vec![Symbol::global("add", ".text", 0, 1)],
        vec![],
    );
    let libm = archive("libm.a", vec![sub, add]);

    let exe = link(&[main, libm], &LinkOptions::new()).unwrap();

    assert!(exe.symbols.iter().any(|sym| sym.name == "add"));
    assert!(!exe.symbols.iter().any(|sym| sym.name == "sub"));
    // add.o landed right after main.o's five bytes.
    assert_eq!(find_sym(&exe, "add").offset, 5);
    assert_eq!(patched_i32(&exe.sections[".text"].data, 1), 0);
}

#[test]
fn pulls_members_transitively() {
    let main = text_obj(
        "main.o",
        vec![0xc3],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("f"),
        ],
        vec![],
    );
    let mut f = text_obj(
        "f.o",
        vec![0xc3],
        vec![Symbol::global("f", ".text", 0, 1)],
        vec![],
    );
    f.symbols.push(Symbol::undefined("g"));
    let g = text_obj(
        "g.o",
        vec![0xc3],
        vec![Symbol::global("g", ".text", 0, 1)],
        vec![],
    );

    let exe = link(&[main, archive("lib.a", vec![f, g])], &LinkOptions::new()).unwrap();

    assert!(exe.symbols.iter().any(|sym| sym.name == "f"));
    assert!(exe.symbols.iter().any(|sym| sym.name == "g"));
}

#[test]
fn selection_is_idempotent() {
    let main = text_obj(
        "main.o",
        vec![0xc3],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("add"),
        ],
        vec![],
    );
    let add = text_obj(
        "add.o",
        vec![0xc3],
        vec![Symbol::global("add", ".text", 0, 1)],
        vec![],
    );
    let inputs = vec![main, archive("libm.a", vec![add])];

    let first = link(&inputs, &LinkOptions::new()).unwrap();
    let second = link(&inputs, &LinkOptions::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn calls_shared_symbol_through_plt() {
    let a = text_obj(
        "a.o",
        vec![0xe8, 0, 0, 0, 0],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("puts"),
        ],
        vec![Relocation::new(R_X86_64_PC32, 1, "puts", -4)],
    );
    let libc = shared_lib("libc.so", &["puts"]);

    let exe = link(&[a, libc], &LinkOptions::new()).unwrap();

    assert_eq!(exe.needed, vec!["libc.so".to_string()]);

    // One 6-byte stub, one 8-byte GOT slot, both at fresh pages.
    let plt_base = TEXT_BASE + PAGE;
    let got_base = plt_base + PAGE;
    let plt = &exe.sections[".plt"].data;
    let got = &exe.sections[".got"].data;
    assert_eq!(got.as_slice(), &[0u8; 8]);

    let got_rel = (got_base - (plt_base + 6)) as i32;
    assert_eq!(plt.as_slice(), &generate_plt_stub(got_rel));

    // The call site lands on the stub.
    let patched = patched_i32(&exe.sections[".text"].data, 1);
    assert_eq!(patched as i64, plt_base as i64 - 4 - (TEXT_BASE + 1) as i64);

    // The loader fills the slot through a dynamic relocation.
    assert!(exe.dyn_relocs.contains(&DynReloc {
        r_type: R_X86_64_64,
        offset: got_base,
        symbol: "puts".into(),
        addend: 0,
    }));
}

#[test]
fn external_data_reference_becomes_dyn_reloc() {
    let mut a = text_obj(
        "a.o",
        vec![0xc3],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("extvar"),
        ],
        vec![],
    );
    let mut data = FleSection::with_data(vec![0; 8]);
    data.relocs.push(Relocation::new(R_X86_64_64, 0, "extvar", 0));
    a.sections.insert(".data".into(), data);

    let exe = link(&[a, shared_lib("libv.so", &["extvar"])], &LinkOptions::new()).unwrap();

    // .text one byte at 0x401000, .data at the next page, .got after it.
    let data_base = TEXT_BASE + PAGE;
    let got_base = data_base + PAGE;
    assert_eq!(exe.sections[".data"].data, vec![0; 8]);
    assert!(exe.dyn_relocs.contains(&DynReloc {
        r_type: R_X86_64_64,
        offset: data_base,
        symbol: "extvar".into(),
        addend: 0,
    }));
    assert!(exe.dyn_relocs.contains(&DynReloc {
        r_type: R_X86_64_64,
        offset: got_base,
        symbol: "extvar".into(),
        addend: 0,
    }));
}

#[test]
fn gotpcrel_uses_got_slot() {
    let mut a = text_obj(
        "a.o",
        vec![0x8b, 0x05, 0, 0, 0, 0],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![Relocation::new(R_X86_64_GOTPCREL, 2, "var", -4)],
    );
    a.sections
        .insert(".data".into(), FleSection::with_data(vec![0; 8]));
    a.symbols.push(Symbol::global("var", ".data", 0, 8));

    let exe = link(&[a], &LinkOptions::new()).unwrap();

    // .text at 0x401000, .data shares the next page start, .got follows.
    let got_base = TEXT_BASE + 2 * PAGE;
    assert_eq!(exe.sections[".got"].data, vec![0; 8]);
    let patched = patched_i32(&exe.sections[".text"].data, 2);
    assert_eq!(patched as i64, got_base as i64 - 4 - (TEXT_BASE + 2) as i64);

    // Even a statically resolved slot is left to the loader.
    assert_eq!(
        exe.dyn_relocs,
        vec![DynReloc {
            r_type: R_X86_64_64,
            offset: got_base,
            symbol: "var".into(),
            addend: 0,
        }]
    );
}

#[test]
fn gotpcrel_requires_definition() {
    let a = text_obj(
        "a.o",
        vec![0x8b, 0x05, 0, 0, 0, 0],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![Relocation::new(R_X86_64_GOTPCREL, 2, "missing", -4)],
    );

    let err = link(&[a], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::UndefinedSymbol { name: "missing".into() });
}

#[test]
fn rejects_multiple_strong_definitions() {
    let a = text_obj(
        "a.o",
        vec![0xc3],
        vec![Symbol::global("main", ".text", 0, 1)],
        vec![],
    );
    let b = text_obj(
        "b.o",
        vec![0xc3],
        vec![Symbol::global("main", ".text", 0, 1)],
        vec![],
    );

    let err = link(&[a, b], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::MultipleStrongDefinition { name: "main".into() });
}

#[test]
fn undefined_symbol_fails() {
    let a = text_obj(
        "a.o",
        vec![0xe8, 0, 0, 0, 0],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![Relocation::new(R_X86_64_PC32, 1, "missing", -4)],
    );

    let err = link(&[a], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::UndefinedSymbol { name: "missing".into() });
}

#[test]
fn undefined_entry_fails() {
    let a = text_obj(
        "a.o",
        vec![0xc3],
        vec![Symbol::global("main", ".text", 0, 1)],
        vec![],
    );

    let err = link(&[a.clone()], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::UndefinedEntry { name: "_start".into() });

    // The entry symbol is configurable.
    let exe = link(&[a], &LinkOptions::new().entry_point("main")).unwrap();
    assert_eq!(exe.entry, Some(TEXT_BASE));
}

#[test]
fn unsupported_reloc_fails() {
    let a = text_obj(
        "a.o",
        vec![0, 0, 0, 0],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::global("f", ".text", 0, 1),
        ],
        vec![Relocation::new(R_X86_64_COPY, 0, "f", 0)],
    );

    let err = link(&[a], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::UnsupportedReloc { r_type: R_X86_64_COPY });
}

#[test]
fn unsupported_external_reloc_fails() {
    let a = text_obj(
        "a.o",
        vec![0, 0, 0, 0],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::undefined("ext"),
        ],
        vec![Relocation::new(R_X86_64_COPY, 0, "ext", 0)],
    );

    let err = link(&[a, shared_lib("libe.so", &["ext"])], &LinkOptions::new()).unwrap_err();
    assert_eq!(err, Error::UnsupportedExternalReloc { r_type: R_X86_64_COPY });
}

#[test]
fn layout_is_page_aligned_and_disjoint() {
    let mut a = text_obj(
        "a.o",
        vec![0x90; 5000],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![],
    );
    a.sections
        .insert(".rodata".into(), FleSection::with_data(vec![1; 10]));
    a.sections
        .insert(".data".into(), FleSection::with_data(vec![2; 20]));
    a.sections.insert(".bss".into(), FleSection::new());
    a.shdrs.push(SectionHeader {
        name: ".bss".into(),
        sh_type: elf::abi::SHT_NOBITS,
        flags: SectionFlags::ALLOC | SectionFlags::WRITE | SectionFlags::NOBITS,
        addr: 0,
        offset: 0,
        size: 16,
    });
    a.symbols.push(Symbol::global("ro", ".rodata", 2, 4));
    a.symbols.push(Symbol::global("dv", ".data", 4, 8));
    a.symbols.push(Symbol::global("buf", ".bss", 4, 12));

    let exe = link(&[a], &LinkOptions::new()).unwrap();

    for phdr in &exe.phdrs {
        assert_eq!(phdr.vaddr % PAGE, 0, "{} is unaligned", phdr.section);
        assert!(phdr.vaddr >= TEXT_BASE);
    }
    let mut intervals: Vec<(u64, u64)> = exe
        .phdrs
        .iter()
        .map(|p| (p.vaddr, p.vaddr + p.memsz))
        .collect();
    intervals.sort_unstable();
    for pair in intervals.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "segments overlap: {:?}", pair);
    }

    // 5000 bytes of code push everything after .text one extra page out.
    let bss = exe.phdrs.iter().find(|p| p.section == ".bss").unwrap();
    assert_eq!(bss.vaddr, TEXT_BASE + 4 * PAGE);
    assert_eq!(bss.memsz, 16);
    assert_eq!(bss.flags, SegmentFlags::R | SegmentFlags::W);
    assert!(exe.sections[".bss"].data.is_empty());

    // Exported symbols land in the section whose interval holds them.
    assert_eq!(find_sym(&exe, "ro").section, ".rodata");
    assert_eq!(find_sym(&exe, "ro").offset, 2);
    assert_eq!(find_sym(&exe, "dv").section, ".data");
    assert_eq!(find_sym(&exe, "dv").offset, 4);
    assert_eq!(find_sym(&exe, "buf").section, ".bss");
    assert_eq!(find_sym(&exe, "buf").offset, 4);
}

#[test]
fn mangles_local_symbols() {
    let mut a = text_obj(
        "a.o",
        vec![0xc3],
        vec![Symbol::global("_start", ".text", 0, 0)],
        vec![],
    );
    a.sections
        .insert(".data".into(), FleSection::with_data(vec![0; 8]));
    a.symbols.push(Symbol::local("counter", ".data", 0, 8));

    let mut b = rel_obj("b.o");
    b.sections
        .insert(".data".into(), FleSection::with_data(vec![0; 8]));
    b.symbols.push(Symbol::local("counter", ".data", 0, 8));

    let exe = link(&[a, b], &LinkOptions::new()).unwrap();

    let first = find_sym(&exe, "a.o::counter");
    assert_eq!(first.binding, SymbolBinding::Local);
    assert_eq!((first.section.as_str(), first.offset, first.size), (".data", 0, 8));

    let second = find_sym(&exe, "b.o::counter");
    assert_eq!((second.section.as_str(), second.offset), (".data", 8));
}

#[test]
fn shared_output_emits_section_headers() {
    let mut a = text_obj(
        "a.o",
        vec![0x90; 4],
        vec![Symbol::global("f", ".text", 0, 4)],
        vec![],
    );
    a.sections
        .insert(".data".into(), FleSection::with_data(vec![0; 8]));
    a.symbols.push(Symbol::global("g", ".data", 0, 8));

    let options = LinkOptions::new().shared(true).output_file("libx.so");
    let out = link(&[a], &options).unwrap();

    assert_eq!(out.kind, ObjectKind::Shared);
    assert_eq!(out.name, "libx.so");
    assert_eq!(out.entry, None);

    let names: Vec<&str> = out.shdrs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![".text", ".data", ".bss"]);

    let text = &out.shdrs[0];
    assert_eq!(text.sh_type, elf::abi::SHT_PROGBITS);
    assert_eq!(text.flags, SectionFlags::ALLOC | SectionFlags::EXEC);
    assert_eq!(text.addr, TEXT_BASE);
    assert_eq!((text.offset, text.size), (0, 4));

    let data = &out.shdrs[1];
    assert_eq!(data.flags, SectionFlags::ALLOC | SectionFlags::WRITE);
    assert_eq!((data.offset, data.size), (4, 8));

    let bss = &out.shdrs[2];
    assert_eq!(bss.sh_type, elf::abi::SHT_NOBITS);
    assert!(bss.flags.contains(SectionFlags::NOBITS));
    assert_eq!(bss.offset, 12);
}

#[test]
fn shared_output_defers_unresolved_relocs() {
    let a = text_obj(
        "a.o",
        vec![0xe8, 0, 0, 0, 0],
        vec![Symbol::undefined("ext")],
        vec![Relocation::new(R_X86_64_PC32, 1, "ext", -4)],
    );

    let out = link(&[a], &LinkOptions::new().shared(true)).unwrap();

    assert_eq!(out.name, "lib.so");
    assert_eq!(
        out.dyn_relocs,
        vec![DynReloc {
            r_type: R_X86_64_PC32,
            offset: TEXT_BASE + 1,
            symbol: "ext".into(),
            addend: -4,
        }]
    );
    // The call site stays unpatched for the loader.
    assert_eq!(&out.sections[".text"].data[1..5], &[0, 0, 0, 0]);
}

#[test]
fn lists_symbols_in_nm_format() {
    let a = text_obj(
        "a.o",
        vec![0x90; 8],
        vec![
            Symbol::global("_start", ".text", 0, 0),
            Symbol::weak("w", ".text", 4, 1),
            Symbol::local("lt", ".text", 2, 1),
        ],
        vec![],
    );
    let mut b = rel_obj("b.o");
    b.sections
        .insert(".data".into(), FleSection::with_data(vec![0; 4]));
    b.sections
        .insert(".rodata".into(), FleSection::with_data(vec![0; 4]));
    b.symbols.push(Symbol::global("d", ".data", 0, 4));
    b.symbols.push(Symbol::global("r", ".rodata", 0, 4));
    b.symbols.push(Symbol::undefined("u"));

    let exe = link(&[a, b], &LinkOptions::new()).unwrap();
    let text = listing::format_symbols(&exe);

    // Locals come first (in pull order), then globals by name.
    assert_eq!(
        text,
        "0000000000000002 t a.o::lt\n\
         0000000000000000 T _start\n\
         0000000000000000 D d\n\
         0000000000000000 R r\n\
         0000000000000004 W w\n"
    );
}
