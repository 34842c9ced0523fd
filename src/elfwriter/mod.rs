// Copyright Elasticsearch B.V. and/or licensed to Elasticsearch B.V. under one
// or more contributor license agreements. See the NOTICE file distributed with
// this work for additional information regarding copyright
// ownership. Elasticsearch B.V. licenses this file to you under
// the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Extracts the parts of an ELF file that are relevant for symbolization.
//!
//! The output keeps the section header table of the input intact: section
//! count, order and names are preserved. Sections that aren't needed are
//! turned into empty `SHT_NOBITS` entries, so section indices in the kept
//! data remain valid.

mod reader;
mod writer;

pub use reader::SourceElf;
pub use writer::{ElfWriter, HeaderSlots, Slot};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use goblin::elf::compression_header::ELFCOMPRESS_ZLIB;
use goblin::elf::program_header::PT_NOTE;
use goblin::elf::section_header::{
    SHF_COMPRESSED, SHN_LORESERVE, SHN_XINDEX, SHT_DYNSYM, SHT_NOBITS, SHT_NOTE, SHT_REL,
    SHT_RELA, SHT_STRTAB, SHT_SYMTAB,
};
use goblin::elf::SectionHeader;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

#[derive(Debug, thiserror::Error)]
pub enum ElfError {
    #[error("not an ELF file")]
    BadMagic,

    #[error("unknown ELF class {0}")]
    UnknownClass(u8),

    #[error("unknown ELF data encoding {0}")]
    UnknownEncoding(u8),

    #[error("truncated ELF file: {0} is incomplete")]
    Truncated(&'static str),

    #[error("malformed ELF file: {0}")]
    Malformed(String),

    #[error("{name}: expected to copy {expected} bytes, copied {written}")]
    SectionLength {
        name: String,
        expected: u64,
        written: u64,
    },

    #[error("value {value:#x} doesn't fit into a {width} field")]
    Overflow { value: u64, width: &'static str },

    #[error(transparent)]
    Parse(#[from] goblin::error::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Options {
    /// Compress DWARF sections with zlib unless they already are compressed.
    pub compress_dwarf: bool,
}

const DEBUG_PREFIXES: [&str; 3] = [".debug_", ".zdebug_", "__debug_"];

/// Whether the section carries DWARF data.
pub fn is_dwarf_section(name: &str) -> bool {
    DEBUG_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn is_symbol_table(name: &str, sh_type: u32) -> bool {
    matches!(name, ".symtab" | ".dynsym" | ".strtab" | ".dynstr")
        || matches!(sh_type, SHT_SYMTAB | SHT_DYNSYM | SHT_STRTAB)
}

fn is_go_symbol_table(name: &str) -> bool {
    matches!(name, ".gosymtab" | ".gopclntab" | ".go.buildinfo")
}

fn is_plt_related(name: &str, sh_type: u32) -> bool {
    matches!(sh_type, SHT_RELA | SHT_REL)
        || name.starts_with(".plt")
        || name.starts_with(".rela.")
}

/// Whether a section is kept with its contents.
pub fn keep_section(name: &str, sh_type: u32) -> bool {
    is_dwarf_section(name)
        || is_symbol_table(name, sh_type)
        || is_go_symbol_table(name)
        || is_plt_related(name, sh_type)
        || name == ".comment"
        || sh_type == SHT_NOTE
}

/// Sections whose `sh_link` is carried over, by name of the linked section.
fn linked_section(name: &str) -> Option<&'static str> {
    match name {
        ".symtab" => Some(".strtab"),
        ".dynsym" => Some(".dynstr"),
        _ => None,
    }
}

fn is_compressed(name: &str, sh: &SectionHeader) -> bool {
    sh.sh_flags & SHF_COMPRESSED as u64 != 0 || name.starts_with(".zdebug_")
}

/// Builds a string table with deduplicated entries.
#[derive(Debug)]
struct StringTableBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, usize>,
}

impl StringTableBuilder {
    fn new() -> Self {
        Self {
            data: vec![0],
            offsets: HashMap::from([(String::new(), 0)]),
        }
    }

    fn add(&mut self, s: &str) -> usize {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }

        let offset = self.data.len();
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.offsets.insert(s.to_owned(), offset);
        offset
    }
}

/// What happens to the contents of an input section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Null,
    NameTable,
    Keep,
    Compress,
    Strip,
}

/// Writes an ELF file to `dst` that contains only the debug relevant parts of
/// `src`.
///
/// `dst` must be positioned at its start.
pub fn only_keep_debug<W, R>(dst: W, src: &mut R, opts: Options) -> Result<(), ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    let elf = SourceElf::read(src)?;
    let mut w = ElfWriter::new(dst, elf.container, elf.endian);
    let slots = w.file_header(&elf.header)?;

    write_note_segments(&elf, &mut w, &slots, src)?;
    if !elf.section_headers.is_empty() {
        write_sections(&elf, &mut w, &slots, src, opts)?;
    }

    w.finish()?;
    Ok(())
}

/// Alias of [`only_keep_debug`].
pub fn extract_debug_only<W, R>(dst: W, src: &mut R, opts: Options) -> Result<(), ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    only_keep_debug(dst, src, opts)
}

fn write_note_segments<W, R>(
    elf: &SourceElf,
    w: &mut ElfWriter<W>,
    slots: &HeaderSlots,
    src: &mut R,
) -> Result<(), ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    let align = w.word_size();
    let mut notes = Vec::new();

    for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_NOTE) {
        w.align(align)?;
        let offset = w.pos();

        src.seek(SeekFrom::Start(ph.p_offset))?;
        let written = w.copy_from(src, ph.p_filesz)?;
        if written != ph.p_filesz {
            return Err(ElfError::SectionLength {
                name: "PT_NOTE segment".to_owned(),
                expected: ph.p_filesz,
                written,
            });
        }

        let mut ph = ph.clone();
        ph.p_offset = offset;
        notes.push(ph);
    }

    if notes.is_empty() {
        return Ok(());
    }

    w.align(align)?;
    w.set(slots.phoff, w.pos())?;
    w.set(slots.phnum, notes.len() as u64)?;
    for ph in &notes {
        w.program_header(ph)?;
    }

    Ok(())
}

fn write_sections<W, R>(
    elf: &SourceElf,
    w: &mut ElfWriter<W>,
    slots: &HeaderSlots,
    src: &mut R,
    opts: Options,
) -> Result<(), ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    let mut names: Vec<String> = (0..elf.section_headers.len())
        .map(|idx| elf.section_name(idx).to_owned())
        .collect();
    let mut inputs: Vec<SectionHeader> = elf.section_headers.clone();

    let shstrndx = match elf.shstrndx {
        Some(idx) => idx,
        None => {
            inputs.push(SectionHeader {
                sh_type: SHT_STRTAB,
                sh_addralign: 1,
                ..null_section()
            });
            names.push(".shstrtab".to_owned());
            inputs.len() - 1
        }
    };

    let mut strtab = StringTableBuilder::new();
    let name_offsets: Vec<usize> = names.iter().map(|n| strtab.add(n)).collect();

    let mut out = Vec::with_capacity(inputs.len());
    for (idx, sh) in inputs.iter().enumerate() {
        let name = &names[idx];
        let action = if idx == 0 {
            Action::Null
        } else if idx == shstrndx {
            Action::NameTable
        } else if !keep_section(name, sh.sh_type) {
            Action::Strip
        } else if opts.compress_dwarf
            && sh.sh_type != SHT_NOBITS
            && is_dwarf_section(name)
            && !is_compressed(name, sh)
        {
            Action::Compress
        } else {
            Action::Keep
        };

        let mut hdr = match action {
            Action::Null => null_section(),
            Action::NameTable => {
                let offset = w.pos();
                w.bytes(&strtab.data)?;
                SectionHeader {
                    sh_type: SHT_STRTAB,
                    sh_offset: offset,
                    sh_size: strtab.data.len() as u64,
                    sh_addralign: 1,
                    ..null_section()
                }
            }
            Action::Strip => SectionHeader {
                sh_type: SHT_NOBITS,
                sh_offset: w.pos(),
                sh_size: 0,
                ..sh.clone()
            },
            Action::Keep => copy_section(w, src, name, sh)?,
            Action::Compress => compress_section(w, src, name, sh)?,
        };

        hdr.sh_name = name_offsets[idx];
        hdr.sh_link = 0;
        out.push(hdr);
    }

    for idx in 0..out.len() {
        let Some(target) = linked_section(&names[idx]) else {
            continue;
        };
        if let Some(link) = names.iter().position(|n| n == target) {
            out[idx].sh_link = link as u32;
        }
    }

    // Large tables use extended numbering: the real values move into section 0.
    let count = out.len() as u64;
    if count >= SHN_LORESERVE as u64 {
        out[0].sh_size = count;
    } else {
        w.set(slots.shnum, count)?;
    }
    if shstrndx as u64 >= SHN_LORESERVE as u64 {
        out[0].sh_link = shstrndx as u32;
        w.set(slots.shstrndx, SHN_XINDEX as u64)?;
    } else {
        w.set(slots.shstrndx, shstrndx as u64)?;
    }

    w.align(w.word_size())?;
    w.set(slots.shoff, w.pos())?;
    for sh in &out {
        w.section_header(sh)?;
    }

    Ok(())
}

fn copy_section<W, R>(
    w: &mut ElfWriter<W>,
    src: &mut R,
    name: &str,
    sh: &SectionHeader,
) -> Result<SectionHeader, ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    w.align(effective_align(sh.sh_addralign))?;
    let offset = w.pos();

    if sh.sh_type != SHT_NOBITS {
        src.seek(SeekFrom::Start(sh.sh_offset))?;
        let written = w.copy_from(src, sh.sh_size)?;
        if written != sh.sh_size {
            return Err(ElfError::SectionLength {
                name: name.to_owned(),
                expected: sh.sh_size,
                written,
            });
        }
    }

    Ok(SectionHeader {
        sh_offset: offset,
        ..sh.clone()
    })
}

fn compress_section<W, R>(
    w: &mut ElfWriter<W>,
    src: &mut R,
    name: &str,
    sh: &SectionHeader,
) -> Result<SectionHeader, ElfError>
where
    W: Write + Seek,
    R: Read + Seek + ?Sized,
{
    src.seek(SeekFrom::Start(sh.sh_offset))?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let read = io::copy(&mut (&mut *src).take(sh.sh_size), &mut encoder)?;
    if read != sh.sh_size {
        return Err(ElfError::SectionLength {
            name: name.to_owned(),
            expected: sh.sh_size,
            written: read,
        });
    }
    let compressed = encoder.finish()?;

    let align = w.word_size();
    w.align(align)?;
    let offset = w.pos();
    w.compression_header(ELFCOMPRESS_ZLIB, sh.sh_size, sh.sh_addralign)?;
    w.bytes(&compressed)?;

    Ok(SectionHeader {
        sh_flags: sh.sh_flags | SHF_COMPRESSED as u64,
        sh_offset: offset,
        sh_size: w.pos() - offset,
        sh_addralign: align,
        ..sh.clone()
    })
}

fn effective_align(align: u64) -> u64 {
    if align.is_power_of_two() {
        align
    } else {
        1
    }
}

fn null_section() -> SectionHeader {
    SectionHeader {
        sh_name: 0,
        sh_type: 0,
        sh_flags: 0,
        sh_addr: 0,
        sh_offset: 0,
        sh_size: 0,
        sh_link: 0,
        sh_info: 0,
        sh_addralign: 0,
        sh_entsize: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ElfImage, TestSection};
    use flate2::read::ZlibDecoder;
    use goblin::elf::section_header::SHT_PROGBITS;
    use goblin::elf::Elf;
    use std::io::Cursor;

    fn extract(input: &[u8], opts: Options) -> Result<Vec<u8>, ElfError> {
        let mut out = Cursor::new(Vec::new());
        only_keep_debug(&mut out, &mut Cursor::new(input), opts)?;
        Ok(out.into_inner())
    }

    fn section_bytes<'a>(data: &'a [u8], sh: &SectionHeader) -> &'a [u8] {
        &data[sh.sh_offset as usize..(sh.sh_offset + sh.sh_size) as usize]
    }

    fn sample_image(is_64: bool, big_endian: bool) -> ElfImage {
        let symsize = if is_64 { 24 } else { 16 };
        let mut image = ElfImage::new(is_64, big_endian)
            .note_segment(b"\x04\0\0\0\x10\0\0\0\x03\0\0\0GNU\0build-id-bytes!".to_vec())
            .section(TestSection::random(".text", 300).addr(0x1000))
            .section(TestSection::new(".note.gnu.build-id", SHT_NOTE, vec![7; 36]))
            .section(TestSection::random(".debug_info", 200))
            .section(TestSection::random(".debug_line", 100))
            .section(
                TestSection::new(".symtab", SHT_SYMTAB, vec![0; symsize * 3])
                    .entsize(symsize as u64)
                    .link(6),
            )
            .section(TestSection::new(".strtab", SHT_STRTAB, b"\0main\0foo\0".to_vec()))
            .section(TestSection::random(".data", 50))
            .section(TestSection::random(".comment", 20))
            .section(TestSection::random(".gopclntab", 40))
            .section(TestSection::random(".plt.got", 16))
            .section(TestSection::new(".bss", SHT_NOBITS, vec![0; 128]));
        for i in 0..10 {
            image = image.section(TestSection::random(&format!(".rnd{i}"), 10 + i));
        }
        image
    }

    fn check_extracted(is_64: bool, big_endian: bool) {
        let input = sample_image(is_64, big_endian).build();
        let output = extract(&input, Options::default()).unwrap();

        let before = Elf::parse(&input).unwrap();
        let after = Elf::parse(&output).unwrap();

        assert_eq!(after.is_64, is_64);
        assert_eq!(after.little_endian, !big_endian);
        assert_eq!(after.header.e_entry, before.header.e_entry);
        assert_eq!(after.header.e_flags, before.header.e_flags);
        assert_eq!(after.header.e_machine, before.header.e_machine);
        assert_eq!(after.header.e_ident, before.header.e_ident);
        assert_eq!(after.section_headers.len(), before.section_headers.len());
        assert_eq!(after.header.e_shstrndx, before.header.e_shstrndx);

        for (a, b) in after.section_headers.iter().zip(&before.section_headers) {
            let name = before.shdr_strtab.get_at(b.sh_name).unwrap();
            assert_eq!(after.shdr_strtab.get_at(a.sh_name), Some(name));

            if name == ".shstrtab" {
                continue;
            }

            if keep_section(name, b.sh_type) {
                assert_eq!(a.sh_type, b.sh_type, "{name}");
                assert_eq!(a.sh_size, b.sh_size, "{name}");
                if b.sh_type != SHT_NOBITS {
                    assert_eq!(section_bytes(&output, a), section_bytes(&input, b), "{name}");
                }
            } else if b.sh_type != 0 {
                assert_eq!(a.sh_type, SHT_NOBITS, "{name}");
                assert_eq!(a.sh_size, 0, "{name}");
                assert_eq!(a.sh_flags, b.sh_flags, "{name}");
            }
        }

        // Only the note segment survives.
        assert_eq!(before.program_headers.len(), 2);
        assert_eq!(after.program_headers.len(), 1);
        let (old, new) = (&before.program_headers[1], &after.program_headers[0]);
        assert_eq!(new.p_type, PT_NOTE);
        assert_eq!(new.p_filesz, old.p_filesz);
        assert_eq!(new.p_vaddr, old.p_vaddr);
        assert_eq!(
            &output[new.file_range()],
            &input[old.file_range()],
            "note segment contents"
        );
        assert_eq!(new.p_offset % if is_64 { 8 } else { 4 }, 0);
    }

    #[test]
    fn extract_elf64_little_endian() {
        check_extracted(true, false);
    }

    #[test]
    fn extract_elf32_big_endian() {
        check_extracted(false, true);
    }

    #[test]
    fn extract_elf32_little_endian() {
        check_extracted(false, false);
    }

    #[test]
    fn sh_link_allow_list() {
        let input = ElfImage::new(true, false)
            .section(TestSection::new(".dynstr", SHT_STRTAB, b"\0a\0".to_vec()))
            .section(TestSection::new(".dynsym", SHT_DYNSYM, vec![0; 48]).entsize(24).link(1))
            .section(TestSection::new(".rela.dyn", SHT_RELA, vec![0; 24]).entsize(24).link(2))
            .build();
        let output = extract(&input, Options::default()).unwrap();
        let elf = Elf::parse(&output).unwrap();

        let by_name = |name: &str| {
            elf.section_headers
                .iter()
                .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
                .unwrap()
        };
        assert_eq!(by_name(".dynsym").sh_link, 1);
        assert_eq!(by_name(".rela.dyn").sh_link, 0);
        assert_eq!(by_name(".rela.dyn").sh_type, SHT_RELA);
    }

    #[test]
    fn compress_dwarf_sections() {
        let debug_info = vec![0x5a; 4096];
        for is_64 in [true, false] {
            let input = ElfImage::new(is_64, false)
                .section(TestSection::progbits(".debug_info", debug_info.clone()))
                .section(TestSection::progbits(".comment", b"GCC: 13".to_vec()))
                .build();
            let output = extract(&input, Options { compress_dwarf: true }).unwrap();
            let elf = Elf::parse(&output).unwrap();

            let info = &elf.section_headers[1];
            assert_ne!(info.sh_flags & SHF_COMPRESSED as u64, 0);
            assert!(info.sh_size < debug_info.len() as u64);

            let raw = section_bytes(&output, info);
            let (chdr_len, ch_type, ch_size) = if is_64 {
                let ch_size = u64::from_le_bytes(raw[8..16].try_into().unwrap());
                (24, u32::from_le_bytes(raw[..4].try_into().unwrap()), ch_size)
            } else {
                let ch_size = u32::from_le_bytes(raw[4..8].try_into().unwrap()) as u64;
                (12, u32::from_le_bytes(raw[..4].try_into().unwrap()), ch_size)
            };
            assert_eq!(ch_type, ELFCOMPRESS_ZLIB);
            assert_eq!(ch_size, debug_info.len() as u64);

            let mut decompressed = Vec::new();
            ZlibDecoder::new(&raw[chdr_len..])
                .read_to_end(&mut decompressed)
                .unwrap();
            assert_eq!(decompressed, debug_info);

            let comment = &elf.section_headers[2];
            assert_eq!(comment.sh_flags & SHF_COMPRESSED as u64, 0);
            assert_eq!(section_bytes(&output, comment), b"GCC: 13");
        }
    }

    #[test]
    fn missing_shstrtab_is_appended() {
        let input = ElfImage::new(true, false)
            .section(TestSection::random(".debug_info", 10))
            .without_shstrtab()
            .build();
        let output = extract(&input, Options::default()).unwrap();
        let elf = Elf::parse(&output).unwrap();

        assert_eq!(elf.section_headers.len(), 3);
        assert_eq!(elf.header.e_shstrndx, 2);
        assert_eq!(elf.shdr_strtab.get_at(elf.section_headers[2].sh_name), Some(".shstrtab"));
        assert_eq!(elf.shdr_strtab.get_at(elf.section_headers[1].sh_name), Some(""));
    }

    #[test]
    fn no_tables() {
        let input = ElfImage::new(true, false).without_shstrtab().build();
        let output = extract(&input, Options::default()).unwrap();
        let elf = Elf::parse(&output).unwrap();

        assert!(elf.program_headers.is_empty());
        assert!(elf.section_headers.is_empty());
        assert_eq!(elf.header.e_phoff, 0);
        assert_eq!(elf.header.e_shoff, 0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            extract(b"not an elf file at all", Options::default()),
            Err(ElfError::BadMagic)
        ));
        assert!(matches!(
            extract(b"\x7fELF", Options::default()),
            Err(ElfError::Truncated(_))
        ));

        let mut input = ElfImage::new(true, false).build();
        input[4] = 7;
        assert!(matches!(
            extract(&input, Options::default()),
            Err(ElfError::UnknownClass(7))
        ));
    }

    #[test]
    fn short_section_is_fatal() {
        let mut input = ElfImage::new(true, false)
            .section(TestSection::random(".debug_info", 64))
            .build();

        // Grow the section beyond the end of the file.
        let elf = Elf::parse(&input).unwrap();
        let shdr = elf.header.e_shoff as usize + 64;
        let size_field = shdr + 32;
        let size = input.len() as u64 * 2;
        input[size_field..size_field + 8].copy_from_slice(&size.to_le_bytes());

        match extract(&input, Options::default()) {
            Err(ElfError::SectionLength { name, expected, .. }) => {
                assert_eq!(name, ".debug_info");
                assert_eq!(expected, size);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn source_section_names() {
        let input = sample_image(true, false).build();
        let elf = SourceElf::read(&mut Cursor::new(&input)).unwrap();

        assert_eq!(elf.section_name(0), "");
        assert_eq!(elf.section_name(1), ".text");
        assert_eq!(elf.section_name(3), ".debug_info");
        assert_eq!(elf.section_name(elf.section_headers.len()), "");
    }

    #[test]
    fn dwarf_survives_text_does_not() {
        let input = ElfImage::new(true, false)
            .section(TestSection::random(".text", 64))
            .section(TestSection::random(".debug_info", 64))
            .build();
        let output = extract(&input, Options::default()).unwrap();
        let elf = Elf::parse(&output).unwrap();

        let text = &elf.section_headers[1];
        assert_eq!(elf.shdr_strtab.get_at(text.sh_name), Some(".text"));
        assert_eq!(text.sh_type, SHT_NOBITS);

        let info = &elf.section_headers[2];
        assert_eq!(elf.shdr_strtab.get_at(info.sh_name), Some(".debug_info"));
        assert_eq!(info.sh_type, SHT_PROGBITS);
        let before = Elf::parse(&input).unwrap();
        assert_eq!(
            section_bytes(&output, info),
            section_bytes(&input, &before.section_headers[2])
        );
    }

    #[test]
    fn oversized_extended_section_count() {
        let mut input = ElfImage::new(true, false)
            .section(TestSection::random(".debug_info", 16))
            .build();
        let shoff = Elf::parse(&input).unwrap().header.e_shoff as usize;

        // e_shnum = 0 defers the count to sh_size of section 0.
        input[60..62].copy_from_slice(&0u16.to_le_bytes());
        input[shoff + 32..shoff + 40].copy_from_slice(&(u64::MAX / 2).to_le_bytes());

        assert!(matches!(
            extract(&input, Options::default()),
            Err(ElfError::Malformed(_))
        ));
    }

    #[test]
    fn keep_predicate() {
        for (name, ty) in [
            (".debug_info", 1),
            (".zdebug_line", 1),
            ("__debug_str", 1),
            (".symtab", 1),
            (".anything", SHT_SYMTAB),
            (".anything", SHT_STRTAB),
            (".gopclntab", 1),
            (".go.buildinfo", 1),
            (".rela.plt", 1),
            (".plt", 1),
            (".foo", SHT_REL),
            (".comment", 1),
            (".note.ABI-tag", SHT_NOTE),
        ] {
            assert!(keep_section(name, ty), "{name}");
        }

        for name in [".text", ".data", ".rodata", ".bss", ".eh_frame", ".init"] {
            assert!(!keep_section(name, 1), "{name}");
        }
    }
}
