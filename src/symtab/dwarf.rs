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

//! Collects function ranges from DWARF and ELF symbol tables.

use super::{FuncRange, LineTableEntry};
use crate::elfwriter::ElfError;
use crate::error::Result;
use flate2::read::ZlibDecoder;
use gimli::{AttributeValue, Dwarf, EndianSlice, RunTimeEndian, SectionId, Unit};
use goblin::container::{Ctx, Endian};
use goblin::elf::compression_header::{CompressionHeader, ELFCOMPRESS_ZLIB};
use goblin::elf::section_header::{SHF_COMPRESSED, SHT_DYNSYM, SHT_NOBITS, SHT_SYMTAB};
use goblin::elf::sym::{Symtab, STT_FUNC};
use goblin::elf::Elf;
use goblin::strtab::Strtab;
use std::borrow::Cow;
use std::io::Read;

type Slice<'a> = EndianSlice<'a, RunTimeEndian>;

/// Maximum number of `DW_AT_abstract_origin`/`DW_AT_specification` hops
/// followed when looking for a function name.
const MAX_NAME_INDIRECTIONS: usize = 8;

/// Collects all function ranges of an ELF image.
///
/// Symbol table ranges come first, followed by DWARF ranges.
pub fn collect_ranges(data: &[u8]) -> Result<Vec<FuncRange>> {
    let elf = Elf::parse(data).map_err(ElfError::from)?;
    let ctx = Ctx::new(
        elf.header.container().map_err(ElfError::from)?,
        elf.header.endianness().map_err(ElfError::from)?,
    );

    let mut ranges = symbol_ranges(&elf, data, ctx)?;
    ranges.extend(dwarf_ranges(&elf, data, ctx)?);
    Ok(ranges)
}

/// `STT_FUNC` symbols with a non-zero size from `.symtab` and `.dynsym`.
fn symbol_ranges(elf: &Elf, data: &[u8], ctx: Ctx) -> Result<Vec<FuncRange>> {
    let mut ranges = Vec::new();

    for sh in &elf.section_headers {
        if !matches!(sh.sh_type, SHT_SYMTAB | SHT_DYNSYM) || sh.sh_entsize == 0 {
            continue;
        }

        let count = (sh.sh_size / sh.sh_entsize) as usize;
        let syms =
            Symtab::parse(data, sh.sh_offset as usize, count, ctx).map_err(ElfError::from)?;

        let strtab = match elf.section_headers.get(sh.sh_link as usize) {
            Some(link) if link.sh_type != SHT_NOBITS => {
                Strtab::parse(data, link.sh_offset as usize, link.sh_size as usize, 0)
                    .map_err(ElfError::from)?
            }
            _ => Strtab::default(),
        };

        for sym in syms.iter() {
            if sym.st_type() != STT_FUNC || sym.st_size == 0 {
                continue;
            }

            ranges.push(FuncRange {
                start: sym.st_value,
                end: sym.st_value.saturating_add(sym.st_size),
                name: strtab
                    .get_at(sym.st_name)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
                ..Default::default()
            });
        }
    }

    Ok(ranges)
}

fn dwarf_ranges(elf: &Elf, data: &[u8], ctx: Ctx) -> Result<Vec<FuncRange>> {
    let endian = match ctx.le {
        Endian::Little => RunTimeEndian::Little,
        Endian::Big => RunTimeEndian::Big,
    };

    let sections = Dwarf::load(|id: SectionId| {
        let section = load_section(elf, data, ctx, id.name()).unwrap_or(Cow::Borrowed(&[][..]));
        Ok::<_, gimli::Error>(section)
    })?;
    let dwarf = sections.borrow(|section| EndianSlice::new(section, endian));

    let mut ranges = Vec::new();
    let mut units = dwarf.units();
    while let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        let rows = line_rows(&unit)?;

        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            if entry.tag() != gimli::DW_TAG_subprogram {
                continue;
            }

            let mut die_ranges = dwarf.die_ranges(&unit, entry)?;
            let mut first = true;
            let mut name = None;
            let mut file = None;
            let mut line = None;

            while let Some(range) = die_ranges.next()? {
                if range.begin >= range.end {
                    continue;
                }

                if first {
                    name = function_name(&dwarf, &unit, entry, 0)?;
                    file = decl_file(&dwarf, &unit, entry)?;
                    line = entry
                        .attr_value(gimli::DW_AT_decl_line)?
                        .and_then(|v| v.udata_value())
                        .map(|l| l as u32)
                        .filter(|&l| l != 0);
                    first = false;
                }

                ranges.push(FuncRange {
                    start: range.begin,
                    end: range.end,
                    name: name.clone(),
                    file: file.clone(),
                    line,
                    line_table: line_table(&rows, range.begin, range.end),
                });
            }
        }
    }

    Ok(ranges)
}

/// Reads the data of a DWARF section, decompressing it if necessary.
///
/// Sections are looked up by their standard name; the GNU `.zdebug_` variant
/// is accepted as well.
fn load_section<'d>(elf: &Elf, data: &'d [u8], ctx: Ctx, name: &str) -> Option<Cow<'d, [u8]>> {
    for sh in &elf.section_headers {
        if sh.sh_type == SHT_NOBITS || sh.sh_offset == 0 {
            continue;
        }

        let Some(section_name) = elf.shdr_strtab.get_at(sh.sh_name) else {
            continue;
        };

        let (compressed, section_name) = match section_name.strip_prefix(".z") {
            Some(rest) => (true, rest),
            None => match section_name.strip_prefix('.') {
                Some(rest) => (sh.sh_flags & SHF_COMPRESSED as u64 != 0, rest),
                None => continue,
            },
        };
        if name.strip_prefix('.') != Some(section_name) {
            continue;
        }

        let start = sh.sh_offset as usize;
        let raw = data.get(start..start.checked_add(sh.sh_size as usize)?)?;
        if !compressed {
            return Some(Cow::Borrowed(raw));
        }

        return decompress_section(raw, ctx).map(Cow::Owned);
    }

    None
}

fn decompress_section(raw: &[u8], ctx: Ctx) -> Option<Vec<u8>> {
    let (size, compressed) = if raw.starts_with(b"ZLIB") {
        // GNU header: magic followed by the big endian decompressed size.
        if raw.len() < 12 {
            return None;
        }

        let mut size_bytes = [0; 8];
        size_bytes.copy_from_slice(&raw[4..12]);
        (u64::from_be_bytes(size_bytes), &raw[12..])
    } else {
        let chdr = CompressionHeader::parse(raw, 0, ctx).ok()?;
        if chdr.ch_type != ELFCOMPRESS_ZLIB {
            return None;
        }
        (chdr.ch_size, raw.get(CompressionHeader::size(ctx)..)?)
    };

    // `size` comes straight from the file.
    let hint = usize::try_from(size).unwrap_or(usize::MAX);
    let mut decompressed = Vec::with_capacity(hint.min(compressed.len().saturating_mul(4)));
    ZlibDecoder::new(compressed)
        .take(size.saturating_add(1))
        .read_to_end(&mut decompressed)
        .ok()?;

    (decompressed.len() as u64 == size).then_some(decompressed)
}

fn function_name(
    dwarf: &Dwarf<Slice>,
    unit: &Unit<Slice>,
    entry: &gimli::DebuggingInformationEntry<Slice>,
    depth: usize,
) -> Result<Option<String>> {
    for attr in [
        gimli::DW_AT_name,
        gimli::DW_AT_linkage_name,
        gimli::DW_AT_MIPS_linkage_name,
    ] {
        let Some(value) = entry.attr_value(attr)? else {
            continue;
        };
        if let Ok(name) = dwarf.attr_string(unit, value) {
            return Ok(Some(name.to_string_lossy().into_owned()));
        }
    }

    if depth >= MAX_NAME_INDIRECTIONS {
        return Ok(None);
    }

    for attr in [gimli::DW_AT_abstract_origin, gimli::DW_AT_specification] {
        if let Some(AttributeValue::UnitRef(offset)) = entry.attr_value(attr)? {
            let origin = unit.entry(offset)?;
            if let Some(name) = function_name(dwarf, unit, &origin, depth + 1)? {
                return Ok(Some(name));
            }
        }
    }

    Ok(None)
}

/// Declaration file of a function, falling back to the unit's name.
fn decl_file(
    dwarf: &Dwarf<Slice>,
    unit: &Unit<Slice>,
    entry: &gimli::DebuggingInformationEntry<Slice>,
) -> Result<Option<String>> {
    if let Some(AttributeValue::FileIndex(idx)) = entry.attr_value(gimli::DW_AT_decl_file)? {
        if let Some(path) = file_path(dwarf, unit, idx) {
            return Ok(Some(path));
        }
    }

    Ok(unit.name.map(|name| name.to_string_lossy().into_owned()))
}

fn file_path(dwarf: &Dwarf<Slice>, unit: &Unit<Slice>, idx: u64) -> Option<String> {
    let header = unit.line_program.as_ref()?.header();
    let file = header.file(idx)?;

    let name = dwarf.attr_string(unit, file.path_name()).ok()?;
    let name = name.to_string_lossy();

    let dir = file
        .directory(header)
        .and_then(|dir| dwarf.attr_string(unit, dir).ok())
        .map(|dir| dir.to_string_lossy().into_owned());

    Some(match dir {
        Some(dir) if !dir.is_empty() && !name.starts_with('/') => {
            format!("{}/{}", dir.trim_end_matches('/'), name)
        }
        _ => name.into_owned(),
    })
}

/// Sorted `(address, line)` rows of the unit's line program.
fn line_rows(unit: &Unit<Slice>) -> Result<Vec<(u64, u32)>> {
    let Some(program) = unit.line_program.clone() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let mut rows = program.rows();
    while let Some((_, row)) = rows.next_row()? {
        if row.end_sequence() {
            continue;
        }
        let line = row.line().map(|l| l.get() as u32).unwrap_or(0);
        out.push((row.address(), line));
    }

    out.sort_by_key(|&(addr, _)| addr);
    Ok(out)
}

/// Line table of the range `[start, end)`, relative to `start`.
fn line_table(rows: &[(u64, u32)], start: u64, end: u64) -> Vec<LineTableEntry> {
    let first = rows.partition_point(|&(addr, _)| addr < start);

    let mut table: Vec<LineTableEntry> = Vec::new();
    for &(addr, line) in rows[first..].iter().take_while(|&&(addr, _)| addr < end) {
        if table.last().is_some_and(|last| last.line == line) {
            continue;
        }
        table.push(LineTableEntry {
            offset: (addr - start) as u32,
            line,
        });
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elfwriter::{only_keep_debug, Options};
    use crate::testutil::{debug_elf, dwarf_sections, ElfImage, TestSection};
    use std::io::Cursor;

    fn main_range(ranges: &[FuncRange]) -> &FuncRange {
        ranges
            .iter()
            .find(|r| r.name.as_deref() == Some("main"))
            .expect("no range for main")
    }

    #[test]
    fn dwarf_subprogram() {
        let ranges = collect_ranges(&debug_elf()).unwrap();
        let main = main_range(&ranges);

        assert_eq!((main.start, main.end), (0x1000, 0x1100));
        assert_eq!(main.line, Some(42));
        assert!(main.file.as_deref().unwrap().ends_with("main.c"));
        assert_eq!(
            main.line_table,
            [
                LineTableEntry { offset: 0, line: 42 },
                LineTableEntry {
                    offset: 0x10,
                    line: 43
                },
            ]
        );
    }

    #[test]
    fn compressed_dwarf() {
        let mut compressed = Cursor::new(Vec::new());
        only_keep_debug(
            &mut compressed,
            &mut Cursor::new(debug_elf()),
            Options {
                compress_dwarf: true,
            },
        )
        .unwrap();

        let ranges = collect_ranges(compressed.get_ref()).unwrap();
        let main = main_range(&ranges);
        assert_eq!((main.start, main.end), (0x1000, 0x1100));
        assert_eq!(main.line, Some(42));
    }

    #[test]
    fn gnu_zdebug_sections() {
        let mut image = ElfImage::new(true, false);
        for (name, data) in dwarf_sections() {
            let mut encoded = b"ZLIB".to_vec();
            encoded.extend_from_slice(&(data.len() as u64).to_be_bytes());
            let mut enc =
                flate2::write::ZlibEncoder::new(encoded, flate2::Compression::default());
            std::io::Write::write_all(&mut enc, &data).unwrap();
            let zname = format!(".z{}", &name[1..]);
            image = image.section(TestSection::progbits(&zname, enc.finish().unwrap()));
        }

        let ranges = collect_ranges(&image.build()).unwrap();
        assert_eq!(main_range(&ranges).line, Some(42));
    }

    #[test]
    fn bogus_decompressed_sizes() {
        let payload = vec![0x11; 256];
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut enc, &payload).unwrap();
        let zlib = enc.finish().unwrap();

        let gnu = |size: u64| {
            let mut raw = b"ZLIB".to_vec();
            raw.extend_from_slice(&size.to_be_bytes());
            raw.extend_from_slice(&zlib);
            raw
        };
        // Elf64_Chdr: type, reserved, size, alignment.
        let elf64 = |size: u64| {
            let mut raw = ELFCOMPRESS_ZLIB.to_le_bytes().to_vec();
            raw.extend_from_slice(&[0; 4]);
            raw.extend_from_slice(&size.to_le_bytes());
            raw.extend_from_slice(&1u64.to_le_bytes());
            raw.extend_from_slice(&zlib);
            raw
        };
        let ctx = Ctx::new(goblin::container::Container::Big, Endian::Little);

        for size in [u64::MAX, 1 << 40, 1000, 10] {
            assert_eq!(decompress_section(&gnu(size), ctx), None, "{size}");
            assert_eq!(decompress_section(&elf64(size), ctx), None, "{size}");
        }
        assert_eq!(decompress_section(&gnu(256), ctx), Some(payload.clone()));
        assert_eq!(decompress_section(&elf64(256), ctx), Some(payload));

        // A debug file carrying such a section still parses.
        let data = ElfImage::new(true, false)
            .section(TestSection::progbits(".zdebug_info", gnu(u64::MAX)))
            .section(
                TestSection::progbits(".debug_abbrev", elf64(u64::MAX))
                    .flags(SHF_COMPRESSED as u64),
            )
            .build();
        assert!(collect_ranges(&data).unwrap().is_empty());
    }

    #[test]
    fn symbol_table_functions() {
        // Elf64_Sym: name, info, other, shndx, value, size.
        fn sym(name: u32, info: u8, value: u64, size: u64) -> Vec<u8> {
            let mut out = name.to_le_bytes().to_vec();
            out.extend_from_slice(&[info, 0]);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out
        }

        let strtab = b"\0func\0object\0nosize\0".to_vec();
        let mut symtab = vec![0u8; 24];
        symtab.extend(sym(1, 0x12, 0x2000, 0x40)); // GLOBAL FUNC
        symtab.extend(sym(6, 0x11, 0x3000, 0x40)); // GLOBAL OBJECT
        symtab.extend(sym(13, 0x12, 0x4000, 0)); // GLOBAL FUNC

        let data = ElfImage::new(true, false)
            .section(TestSection::new(".symtab", SHT_SYMTAB, symtab).entsize(24).link(2))
            .section(TestSection::new(".strtab", goblin::elf::section_header::SHT_STRTAB, strtab))
            .build();

        let ranges = collect_ranges(&data).unwrap();
        assert_eq!(
            ranges,
            [FuncRange {
                start: 0x2000,
                end: 0x2040,
                name: Some("func".into()),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn no_ranges() {
        let data = ElfImage::new(false, true)
            .section(TestSection::random(".text", 64))
            .build();
        assert!(collect_ranges(&data).unwrap().is_empty());
    }

    #[test]
    fn line_table_slicing() {
        let rows = [(0x10, 1), (0x20, 2), (0x24, 2), (0x30, 3), (0x40, 4)];
        assert_eq!(
            line_table(&rows, 0x20, 0x40),
            [
                LineTableEntry { offset: 0, line: 2 },
                LineTableEntry {
                    offset: 0x10,
                    line: 3
                },
            ]
        );
        assert!(line_table(&rows, 0x50, 0x60).is_empty());
    }
}
