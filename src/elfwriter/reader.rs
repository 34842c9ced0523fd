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

//! Reads the header tables of an ELF file without loading its contents.

use super::ElfError;
use goblin::container::{Container, Endian};
use goblin::elf::header::{
    EI_CLASS, EI_DATA, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ELFMAG, SELFMAG,
    SIZEOF_IDENT,
};
use goblin::elf::section_header::SHN_XINDEX;
use goblin::elf::{Header, ProgramHeader, SectionHeader};
use goblin::strtab::Strtab;
use std::io::{self, Read, Seek, SeekFrom};

/// Header tables of the ELF file being rewritten.
pub struct SourceElf {
    pub header: Header,
    pub container: Container,
    pub endian: Endian,
    pub program_headers: Vec<ProgramHeader>,
    pub section_headers: Vec<SectionHeader>,

    /// Index of the section header string table, if there is one.
    pub shstrndx: Option<usize>,
    names: Vec<String>,
}

impl SourceElf {
    pub fn read<R: Read + Seek + ?Sized>(src: &mut R) -> Result<Self, ElfError> {
        src.seek(SeekFrom::Start(0))?;

        let mut ident = [0u8; SIZEOF_IDENT];
        read_exact(src, &mut ident, "file header")?;
        if &ident[..SELFMAG] != ELFMAG {
            return Err(ElfError::BadMagic);
        }

        let container = match ident[EI_CLASS] {
            ELFCLASS32 => Container::Little,
            ELFCLASS64 => Container::Big,
            class => return Err(ElfError::UnknownClass(class)),
        };
        let endian = match ident[EI_DATA] {
            ELFDATA2LSB => Endian::Little,
            ELFDATA2MSB => Endian::Big,
            data => return Err(ElfError::UnknownEncoding(data)),
        };

        let mut rest = vec![0u8; header_size(container) - SIZEOF_IDENT];
        read_exact(src, &mut rest, "file header")?;
        let header = parse_header(ident, &rest, container, endian);

        let mut elf = SourceElf {
            header,
            container,
            endian,
            program_headers: Vec::new(),
            section_headers: Vec::new(),
            shstrndx: None,
            names: Vec::new(),
        };
        elf.read_program_headers(src)?;
        elf.read_section_headers(src)?;
        elf.read_shstrtab(src)?;

        Ok(elf)
    }

    fn read_program_headers<R: Read + Seek + ?Sized>(
        &mut self,
        src: &mut R,
    ) -> Result<(), ElfError> {
        let (phoff, phnum) = (self.header.e_phoff, self.header.e_phnum as usize);
        if phoff == 0 || phnum == 0 {
            return Ok(());
        }

        let entsize = self.header.e_phentsize as usize;
        if entsize < program_header_size(self.container) {
            return Err(ElfError::Malformed(format!("e_phentsize {entsize} too small")));
        }

        let len = table_len(entsize, phnum, "program header table")?;
        let table = read_at(src, phoff, len, "program header table")?;
        self.program_headers = table
            .chunks_exact(entsize)
            .map(|raw| self.fields(raw).program_header())
            .collect();

        Ok(())
    }

    fn read_section_headers<R: Read + Seek + ?Sized>(
        &mut self,
        src: &mut R,
    ) -> Result<(), ElfError> {
        let shoff = self.header.e_shoff;
        if shoff == 0 {
            return Ok(());
        }

        let entsize = self.header.e_shentsize as usize;
        if entsize < section_header_size(self.container) {
            return Err(ElfError::Malformed(format!("e_shentsize {entsize} too small")));
        }

        // Extended section numbering: the real values live in section 0.
        let first = read_at(src, shoff, entsize as u64, "section header table")?;
        let null = self.fields(&first).section_header();
        let shnum = match self.header.e_shnum {
            0 => null.sh_size as usize,
            n => n as usize,
        };
        let shstrndx = if self.header.e_shstrndx as u64 == SHN_XINDEX as u64 {
            null.sh_link as usize
        } else {
            self.header.e_shstrndx as usize
        };

        let len = table_len(entsize, shnum, "section header table")?;
        let table = read_at(src, shoff, len, "section header table")?;
        self.section_headers = table
            .chunks_exact(entsize)
            .map(|raw| self.fields(raw).section_header())
            .collect();

        if shstrndx != 0 && shstrndx < self.section_headers.len() {
            self.shstrndx = Some(shstrndx);
        }

        Ok(())
    }

    fn read_shstrtab<R: Read + Seek + ?Sized>(
        &mut self,
        src: &mut R,
    ) -> Result<(), ElfError> {
        let Some(idx) = self.shstrndx else {
            return Ok(());
        };

        let sh = &self.section_headers[idx];
        let bytes = read_at(src, sh.sh_offset, sh.sh_size, "section header string table")?;
        let strtab = Strtab::new_preparsed(&bytes, 0x0)?;
        self.names = self
            .section_headers
            .iter()
            .map(|sh| strtab.get_at(sh.sh_name).unwrap_or("").to_owned())
            .collect();
        Ok(())
    }

    /// Name of the section at `idx`, or the empty string if it has none.
    pub fn section_name(&self, idx: usize) -> &str {
        self.names.get(idx).map_or("", String::as_str)
    }

    fn fields<'a>(&self, buf: &'a [u8]) -> Fields<'a> {
        Fields {
            buf,
            pos: 0,
            container: self.container,
            endian: self.endian,
        }
    }
}

/// Size of the ELF file header.
pub fn header_size(container: Container) -> usize {
    match container {
        Container::Little => 52,
        Container::Big => 64,
    }
}

pub fn program_header_size(container: Container) -> usize {
    match container {
        Container::Little => 32,
        Container::Big => 56,
    }
}

pub fn section_header_size(container: Container) -> usize {
    match container {
        Container::Little => 40,
        Container::Big => 64,
    }
}

fn parse_header(
    ident: [u8; SIZEOF_IDENT],
    rest: &[u8],
    container: Container,
    endian: Endian,
) -> Header {
    let mut f = Fields {
        buf: rest,
        pos: 0,
        container,
        endian,
    };

    Header {
        e_ident: ident,
        e_type: f.u16(),
        e_machine: f.u16(),
        e_version: f.u32(),
        e_entry: f.word(),
        e_phoff: f.word(),
        e_shoff: f.word(),
        e_flags: f.u32(),
        e_ehsize: f.u16(),
        e_phentsize: f.u16(),
        e_phnum: f.u16(),
        e_shentsize: f.u16(),
        e_shnum: f.u16(),
        e_shstrndx: f.u16(),
    }
}

/// Sequential decoder for fixed-size header records.
///
/// Callers guarantee that `buf` is large enough for the record being decoded.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    container: Container,
    endian: Endian,
}

impl Fields<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u16(&mut self) -> u16 {
        let b = self.take::<2>();
        match self.endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    fn u32(&mut self) -> u32 {
        let b = self.take::<4>();
        match self.endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    fn u64(&mut self) -> u64 {
        let b = self.take::<8>();
        match self.endian {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        }
    }

    /// Address or offset sized field.
    fn word(&mut self) -> u64 {
        match self.container {
            Container::Little => self.u32() as u64,
            Container::Big => self.u64(),
        }
    }

    fn program_header(&mut self) -> ProgramHeader {
        match self.container {
            Container::Little => {
                let p_type = self.u32();
                let p_offset = self.word();
                let p_vaddr = self.word();
                let p_paddr = self.word();
                let p_filesz = self.word();
                let p_memsz = self.word();
                let p_flags = self.u32();
                let p_align = self.word();
                ProgramHeader {
                    p_type,
                    p_flags,
                    p_offset,
                    p_vaddr,
                    p_paddr,
                    p_filesz,
                    p_memsz,
                    p_align,
                }
            }
            Container::Big => ProgramHeader {
                p_type: self.u32(),
                p_flags: self.u32(),
                p_offset: self.word(),
                p_vaddr: self.word(),
                p_paddr: self.word(),
                p_filesz: self.word(),
                p_memsz: self.word(),
                p_align: self.word(),
            },
        }
    }

    fn section_header(&mut self) -> SectionHeader {
        SectionHeader {
            sh_name: self.u32() as usize,
            sh_type: self.u32(),
            sh_flags: self.word(),
            sh_addr: self.word(),
            sh_offset: self.word(),
            sh_size: self.word(),
            sh_link: self.u32(),
            sh_info: self.u32(),
            sh_addralign: self.word(),
            sh_entsize: self.word(),
        }
    }
}

fn read_exact<R: Read + ?Sized>(
    src: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), ElfError> {
    src.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ElfError::Truncated(what),
        _ => e.into(),
    })
}

/// Byte length of a header table, rejecting counts no file could hold.
fn table_len(entsize: usize, count: usize, what: &'static str) -> Result<u64, ElfError> {
    entsize
        .checked_mul(count)
        .and_then(|len| u64::try_from(len).ok())
        .ok_or_else(|| ElfError::Malformed(format!("{what} with {count} entries")))
}

/// Reads `len` bytes at `offset`, failing if the file ends early.
pub fn read_at<R: Read + Seek + ?Sized>(
    src: &mut R,
    offset: u64,
    len: u64,
    what: &'static str,
) -> Result<Vec<u8>, ElfError> {
    src.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    src.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(ElfError::Truncated(what));
    }
    Ok(buf)
}
