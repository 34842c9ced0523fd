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

//! Synthetic ELF images for tests.

use crate::elfwriter::ElfWriter;
use gimli::write::{
    Address, AttributeValue, DwarfUnit, EndianVec, LineProgram, LineString, Sections,
};
use gimli::{Encoding, Format, LittleEndian};
use goblin::container::{Container, Endian};
use goblin::elf::header::{
    EI_CLASS, EI_DATA, EI_OSABI, EI_VERSION, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB,
    ELFMAG, EM_PPC, EM_X86_64, ET_EXEC,
};
use goblin::elf::program_header::{PF_R, PF_X, PT_LOAD, PT_NOTE};
use goblin::elf::section_header::{SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB};
use goblin::elf::{Header, ProgramHeader, SectionHeader};
use std::io::Cursor;

pub fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}

#[derive(Debug, Clone)]
pub struct TestSection {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub link: u32,
    pub entsize: u64,
    pub data: Vec<u8>,
}

impl TestSection {
    pub fn new(name: &str, sh_type: u32, data: Vec<u8>) -> Self {
        Self {
            name: name.to_owned(),
            sh_type,
            flags: 0,
            addr: 0,
            link: 0,
            entsize: 0,
            data,
        }
    }

    pub fn progbits(name: &str, data: Vec<u8>) -> Self {
        Self::new(name, SHT_PROGBITS, data)
    }

    pub fn random(name: &str, len: usize) -> Self {
        Self::progbits(name, random_bytes(len))
    }

    pub fn link(mut self, idx: u32) -> Self {
        self.link = idx;
        self
    }

    pub fn entsize(mut self, entsize: u64) -> Self {
        self.entsize = entsize;
        self
    }

    pub fn flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    pub fn addr(mut self, addr: u64) -> Self {
        self.addr = addr;
        self
    }
}

/// Builder for small but well-formed ELF files.
///
/// User sections start at index 1. Unless disabled, a `.shstrtab` section is
/// appended after them.
#[derive(Debug, Clone)]
pub struct ElfImage {
    pub is_64: bool,
    pub big_endian: bool,
    pub sections: Vec<TestSection>,
    pub notes: Vec<Vec<u8>>,
    pub shstrtab: bool,
}

impl ElfImage {
    pub fn new(is_64: bool, big_endian: bool) -> Self {
        Self {
            is_64,
            big_endian,
            sections: Vec::new(),
            notes: Vec::new(),
            shstrtab: true,
        }
    }

    pub fn section(mut self, section: TestSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn note_segment(mut self, data: Vec<u8>) -> Self {
        self.notes.push(data);
        self
    }

    pub fn without_shstrtab(mut self) -> Self {
        self.shstrtab = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let container = if self.is_64 {
            Container::Big
        } else {
            Container::Little
        };
        let endian = if self.big_endian {
            Endian::Big
        } else {
            Endian::Little
        };

        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(ELFMAG);
        ident[EI_CLASS] = if self.is_64 { ELFCLASS64 } else { ELFCLASS32 };
        ident[EI_DATA] = if self.big_endian { ELFDATA2MSB } else { ELFDATA2LSB };
        ident[EI_VERSION] = 1;
        ident[EI_OSABI] = 3;

        let header = Header {
            e_ident: ident,
            e_type: ET_EXEC,
            e_machine: if self.big_endian { EM_PPC } else { EM_X86_64 },
            e_version: 1,
            e_entry: 0x401000,
            e_phoff: 0,
            e_shoff: 0,
            e_flags: 0x5,
            e_ehsize: 0,
            e_phentsize: 0,
            e_phnum: 0,
            e_shentsize: 0,
            e_shnum: 0,
            e_shstrndx: 0,
        };

        let mut w = ElfWriter::new(Cursor::new(Vec::new()), container, endian);
        let slots = w.file_header(&header).unwrap();

        let mut phdrs = vec![ProgramHeader {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0,
            p_vaddr: 0x400000,
            p_paddr: 0x400000,
            p_filesz: 0,
            p_memsz: 0x1000,
            p_align: 0x1000,
        }];
        for note in &self.notes {
            w.align(4).unwrap();
            let offset = w.pos();
            w.bytes(note).unwrap();
            phdrs.push(ProgramHeader {
                p_type: PT_NOTE,
                p_flags: PF_R,
                p_offset: offset,
                p_vaddr: 0x400000 + offset,
                p_paddr: 0x400000 + offset,
                p_filesz: note.len() as u64,
                p_memsz: note.len() as u64,
                p_align: 4,
            });
        }

        w.align(8).unwrap();
        let phoff = w.pos();
        w.set(slots.phoff, phoff).unwrap();
        w.set(slots.phnum, phdrs.len() as u64).unwrap();
        for ph in &phdrs {
            w.program_header(ph).unwrap();
        }

        let mut names = vec![0u8];
        let mut add_name = |name: &str| {
            let offset = names.len();
            names.extend_from_slice(name.as_bytes());
            names.push(0);
            offset
        };
        let mut name_offsets: Vec<usize> =
            self.sections.iter().map(|s| add_name(&s.name)).collect();
        let shstrtab_name = add_name(".shstrtab");

        let mut headers = vec![null_header()];
        for (s, sh_name) in self.sections.iter().zip(name_offsets.drain(..)) {
            w.align(8).unwrap();
            let offset = w.pos();
            if s.sh_type != SHT_NOBITS {
                w.bytes(&s.data).unwrap();
            }
            headers.push(SectionHeader {
                sh_name,
                sh_type: s.sh_type,
                sh_flags: s.flags,
                sh_addr: s.addr,
                sh_offset: offset,
                sh_size: s.data.len() as u64,
                sh_link: s.link,
                sh_info: 0,
                sh_addralign: 1,
                sh_entsize: s.entsize,
            });
        }

        if self.shstrtab {
            let offset = w.pos();
            w.bytes(&names).unwrap();
            headers.push(SectionHeader {
                sh_name: shstrtab_name,
                sh_type: SHT_STRTAB,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: offset,
                sh_size: names.len() as u64,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 1,
                sh_entsize: 0,
            });
            w.set(slots.shstrndx, headers.len() as u64 - 1).unwrap();
        }

        if headers.len() > 1 {
            w.align(8).unwrap();
            let shoff = w.pos();
            w.set(slots.shoff, shoff).unwrap();
            w.set(slots.shnum, headers.len() as u64).unwrap();
            for sh in &headers {
                w.section_header(sh).unwrap();
            }
        }

        w.finish().unwrap().into_inner()
    }
}

fn null_header() -> SectionHeader {
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

/// DWARF sections describing a single function `main` in `main.c`.
///
/// `main` covers `[0x1000, 0x1100)`, is declared on line 42 and has line
/// table rows at its entry (line 42) and at `0x1010` (line 43).
pub fn dwarf_sections() -> Vec<(&'static str, Vec<u8>)> {
    let encoding = Encoding {
        format: Format::Dwarf32,
        version: 4,
        address_size: 8,
    };
    let mut dwarf = DwarfUnit::new(encoding);

    let comp_dir = LineString::String(b"/src".to_vec());
    let comp_file = LineString::String(b"main.c".to_vec());
    let mut program = LineProgram::new(
        encoding,
        Default::default(),
        comp_dir,
        comp_file,
        None,
    );
    let dir = program.default_directory();
    let file = program.add_file(LineString::String(b"main.c".to_vec()), dir, None);

    program.begin_sequence(Some(Address::Constant(0x1000)));
    program.row().file = file;
    program.row().line = 42;
    program.generate_row();
    program.row().address_offset = 0x10;
    program.row().line = 43;
    program.generate_row();
    program.end_sequence(0x100);
    dwarf.unit.line_program = program;

    let root = dwarf.unit.root();
    let cu = dwarf.unit.get_mut(root);
    cu.set(
        gimli::DW_AT_name,
        AttributeValue::String(b"main.c".to_vec()),
    );
    cu.set(gimli::DW_AT_low_pc, AttributeValue::Address(Address::Constant(0)));
    cu.set(gimli::DW_AT_stmt_list, AttributeValue::LineProgramRef);

    let main = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
    let main = dwarf.unit.get_mut(main);
    main.set(gimli::DW_AT_name, AttributeValue::String(b"main".to_vec()));
    main.set(
        gimli::DW_AT_low_pc,
        AttributeValue::Address(Address::Constant(0x1000)),
    );
    main.set(gimli::DW_AT_high_pc, AttributeValue::Udata(0x100));
    main.set(gimli::DW_AT_decl_file, AttributeValue::FileIndex(Some(file)));
    main.set(gimli::DW_AT_decl_line, AttributeValue::Udata(42));

    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    dwarf.write(&mut sections).unwrap();

    let mut out = Vec::new();
    sections
        .for_each(|id, data| {
            if !data.slice().is_empty() {
                out.push((id.name(), data.slice().to_vec()));
            }
            Ok::<(), gimli::write::Error>(())
        })
        .unwrap();
    out
}

/// 64-bit little endian executable with the sections of [`dwarf_sections`]
/// followed by ten sections of random contents.
pub fn debug_elf() -> Vec<u8> {
    let mut image = ElfImage::new(true, false)
        .section(TestSection::random(".text", 0x100).addr(0x1000));
    for (name, data) in dwarf_sections() {
        image = image.section(TestSection::progbits(name, data));
    }
    for i in 0..10 {
        image = image.section(TestSection::random(&format!(".random{i}"), 64 + i * 13));
    }
    image.build()
}
