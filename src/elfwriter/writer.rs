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

//! Sequential ELF writer with deferred field patching.
//!
//! Table offsets and counts are only known after the data they describe has
//! been written. The writer hands out typed [`Slot`]s for such fields, writes
//! zero placeholders and applies all recorded values in [`ElfWriter::finish`].

use super::ElfError;
use goblin::container::{Container, Endian};
use goblin::elf::{Header, ProgramHeader, SectionHeader};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Width of a patchable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    U16,
    U32,
    U64,
}

impl Width {
    fn name(self) -> &'static str {
        match self {
            Width::U16 => "u16",
            Width::U32 => "u32",
            Width::U64 => "u64",
        }
    }

    fn max(self) -> u64 {
        match self {
            Width::U16 => u16::MAX as u64,
            Width::U32 => u32::MAX as u64,
            Width::U64 => u64::MAX,
        }
    }
}

/// Placeholder for a field whose value is set later.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pos: u64,
    width: Width,
}

/// Placeholders of the file header fields that describe the tables.
#[derive(Debug, Clone, Copy)]
pub struct HeaderSlots {
    pub phoff: Slot,
    pub phnum: Slot,
    pub shoff: Slot,
    pub shnum: Slot,
    pub shstrndx: Slot,
}

pub struct ElfWriter<W> {
    dst: W,
    pos: u64,
    container: Container,
    endian: Endian,
    patches: Vec<(Slot, u64)>,
}

impl<W: Write + Seek> ElfWriter<W> {
    /// Creates a writer that starts writing at the current position of `dst`,
    /// which must be the start of the output.
    pub fn new(dst: W, container: Container, endian: Endian) -> Self {
        Self {
            dst,
            pos: 0,
            container,
            endian,
            patches: Vec::new(),
        }
    }

    /// Current output offset.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Size of an address or offset field in the output class.
    pub fn word_size(&self) -> u64 {
        match self.container {
            Container::Little => 4,
            Container::Big => 8,
        }
    }

    pub fn bytes(&mut self, data: &[u8]) -> Result<(), ElfError> {
        self.dst.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn u16(&mut self, v: u16) -> Result<(), ElfError> {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    pub fn u32(&mut self, v: u32) -> Result<(), ElfError> {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    pub fn u64(&mut self, v: u64) -> Result<(), ElfError> {
        match self.endian {
            Endian::Little => self.bytes(&v.to_le_bytes()),
            Endian::Big => self.bytes(&v.to_be_bytes()),
        }
    }

    /// Writes an address or offset sized field.
    pub fn word(&mut self, v: u64) -> Result<(), ElfError> {
        match self.container {
            Container::Little => self.u32(narrow(v, Width::U32)? as u32),
            Container::Big => self.u64(v),
        }
    }

    /// Pads with zeros up to the next multiple of `align`.
    pub fn align(&mut self, align: u64) -> Result<(), ElfError> {
        if align <= 1 {
            return Ok(());
        }

        let pad = (align - self.pos % align) % align;
        if pad > 0 {
            self.bytes(&vec![0u8; pad as usize])?;
        }
        Ok(())
    }

    /// Copies exactly `len` bytes from the current position of `src`.
    ///
    /// Returns the number of bytes copied; callers check it against `len`.
    pub fn copy_from<R: Read + ?Sized>(&mut self, src: &mut R, len: u64) -> Result<u64, ElfError> {
        let copied = io::copy(&mut src.take(len), &mut self.dst)?;
        self.pos += copied;
        Ok(copied)
    }

    fn reserve(&mut self, width: Width) -> Result<Slot, ElfError> {
        let slot = Slot {
            pos: self.pos,
            width,
        };
        match width {
            Width::U16 => self.u16(0)?,
            Width::U32 => self.u32(0)?,
            Width::U64 => self.u64(0)?,
        }
        Ok(slot)
    }

    fn reserve_word(&mut self) -> Result<Slot, ElfError> {
        match self.container {
            Container::Little => self.reserve(Width::U32),
            Container::Big => self.reserve(Width::U64),
        }
    }

    /// Records the final value of a slot.
    pub fn set(&mut self, slot: Slot, value: u64) -> Result<(), ElfError> {
        narrow(value, slot.width)?;
        self.patches.push((slot, value));
        Ok(())
    }

    /// Writes the file header, copying the identity fields from `src` and
    /// reserving the table fields.
    pub fn file_header(&mut self, src: &Header) -> Result<HeaderSlots, ElfError> {
        let ehsize = super::reader::header_size(self.container) as u16;

        self.bytes(&src.e_ident)?;
        self.u16(src.e_type)?;
        self.u16(src.e_machine)?;
        self.u32(src.e_version)?;
        self.word(src.e_entry)?;
        let phoff = self.reserve_word()?;
        let shoff = self.reserve_word()?;
        self.u32(src.e_flags)?;
        self.u16(ehsize)?;
        self.u16(super::reader::program_header_size(self.container) as u16)?;
        let phnum = self.reserve(Width::U16)?;
        self.u16(super::reader::section_header_size(self.container) as u16)?;
        let shnum = self.reserve(Width::U16)?;
        let shstrndx = self.reserve(Width::U16)?;

        Ok(HeaderSlots {
            phoff,
            phnum,
            shoff,
            shnum,
            shstrndx,
        })
    }

    pub fn program_header(&mut self, ph: &ProgramHeader) -> Result<(), ElfError> {
        match self.container {
            Container::Little => {
                self.u32(ph.p_type)?;
                self.word(ph.p_offset)?;
                self.word(ph.p_vaddr)?;
                self.word(ph.p_paddr)?;
                self.word(ph.p_filesz)?;
                self.word(ph.p_memsz)?;
                self.u32(ph.p_flags)?;
                self.word(ph.p_align)
            }
            Container::Big => {
                self.u32(ph.p_type)?;
                self.u32(ph.p_flags)?;
                self.word(ph.p_offset)?;
                self.word(ph.p_vaddr)?;
                self.word(ph.p_paddr)?;
                self.word(ph.p_filesz)?;
                self.word(ph.p_memsz)?;
                self.word(ph.p_align)
            }
        }
    }

    pub fn section_header(&mut self, sh: &SectionHeader) -> Result<(), ElfError> {
        self.u32(narrow(sh.sh_name as u64, Width::U32)? as u32)?;
        self.u32(sh.sh_type)?;
        self.word(sh.sh_flags)?;
        self.word(sh.sh_addr)?;
        self.word(sh.sh_offset)?;
        self.word(sh.sh_size)?;
        self.u32(sh.sh_link)?;
        self.u32(sh.sh_info)?;
        self.word(sh.sh_addralign)?;
        self.word(sh.sh_entsize)
    }

    /// Writes an `Elf32_Chdr` or `Elf64_Chdr`.
    pub fn compression_header(
        &mut self,
        ch_type: u32,
        size: u64,
        addralign: u64,
    ) -> Result<(), ElfError> {
        match self.container {
            Container::Little => {
                self.u32(ch_type)?;
                self.word(size)?;
                self.word(addralign)
            }
            Container::Big => {
                self.u32(ch_type)?;
                self.u32(0)?;
                self.u64(size)?;
                self.u64(addralign)
            }
        }
    }

    /// Applies all recorded slot values and returns the output.
    pub fn finish(mut self) -> Result<W, ElfError> {
        let end = self.pos;
        let patches = std::mem::take(&mut self.patches);

        for (slot, value) in patches {
            self.dst.seek(SeekFrom::Start(slot.pos))?;
            match slot.width {
                Width::U16 => self.u16(value as u16)?,
                Width::U32 => self.u32(value as u32)?,
                Width::U64 => self.u64(value)?,
            }
        }

        self.dst.seek(SeekFrom::Start(end))?;
        self.dst.flush()?;
        Ok(self.dst)
    }
}

fn narrow(value: u64, width: Width) -> Result<u64, ElfError> {
    if value > width.max() {
        return Err(ElfError::Overflow {
            value,
            width: width.name(),
        });
    }
    Ok(value)
}
