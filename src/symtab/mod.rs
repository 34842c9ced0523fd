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

//! On-disk address to symbol lookup tables.
//!
//! A table file starts with a 16 byte header (magic, version, reserved)
//! followed by an rkyv archive of [`SymTable`]. Tables are `mmap`ed and
//! queried in place without deserialization.

mod dwarf;
mod factory;

pub use dwarf::collect_ranges;
pub use factory::{DwarfTableFactory, TableFactory};

use crate::error::{Error, Result};
use anyhow::Context;
use indexmap::IndexSet;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::ops::Deref;
use std::path::Path;

/// Magic bytes at the start of every table file.
pub const MAGIC: [u8; 8] = *b"SYMTAB\0\0";

/// Current table format version.
pub const VERSION: u32 = 1;

/// Size of the file header preceding the archive.
pub const HEADER_LEN: usize = 16;

/// Result of an address lookup.
///
/// All fields are `None` if the address isn't covered by any function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub function_name: Option<String>,
    pub file_name: Option<String>,
    pub line: Option<u32>,
}

impl SourceInfo {
    pub fn is_empty(&self) -> bool {
        self.function_name.is_none() && self.file_name.is_none() && self.line.is_none()
    }
}

/// Open handle to a converted symbol table. Closed on drop.
pub trait SymbolTable: Send + Sync {
    fn lookup(&self, addr: u64) -> Result<SourceInfo>;
}

/// Reference into a [`SymTable`] string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(as = "StringRef")]
#[repr(transparent)]
pub struct StringRef(pub u32);

impl StringRef {
    /// Sentinel value for representing the absence of a string.
    pub const NONE: StringRef = StringRef(u32::MAX);
}

/// Function address ranges, sorted by start address.
#[derive(Debug, Default)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct SymTable {
    pub strings: Vec<String>,
    pub ranges: Vec<SymRange>,
}

#[derive(Debug, Clone)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive_attr(derive(Debug))]
pub struct SymRange {
    pub start: u64,
    pub end: u64,

    /// Maximum `end` of this and all preceding ranges.
    pub max_end: u64,

    pub func: StringRef,
    pub file: StringRef,

    /// Declaration line, 0 if unknown.
    pub line: u32,

    pub line_table: Vec<LineTableEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive_attr(derive(Debug, PartialEq, Eq))]
pub struct LineTableEntry {
    /// Offset from the start of the range.
    pub offset: u32,
    pub line: u32,
}

/// Function range as collected from debug info or symbol tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncRange {
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub line_table: Vec<LineTableEntry>,
}

impl SymTable {
    /// Builds a table from collected ranges.
    ///
    /// Empty ranges are skipped. Ranges with equal start addresses keep their
    /// relative order, and lookups prefer the one that came last.
    pub fn from_ranges(ranges: impl IntoIterator<Item = FuncRange>) -> Self {
        let mut strings = IndexSet::new();
        let mut intern = |s: Option<String>| match s {
            Some(s) => StringRef(strings.insert_full(s).0 as u32),
            None => StringRef::NONE,
        };

        let mut ranges: Vec<SymRange> = ranges
            .into_iter()
            .filter(|r| r.start < r.end)
            .map(|r| SymRange {
                start: r.start,
                end: r.end,
                max_end: r.end,
                func: intern(r.name),
                file: intern(r.file),
                line: r.line.unwrap_or(0),
                line_table: r.line_table,
            })
            .collect();

        ranges.sort_by_key(|r| r.start);

        let mut max_end = 0;
        for r in &mut ranges {
            max_end = max_end.max(r.end);
            r.max_end = max_end;
        }

        SymTable {
            strings: strings.into_iter().collect(),
            ranges,
        }
    }

    /// Writes the table in its on-disk format.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<W> {
        use rkyv::{
            ser::serializers::{AllocScratch, CompositeSerializer, WriteSerializer},
            ser::Serializer as _,
            Infallible,
        };

        w.write_all(&MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?;

        #[rustfmt::skip]
        type TableSerializer<W> = CompositeSerializer<
            WriteSerializer<W>,
            AllocScratch,
            Infallible
        >;

        // Positions are counted from the start of the file so that the archive
        // can be accessed through the mapping of the whole file.
        let ser = WriteSerializer::with_pos(w, HEADER_LEN);
        let mut serializer =
            TableSerializer::new(ser, AllocScratch::default(), Infallible::default());

        serializer
            .serialize_value(self)
            .context("failed to serialize symbol table")?;

        let mut w = serializer.into_serializer().into_inner();
        w.flush()?;
        Ok(w)
    }
}

impl ArchivedSymTable {
    fn str_by_ref(&self, idx: StringRef) -> Option<&str> {
        self.strings.get(idx.0 as usize).map(|x| x.as_str())
    }

    /// Innermost range containing `addr`.
    pub fn find(&self, addr: u64) -> Option<&ArchivedSymRange> {
        let ranges = &self.ranges[..];
        let idx = ranges.partition_point(|r| r.start <= addr);

        for r in ranges[..idx].iter().rev() {
            if r.max_end <= addr {
                break;
            }
            if addr < r.end {
                return Some(r);
            }
        }

        None
    }

    pub fn lookup(&self, addr: u64) -> SourceInfo {
        let Some(range) = self.find(addr) else {
            return SourceInfo::default();
        };

        SourceInfo {
            function_name: self.str_by_ref(range.func).map(str::to_owned),
            file_name: self.str_by_ref(range.file).map(str::to_owned),
            line: range.line_number_for(addr),
        }
    }
}

impl ArchivedSymRange {
    /// Line number for an address inside this range.
    ///
    /// Falls back to the declaration line if the line table has no match.
    pub fn line_number_for(&self, addr: u64) -> Option<u32> {
        let max_offs = addr.checked_sub(self.start)?;

        let mut line = None;
        for lte in self.line_table.iter() {
            if lte.offset as u64 > max_offs {
                break;
            }
            line = Some(lte.line);
        }

        line.filter(|&l| l != 0)
            .or((self.line != 0).then_some(self.line))
    }
}

/// [`SymTable`] that was stored to disk and is now `mmap`ed into the process.
pub struct MappedSymTable {
    table_ptr: *const ArchivedSymTable,
    _mapping: Mmap,
}

unsafe impl Sync for MappedSymTable {}
unsafe impl Send for MappedSymTable {}

impl MappedSymTable {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN + std::mem::size_of::<ArchivedSymTable>() {
            return Err(Error::BadTable(format!("file too small ({len} bytes)")));
        }

        let mapping = unsafe { Mmap::map(&file)? };
        if mapping[..8] != MAGIC {
            return Err(Error::BadTable("bad magic".into()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&mapping[8..12]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(Error::BadTable(format!("unsupported version {version}")));
        }

        let table = unsafe { rkyv::archived_root::<SymTable>(&mapping[..]) };
        let table_ptr: *const _ = table;

        Ok(MappedSymTable {
            table_ptr,
            _mapping: mapping,
        })
    }
}

impl Deref for MappedSymTable {
    type Target = ArchivedSymTable;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.table_ptr }
    }
}

impl SymbolTable for MappedSymTable {
    fn lookup(&self, addr: u64) -> Result<SourceInfo> {
        Ok(ArchivedSymTable::lookup(self, addr))
    }
}
