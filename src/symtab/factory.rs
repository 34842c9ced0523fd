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

use super::{collect_ranges, MappedSymTable, SymTable, SymbolTable};
use crate::elfwriter::{only_keep_debug, Options};
use crate::error::{Error, Result};
use crate::executable::ExecutableFile;
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;

/// Converts executables into symbol tables and opens converted tables.
pub trait TableFactory: Send + Sync + 'static {
    /// Converts the executable in `src` and writes the table into `dst`.
    fn convert_table(&self, src: &mut dyn ExecutableFile, dst: &mut File) -> Result<()>;

    /// Opens a table previously written by [`TableFactory::convert_table`].
    fn open_table(&self, path: &Path) -> Result<Box<dyn SymbolTable>>;

    /// Name of the table format. Tables of different factories are cached in
    /// separate directories.
    fn name(&self) -> &str;
}

/// Builds tables from DWARF debug info and ELF symbol tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct DwarfTableFactory;

impl DwarfTableFactory {
    pub const NAME: &'static str = "symtab-v1";
}

impl TableFactory for DwarfTableFactory {
    fn convert_table(&self, src: &mut dyn ExecutableFile, dst: &mut File) -> Result<()> {
        // Strip everything we don't need first: what remains is typically
        // small enough to be parsed from memory.
        let mut debug = Cursor::new(Vec::new());
        only_keep_debug(&mut debug, src, Options::default())?;

        let ranges = collect_ranges(debug.get_ref())?;
        if ranges.is_empty() {
            return Err(Error::NoSymbols);
        }

        SymTable::from_ranges(ranges).write_to(BufWriter::new(dst))?;
        Ok(())
    }

    fn open_table(&self, path: &Path) -> Result<Box<dyn SymbolTable>> {
        Ok(Box::new(MappedSymTable::open(path)?))
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{debug_elf, ElfImage, TestSection};

    #[test]
    fn convert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table");
        let factory = DwarfTableFactory;

        let mut dst = File::create(&path).unwrap();
        factory
            .convert_table(&mut Cursor::new(debug_elf()), &mut dst)
            .unwrap();
        drop(dst);

        let table = factory.open_table(&path).unwrap();
        let info = table.lookup(0x1010).unwrap();
        assert_eq!(info.function_name.as_deref(), Some("main"));
        assert_eq!(info.line, Some(43));
        assert!(info.file_name.unwrap().ends_with("main.c"));

        assert_eq!(table.lookup(0x1000).unwrap().line, Some(42));
        assert!(table.lookup(0x2000).unwrap().is_empty());
    }

    #[test]
    fn no_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let mut dst = File::create(dir.path().join("table")).unwrap();

        let data = ElfImage::new(true, false)
            .section(TestSection::random(".text", 128))
            .build();
        let res = DwarfTableFactory.convert_table(&mut Cursor::new(data), &mut dst);
        assert!(matches!(res, Err(Error::NoSymbols)));
    }

    #[test]
    fn not_an_elf_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut dst = File::create(dir.path().join("table")).unwrap();

        let res = DwarfTableFactory.convert_table(
            &mut Cursor::new(b"#!/bin/sh\necho hello\n".to_vec()),
            &mut dst,
        );
        assert!(matches!(res, Err(Error::Elf(_))));
    }
}
