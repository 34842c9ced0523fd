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

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use goblin::elf::note::NT_GNU_BUILD_ID;
use goblin::elf::Elf;
use native_symbols::config::CacheOptions;
use native_symbols::elfwriter::{only_keep_debug, Options};
use native_symbols::executable::ExecutableMetadata;
use native_symbols::symbcache::SymbCache;
use native_symbols::symtab::DwarfTableFactory;
use native_symbols::FileId;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "native-symbols", about = "Debug info extraction and symbol lookup")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a copy of an ELF file that only keeps what symbolization needs
    Extract {
        src: PathBuf,
        dst: PathBuf,

        /// Compress DWARF sections with zlib
        #[arg(long)]
        compress_dwarf: bool,
    },

    /// Resolve addresses of an ELF file through the symbol table cache
    Lookup {
        elf: PathBuf,

        /// Addresses, decimal or `0x` prefixed hex
        #[arg(required = true, value_parser = parse_addr)]
        addrs: Vec<u64>,

        /// File ID of the executable. Derived from the GNU build ID if omitted.
        #[arg(long, value_name = "HEX")]
        file_id: Option<FileId>,

        /// Cache root directory
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },
}

fn parse_addr(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() -> Result<()> {
    native_symbols::log::install();

    match Args::parse().command {
        Command::Extract {
            src,
            dst,
            compress_dwarf,
        } => extract(&src, &dst, compress_dwarf),
        Command::Lookup {
            elf,
            addrs,
            file_id,
            cache_dir,
        } => lookup(&elf, &addrs, file_id, cache_dir),
    }
}

fn extract(src: &Path, dst: &Path, compress_dwarf: bool) -> Result<()> {
    let mut input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let output = File::create(dst).with_context(|| format!("create {}", dst.display()))?;

    only_keep_debug(BufWriter::new(output), &mut input, Options { compress_dwarf })
        .context("extract debug info")?;

    Ok(())
}

fn lookup(
    path: &Path,
    addrs: &[u64],
    file_id: Option<FileId>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let file_id = match file_id {
        Some(id) => id,
        None => build_id_file_id(path)?,
    };

    let mut opts = CacheOptions::default();
    if let Some(dir) = cache_dir {
        opts.path = dir;
    }

    let cache = SymbCache::new(Arc::new(DwarfTableFactory), &opts)?;
    cache.observe_executable(file_id, &ExecutableMetadata::from_path(file_id, path, 0))?;

    for &addr in addrs {
        let info = cache.resolve_address(file_id, addr)?;
        let func = info.function_name.as_deref().unwrap_or("??");
        let file = info.file_name.as_deref().unwrap_or("??");
        match info.line {
            Some(line) => println!("{addr:#x} {func} {file}:{line}"),
            None => println!("{addr:#x} {func} {file}"),
        }
    }

    cache.close();
    Ok(())
}

/// File ID from the first 16 bytes of the GNU build ID.
fn build_id_file_id(path: &Path) -> Result<FileId> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let elf = Elf::parse(&data)?;

    let build_id = elf
        .iter_note_headers(&data)
        .into_iter()
        .flatten()
        .filter_map(|note| note.ok())
        .find(|note| note.n_type == NT_GNU_BUILD_ID && note.name.trim_end_matches('\0') == "GNU")
        .map(|note| note.desc)
        .ok_or_else(|| anyhow!("no GNU build ID, pass --file-id"))?;

    let mut raw = [0u8; 16];
    let n = build_id.len().min(raw.len());
    raw[..n].copy_from_slice(&build_id[..n]);
    Ok(FileId::from(u128::from_be_bytes(raw)))
}
