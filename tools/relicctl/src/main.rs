// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! relicctl: package file inspector.
//!
//! Dumps the summary, name table, import table and export table of a
//! package file, the same way the loader sees them.

use relic::linker::LinkerLoad;
use relic::loader::TimeSlice;
use relic::Name;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("usage: relicctl <package-file> [--names] [--imports] [--exports]");
        eprintln!();
        eprintln!("With no table flag, every section is printed.");
        std::process::exit(2);
    }
    let path = &args[1];
    let flags: Vec<&str> = args[2..].iter().map(String::as_str).collect();
    let all = flags.is_empty();
    let want = |flag: &str| all || flags.contains(&flag);

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("[FAIL] cannot read '{}': {}", path, e);
            std::process::exit(1);
        }
    };

    let package = package_name(path);
    let mut linker = match LinkerLoad::new(package, &bytes) {
        Ok(linker) => linker,
        Err(e) => {
            eprintln!("[FAIL] '{}' is not a readable package: {}", path, e);
            std::process::exit(1);
        }
    };
    let mut slice = TimeSlice::unlimited();
    if let Err(e) = linker.tick_tables(&mut slice) {
        eprintln!("[FAIL] table parse error: {}", e);
        std::process::exit(1);
    }

    let summary = linker.summary();
    println!("Package: {} ({} bytes on disk)", package, bytes.len());
    println!(
        "Version: {}.{}  flags: {:#06x}  compressed: {}",
        summary.version,
        summary.licensee_version,
        summary.package_flags,
        summary.is_compressed()
    );
    println!(
        "Tables:  {} names, {} imports, {} exports  body: {} bytes",
        summary.name_count, summary.import_count, summary.export_count, summary.uncompressed_size
    );
    println!("---");

    if want("--names") {
        println!();
        println!("Name table:");
        for (i, name) in linker.names().iter().enumerate() {
            println!("  [{:4}] {}", i, name);
        }
    }

    if want("--imports") {
        println!();
        println!("Import table:");
        for (i, import) in linker.imports().iter().enumerate() {
            println!(
                "  [{:4}] {}.{} (class {})",
                i, import.package, import.name, import.class_name
            );
        }
    }

    if want("--exports") {
        println!();
        println!("Export table:");
        for (i, export) in linker.exports().iter().enumerate() {
            println!(
                "  [{:4}] {:24} class {:16} outer {:>5}  {} bytes at {:#x}  flags {:#06x}",
                i,
                export.name.to_string(),
                export.class_name.to_string(),
                export.outer.raw(),
                export.serial_size,
                export.serial_offset,
                export.object_flags
            );
        }
    }
}

/// Package name from the file path: stem without extension.
fn package_name(path: &str) -> Name {
    let stem = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Name::intern(&stem)
}
