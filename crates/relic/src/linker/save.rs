// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Save-side linker: object graph to package file.
//!
//! Saving is two-pass. The first pass walks the reference graph from the
//! given roots and fixes the export table (handle to index mapping), so the
//! second pass can write payloads that reference exports not yet written —
//! cyclic graphs serialize as plain table indices, never by recursing into
//! the referenced object.

use crate::archive::{save_tagged, ArchiveOptions, WriteLinker, Writer};
use crate::config;
use crate::gc::trace_refs;
use crate::name::Name;
use crate::object::arena::{ObjectArena, ObjectHandle};
use crate::object::instance::ObjectFlags;
use crate::package::format::{ObjectExport, ObjectImport, PackageIndex, PackageSummary};
use crate::package::PackageError;
use crate::reflect::class::ClassFlags;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write as _;

/// Table builder and [`WriteLinker`] for one package save.
pub struct LinkerSave<'a> {
    arena: &'a ObjectArena,
    package: Name,
    names: Vec<Name>,
    name_lookup: HashMap<Name, u32>,
    exports: Vec<ObjectHandle>,
    export_lookup: HashMap<ObjectHandle, usize>,
    imports: Vec<ObjectImport>,
    import_lookup: HashMap<ObjectHandle, usize>,
}

impl<'a> LinkerSave<'a> {
    /// Empty tables for `package`. The name table is seeded with `None` at
    /// index 0 (the tagged-stream sentinel).
    #[must_use]
    pub fn new(arena: &'a ObjectArena, package: Name) -> Self {
        let mut linker = Self {
            arena,
            package,
            names: Vec::new(),
            name_lookup: HashMap::new(),
            exports: Vec::new(),
            export_lookup: HashMap::new(),
            imports: Vec::new(),
            import_lookup: HashMap::new(),
        };
        linker.map_name(Name::NONE);
        linker
    }

    /// Export handles in table order.
    #[must_use]
    pub fn exports(&self) -> &[ObjectHandle] {
        &self.exports
    }

    /// First pass: walk the reference graph from `roots`, collecting every
    /// reachable same-package, non-transient object as an export.
    ///
    /// Traversal follows reference tokens and outer chains; objects owned
    /// by other packages are left to become imports on demand during the
    /// payload pass.
    pub fn gather_exports(&mut self, roots: &[ObjectHandle]) -> Result<(), PackageError> {
        let mut visited: HashSet<ObjectHandle> = HashSet::new();
        let mut queue: VecDeque<ObjectHandle> = roots.iter().copied().collect();
        while let Some(handle) = queue.pop_front() {
            if handle.is_null() || !visited.insert(handle) {
                continue;
            }
            let Some(object) = self.arena.get(handle) else {
                log::warn!("package '{}': stale handle {} while gathering", self.package, handle);
                continue;
            };
            let object = object.read();
            if object.package != self.package {
                continue;
            }
            if object.flags.contains(ObjectFlags::TRANSIENT)
                || object.class.flags().contains(ClassFlags::TRANSIENT)
            {
                continue;
            }
            let index = self.exports.len();
            self.exports.push(handle);
            self.export_lookup.insert(handle, index);

            queue.push_back(object.outer);
            let stream = object.class.token_stream();
            trace_refs(&stream, &object.contents, &mut |referenced| {
                queue.push_back(referenced);
            });
        }
        Ok(())
    }

    fn package_index_of(&mut self, handle: ObjectHandle) -> PackageIndex {
        PackageIndex::from_raw(self.map_object(handle))
    }
}

impl WriteLinker for LinkerSave<'_> {
    fn map_name(&mut self, name: Name) -> u32 {
        if let Some(index) = self.name_lookup.get(&name) {
            return *index;
        }
        let index = self.names.len() as u32;
        self.names.push(name);
        self.name_lookup.insert(name, index);
        index
    }

    fn map_object(&mut self, handle: ObjectHandle) -> i32 {
        if handle.is_null() {
            return 0;
        }
        if let Some(index) = self.export_lookup.get(&handle) {
            return PackageIndex::from_export(*index).raw();
        }
        if let Some(index) = self.import_lookup.get(&handle) {
            return PackageIndex::from_import(*index).raw();
        }
        let Some(object) = self.arena.get(handle) else {
            log::warn!(
                "package '{}': reference to stale handle {} saved as null",
                self.package,
                handle
            );
            return 0;
        };
        let object = object.read();
        if object.package == self.package {
            // Reachable only through a path the gather pass filtered out
            // (e.g. via a transient owner); not part of this package file.
            log::warn!(
                "package '{}': reference to ungathered object '{}' saved as null",
                self.package,
                object.name
            );
            return 0;
        }
        let index = self.imports.len();
        self.imports.push(ObjectImport {
            package: object.package,
            name: object.name,
            class_name: object.class.name(),
            guid: object.guid,
        });
        self.import_lookup.insert(handle, index);
        PackageIndex::from_import(index).raw()
    }
}

/// Serialize the object graph reachable from `roots` into a package file.
///
/// `compress` stores the body deflated and sets [`config::PKG_COMPRESSED`].
pub fn save_package(
    arena: &ObjectArena,
    package: Name,
    roots: &[ObjectHandle],
    options: ArchiveOptions,
    compress: bool,
) -> Result<Vec<u8>, PackageError> {
    let mut linker = LinkerSave::new(arena, package);
    linker.gather_exports(roots)?;
    let export_handles = linker.exports.clone();

    // Payload pass: offsets recorded relative to the payload segment, then
    // rebased once the table sizes are known.
    let mut payload = Writer::new(options);
    let mut export_records: Vec<ObjectExport> = Vec::with_capacity(export_handles.len());
    for handle in &export_handles {
        let object = linker.arena.get(*handle).ok_or(PackageError::Corrupt {
            reason: format!("export handle {} destroyed during save", handle),
        })?;
        let object = object.read();
        let outer = linker.package_index_of(object.outer);
        let serial_offset = payload.tell() as u32;
        save_tagged(&mut payload, &mut linker, &object.class, &object.contents)?;
        export_records.push(ObjectExport {
            name: object.name,
            class_name: object.class.name(),
            outer,
            serial_offset,
            serial_size: payload.tell() as u32 - serial_offset,
            object_flags: object.flags.bits(),
            guid: object.guid,
        });
    }
    let payload = payload.into_bytes();

    // Intern every table name before emitting the name table, so the table
    // is closed under its own references.
    let imports = linker.imports.clone();
    for import in &imports {
        linker.map_name(import.package);
        linker.map_name(import.name);
        linker.map_name(import.class_name);
    }
    for record in &export_records {
        linker.map_name(record.name);
        linker.map_name(record.class_name);
    }

    let mut name_table = Writer::new(options);
    for name in linker.names.clone() {
        name_table.write_string(&name.as_str());
    }
    let name_table = name_table.into_bytes();

    let mut import_table = Writer::new(options);
    for import in &imports {
        import.serialize(&mut import_table, &mut linker);
    }
    let import_table = import_table.into_bytes();

    // Export entry size is offset-independent, so measure once and rebase.
    let mut scratch = Writer::new(options);
    for record in &export_records {
        record.serialize(&mut scratch, &mut linker);
    }
    let export_table_len = scratch.tell();
    let payload_base = (name_table.len() + import_table.len() + export_table_len) as u32;

    let mut export_table = Writer::new(options);
    for record in &mut export_records {
        record.serial_offset += payload_base;
        record.serialize(&mut export_table, &mut linker);
    }
    let export_table = export_table.into_bytes();
    debug_assert_eq!(export_table.len(), export_table_len);

    let mut body = Vec::with_capacity(payload_base as usize + payload.len());
    body.extend_from_slice(&name_table);
    body.extend_from_slice(&import_table);
    body.extend_from_slice(&export_table);
    body.extend_from_slice(&payload);

    let mut package_flags = 0;
    if options.filter_editor_only {
        package_flags |= config::PKG_FILTERED_EDITOR_ONLY;
    }
    if compress {
        package_flags |= config::PKG_COMPRESSED;
    }

    let summary = PackageSummary {
        version: options.version,
        licensee_version: options.licensee_version,
        package_flags,
        name_count: linker.names.len() as u32,
        name_offset: 0,
        import_count: imports.len() as u32,
        import_offset: name_table.len() as u32,
        export_count: export_records.len() as u32,
        export_offset: (name_table.len() + import_table.len()) as u32,
        uncompressed_size: body.len() as u32,
        guid: [0; 16],
    };

    let stored_body = if compress {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&body)
            .and_then(|()| encoder.finish())
            .map_err(|err| PackageError::Corrupt {
                reason: format!("body compression failed: {}", err),
            })?
    } else {
        body
    };

    let mut file = Writer::new(options);
    summary.serialize(&mut file);
    file.write_bytes(&stored_body);
    log::debug!(
        "package '{}' saved: {} exports, {} imports, {} names, {} bytes",
        package,
        summary.export_count,
        summary.import_count,
        summary.name_count,
        file.tell()
    );
    Ok(file.into_bytes())
}
