// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Load-side linker.
//!
//! Owns one package's parsed summary, decompressed body and tables, plus
//! the handle arrays that map table indices to arena objects. Table parsing
//! is incremental (resumable by byte cursor) so the async loader can spread
//! it across ticks; import resolution is deferred through the
//! [`ObjectDirectory`](crate::loader::ObjectDirectory) and the context's
//! GUID cache, with placeholders adopted when the source package catches up.

use crate::archive::cursor::Reader;
use crate::archive::{load_tagged, ArchiveOptions, LoadStats, ReadLinker};
use crate::loader::context::LoadContext;
use crate::loader::TimeSlice;
use crate::name::Name;
use crate::object::arena::{ObjectArena, ObjectHandle};
use crate::object::instance::{ObjectFlags, ObjectInstance};
use crate::package::format::{ObjectExport, ObjectImport, PackageIndex, PackageSummary, SUMMARY_SIZE};
use crate::package::PackageError;
use flate2::read::ZlibDecoder;
use std::fmt;
use std::io::Read as _;
use std::sync::Arc;

/// One package's load-side linker.
pub struct LinkerLoad {
    package: Name,
    summary: PackageSummary,
    body: Vec<u8>,
    options: ArchiveOptions,
    names: Vec<Name>,
    imports: Vec<ObjectImport>,
    exports: Vec<ObjectExport>,
    import_handles: Vec<ObjectHandle>,
    export_handles: Vec<ObjectHandle>,
    table_cursor: usize,
    tables_done: bool,
}

impl LinkerLoad {
    /// Validate the summary and decompress the body. This is the only
    /// non-resumable step of linker creation; it does no table parsing.
    pub fn new(package: Name, bytes: &[u8]) -> Result<Self, PackageError> {
        let mut reader = Reader::new(bytes, ArchiveOptions::default());
        let summary = PackageSummary::parse(&mut reader)?;
        let mut options = *reader.options();
        options.version = summary.version;
        options.licensee_version = summary.licensee_version;

        let stored = &bytes[SUMMARY_SIZE.min(bytes.len())..];
        let body = if summary.is_compressed() {
            let mut decoder = ZlibDecoder::new(stored);
            let mut body = Vec::with_capacity(summary.uncompressed_size as usize);
            decoder
                .read_to_end(&mut body)
                .map_err(|err| PackageError::Decompress {
                    reason: err.to_string(),
                })?;
            body
        } else {
            stored.to_vec()
        };
        if body.len() != summary.uncompressed_size as usize {
            return Err(PackageError::Corrupt {
                reason: format!(
                    "body is {} bytes, summary claims {}",
                    body.len(),
                    summary.uncompressed_size
                ),
            });
        }
        let table_cursor = summary.name_offset as usize;
        Ok(Self {
            package,
            summary,
            body,
            options,
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            import_handles: Vec::new(),
            export_handles: Vec::new(),
            table_cursor,
            tables_done: false,
        })
    }

    /// Owning package name.
    #[must_use]
    pub fn package(&self) -> Name {
        self.package
    }

    /// Parsed summary header.
    #[must_use]
    pub fn summary(&self) -> &PackageSummary {
        &self.summary
    }

    /// True once every table is parsed.
    #[must_use]
    pub fn tables_done(&self) -> bool {
        self.tables_done
    }

    /// Name table (complete only after [`tick_tables`](Self::tick_tables)
    /// reports done).
    #[must_use]
    pub fn names(&self) -> &[Name] {
        &self.names
    }

    /// Import table entries.
    #[must_use]
    pub fn imports(&self) -> &[ObjectImport] {
        &self.imports
    }

    /// Export table entries.
    #[must_use]
    pub fn exports(&self) -> &[ObjectExport] {
        &self.exports
    }

    /// Arena handle for export `index` (null until created).
    #[must_use]
    pub fn export_handle(&self, index: usize) -> ObjectHandle {
        self.export_handles.get(index).copied().unwrap_or(ObjectHandle::NULL)
    }

    /// Arena handle for import `index` (null while deferred).
    #[must_use]
    pub fn import_handle(&self, index: usize) -> ObjectHandle {
        self.import_handles.get(index).copied().unwrap_or(ObjectHandle::NULL)
    }

    /// True when export `index` exists and its payload has been applied.
    #[must_use]
    pub fn is_export_loaded(&self, index: usize, arena: &ObjectArena) -> bool {
        let handle = self.export_handle(index);
        match arena.get(handle) {
            Some(object) => !object.read().flags.contains(ObjectFlags::NEED_LOAD),
            None => false,
        }
    }

    /// Resume table parsing; `Ok(true)` once all three tables are in.
    ///
    /// Idempotent across ticks: the byte cursor and the table lengths are
    /// the only progress state, so re-entry never redoes an entry.
    pub fn tick_tables(&mut self, slice: &mut TimeSlice) -> Result<bool, PackageError> {
        if self.tables_done {
            return Ok(true);
        }
        let mut reader = Reader::new(&self.body, self.options);
        reader.seek(self.table_cursor).map_err(|_| PackageError::Corrupt {
            reason: "table cursor beyond body".into(),
        })?;

        while self.names.len() < self.summary.name_count as usize {
            if slice.give_up() {
                self.table_cursor = reader.tell();
                return Ok(false);
            }
            let text = reader.read_string()?;
            self.names.push(Name::intern(&text));
        }
        if self.imports.is_empty() && self.summary.import_count > 0 && self.names.len() == self.summary.name_count as usize {
            reader.seek(self.summary.import_offset as usize)?;
        }
        while self.imports.len() < self.summary.import_count as usize {
            if slice.give_up() {
                self.table_cursor = reader.tell();
                return Ok(false);
            }
            self.imports.push(ObjectImport::deserialize(&mut reader, &self.names)?);
        }
        if self.exports.is_empty() && self.summary.export_count > 0 {
            reader.seek(self.summary.export_offset as usize)?;
        }
        while self.exports.len() < self.summary.export_count as usize {
            if slice.give_up() {
                self.table_cursor = reader.tell();
                return Ok(false);
            }
            self.exports.push(ObjectExport::deserialize(&mut reader, &self.names)?);
        }
        self.table_cursor = reader.tell();
        self.import_handles = vec![ObjectHandle::NULL; self.imports.len()];
        self.export_handles = vec![ObjectHandle::NULL; self.exports.len()];
        self.tables_done = true;
        log::debug!(
            "package '{}': tables linked ({} names, {} imports, {} exports)",
            self.package,
            self.names.len(),
            self.imports.len(),
            self.exports.len()
        );
        Ok(true)
    }

    /// Resolve import `index`, creating a provisional placeholder when the
    /// source package has not produced the object yet.
    ///
    /// Resolution order: directory by `(package, name)`, then the GUID
    /// cache (the object may have moved packages since save), then a
    /// placeholder. A placeholder needs the import's class to be
    /// registered; otherwise resolution stays deferred (retried at preload
    /// and again at the GUID-fixup phase).
    pub fn create_import(
        &mut self,
        index: usize,
        ctx: &LoadContext,
    ) -> Result<ObjectHandle, PackageError> {
        let import = self.imports[index];
        if let Some(existing) = ctx.directory.lookup(import.package, import.name) {
            self.import_handles[index] = existing;
            return Ok(existing);
        }
        if import.has_guid() {
            if let Some(found) = ctx.lookup_guid(&import.guid) {
                log::debug!(
                    "package '{}': import '{}.{}' resolved through its GUID",
                    self.package,
                    import.package,
                    import.name
                );
                self.import_handles[index] = found;
                return Ok(found);
            }
        }
        let Some(class) = ctx.registry.find(import.class_name) else {
            log::debug!(
                "package '{}': import '{}.{}' deferred (class '{}' unregistered)",
                self.package,
                import.package,
                import.name,
                import.class_name
            );
            return Ok(ObjectHandle::NULL);
        };
        class.link()?;
        let mut instance = ObjectInstance::new(import.name, import.package, &class, ObjectHandle::NULL)?;
        instance.flags.insert(ObjectFlags::NEED_LOAD | ObjectFlags::ASYNC_LOADING);
        let handle = ctx.arena.insert(instance);
        ctx.directory.register(import.package, import.name, handle);
        self.import_handles[index] = handle;
        Ok(handle)
    }

    /// Create the (still empty) instance for export `index`.
    ///
    /// If an importer already minted a placeholder for this object, the
    /// placeholder is adopted in place so every outstanding handle stays
    /// valid; otherwise a fresh instance goes into the arena.
    pub fn create_export(
        &mut self,
        index: usize,
        ctx: &LoadContext,
    ) -> Result<ObjectHandle, PackageError> {
        let export = self.exports[index];
        let class = ctx
            .registry
            .find(export.class_name)
            .ok_or(PackageError::UnknownClass {
                class: export.class_name,
            })?;
        class.link()?;
        let outer = self.resolve_index(export.outer, ctx);
        let mut instance = ObjectInstance::new(export.name, self.package, &class, outer)?;
        instance.flags = ObjectFlags::from_bits(export.object_flags)
            | ObjectFlags::NEED_LOAD
            | ObjectFlags::ASYNC_LOADING;
        instance.guid = export.guid;

        if let Some(existing) = ctx.directory.lookup(self.package, export.name) {
            if let Some(object) = ctx.arena.get(existing) {
                *object.write() = instance;
                self.export_handles[index] = existing;
                return Ok(existing);
            }
        }
        let handle = ctx.arena.insert(instance);
        ctx.directory.register(self.package, export.name, handle);
        self.export_handles[index] = handle;
        Ok(handle)
    }

    /// Deserialize export `index`'s tagged payload into its instance.
    pub fn preload_export(
        &mut self,
        index: usize,
        ctx: &LoadContext,
    ) -> Result<LoadStats, PackageError> {
        let export = self.exports[index];
        let handle = self.export_handles[index];
        let object = ctx.arena.get(handle).ok_or(PackageError::Corrupt {
            reason: format!("export '{}' destroyed mid-load", export.name),
        })?;
        let start = export.serial_offset as usize;
        let size = export.serial_size as usize;
        if start + size > self.body.len() {
            return Err(PackageError::Corrupt {
                reason: format!(
                    "export '{}' payload {}..{} beyond body of {}",
                    export.name,
                    start,
                    start + size,
                    self.body.len()
                ),
            });
        }
        let mut reader = Reader::new(&self.body[start..start + size], self.options);
        let mut view = ResolveView {
            package: self.package,
            names: &self.names,
            imports: &self.imports,
            export_handles: &self.export_handles,
            import_handles: &mut self.import_handles,
            ctx,
        };
        let mut object = object.write();
        let class = Arc::clone(&object.class);
        let stats = load_tagged(&mut reader, &mut view, &class, &mut object.contents)?;
        object.flags.remove(ObjectFlags::NEED_LOAD);
        object.flags.insert(ObjectFlags::NEED_POST_LOAD);
        Ok(stats)
    }

    /// Final import retry at the GUID-fixup phase: directory first, then
    /// the GUID cache. Returns how many imports remain unresolved (each
    /// surfaced as a load-time warning; the references in question stay
    /// null).
    pub fn finish_imports(&mut self, ctx: &LoadContext) -> usize {
        let mut unresolved = 0;
        for (index, handle) in self.import_handles.iter_mut().enumerate() {
            if !handle.is_null() {
                continue;
            }
            let import = self.imports[index];
            let found = ctx
                .directory
                .lookup(import.package, import.name)
                .or_else(|| import.has_guid().then(|| ctx.lookup_guid(&import.guid)).flatten());
            match found {
                Some(found) => *handle = found,
                None => {
                    unresolved += 1;
                    log::warn!(
                        "package '{}': import '{}.{}' unresolved after load; references stay null",
                        self.package,
                        import.package,
                        import.name
                    );
                }
            }
        }
        unresolved
    }

    fn resolve_index(&self, index: PackageIndex, ctx: &LoadContext) -> ObjectHandle {
        if let Some(i) = index.export_index() {
            return self.export_handle(i);
        }
        if let Some(i) = index.import_index() {
            let cached = self.import_handle(i);
            if !cached.is_null() {
                return cached;
            }
            if let Some(import) = self.imports.get(i) {
                return ctx
                    .directory
                    .lookup(import.package, import.name)
                    .unwrap_or(ObjectHandle::NULL);
            }
        }
        ObjectHandle::NULL
    }
}

impl fmt::Debug for LinkerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkerLoad")
            .field("package", &self.package)
            .field("names", &self.names.len())
            .field("imports", &self.imports.len())
            .field("exports", &self.exports.len())
            .field("tables_done", &self.tables_done)
            .finish_non_exhaustive()
    }
}

/// Borrowed [`ReadLinker`] view over one linker's tables, used while a
/// payload reader holds the body.
struct ResolveView<'a> {
    package: Name,
    names: &'a [Name],
    imports: &'a [ObjectImport],
    export_handles: &'a [ObjectHandle],
    import_handles: &'a mut [ObjectHandle],
    ctx: &'a LoadContext,
}

impl ReadLinker for ResolveView<'_> {
    fn name_at(&self, index: u32) -> Option<Name> {
        self.names.get(index as usize).copied()
    }

    fn object_at(&mut self, raw: i32) -> ObjectHandle {
        let index = PackageIndex::from_raw(raw);
        if let Some(i) = index.export_index() {
            return self.export_handles.get(i).copied().unwrap_or(ObjectHandle::NULL);
        }
        if let Some(i) = index.import_index() {
            let Some(cached) = self.import_handles.get(i).copied() else {
                return ObjectHandle::NULL;
            };
            if !cached.is_null() {
                return cached;
            }
            let Some(import) = self.imports.get(i) else {
                return ObjectHandle::NULL;
            };
            if let Some(found) = self.ctx.directory.lookup(import.package, import.name) {
                self.import_handles[i] = found;
                return found;
            }
            if import.has_guid() {
                if let Some(found) = self.ctx.lookup_guid(&import.guid) {
                    self.import_handles[i] = found;
                    return found;
                }
            }
            log::debug!(
                "package '{}': import '{}.{}' still unresolved at preload",
                self.package,
                import.package,
                import.name
            );
        }
        ObjectHandle::NULL
    }
}
