// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-package incremental load state machine.
//!
//! Each in-flight package walks a fixed phase sequence, doing bounded work
//! per [`TimeSlice`] and saving its cursors between ticks. Phases only ever
//! advance; a failed package tears its objects down and reports through its
//! callbacks exactly once.

use crate::linker::LinkerLoad;
use crate::loader::context::LoadContext;
use crate::loader::{LoadError, TimeSlice};
use crate::name::Name;
use crate::object::instance::ObjectFlags;

/// Load phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    /// Waiting for bytes, then parsing the summary.
    CreateLinker,
    /// Incremental name/import/export table parsing.
    FinishLinker,
    /// Resolving imports (placeholders for packages still in flight).
    CreateImports,
    /// Creating empty export instances, adopting placeholders.
    CreateExports,
    /// Deserializing export payloads.
    PreloadObjects,
    /// Final import retry plus export GUID registration.
    FinishExportGuids,
    /// Draining the post-load queue.
    PostLoad,
    /// Clearing async flags and firing callbacks.
    FinishObjects,
    /// Terminal (success or failure).
    Done,
}

/// What one tick of a package produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// More work remains.
    Continuing,
    /// The package finished loading this tick (or earlier).
    Done,
    /// The package failed; its objects were torn down.
    Failed,
}

type LoadCallback = Box<dyn FnOnce(Result<(), LoadError>) + Send>;

/// One in-flight package load.
pub struct AsyncPackage {
    package: Name,
    priority: i32,
    state: LoadState,
    linker: Option<LinkerLoad>,
    bytes: Option<Vec<u8>>,
    io_id: Option<u64>,
    import_index: usize,
    export_index: usize,
    preload_index: usize,
    requested_imports: Vec<Name>,
    callbacks: Vec<LoadCallback>,
    error: Option<LoadError>,
}

impl AsyncPackage {
    /// Fresh load for `package`.
    #[must_use]
    pub fn new(package: Name, priority: i32) -> Self {
        Self {
            package,
            priority,
            state: LoadState::CreateLinker,
            linker: None,
            bytes: None,
            io_id: None,
            import_index: 0,
            export_index: 0,
            preload_index: 0,
            requested_imports: Vec::new(),
            callbacks: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn package(&self) -> Name {
        self.package
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// The failure, once the package is done unsuccessfully.
    #[must_use]
    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    /// Register a completion callback (fires exactly once, even when added
    /// to an already in-flight load).
    pub fn add_callback(&mut self, callback: LoadCallback) {
        self.callbacks.push(callback);
    }

    /// Record the outstanding I/O request servicing this load.
    pub fn set_io_id(&mut self, id: u64) {
        self.io_id = Some(id);
    }

    /// Outstanding I/O request, if any.
    #[must_use]
    pub fn io_id(&self) -> Option<u64> {
        self.io_id
    }

    /// Hand the package its raw bytes (or the read failure).
    pub fn deliver_io(&mut self, ctx: &LoadContext, result: Result<Vec<u8>, String>) {
        self.io_id = None;
        match result {
            Ok(bytes) => self.bytes = Some(bytes),
            Err(reason) => self.fail(
                ctx,
                LoadError::Io {
                    package: self.package,
                    reason,
                },
            ),
        }
    }

    /// Import source packages discovered by table parsing, for the
    /// scheduler to spin up. Drains the pending list.
    pub fn take_import_requests(&mut self) -> Vec<Name> {
        std::mem::take(&mut self.requested_imports)
    }

    /// Abort the load, tearing down whatever was created.
    pub fn cancel(&mut self, ctx: &LoadContext) {
        if self.state != LoadState::Done {
            self.fail(
                ctx,
                LoadError::Cancelled {
                    package: self.package,
                },
            );
        }
    }

    /// Advance as far as the slice allows.
    pub fn tick(&mut self, ctx: &LoadContext, slice: &mut TimeSlice) -> TickOutcome {
        if self.state == LoadState::Done {
            return if self.error.is_some() {
                TickOutcome::Failed
            } else {
                TickOutcome::Done
            };
        }

        if self.state == LoadState::CreateLinker {
            let Some(bytes) = self.bytes.take() else {
                return TickOutcome::Continuing;
            };
            match LinkerLoad::new(self.package, &bytes) {
                Ok(linker) => {
                    self.linker = Some(linker);
                    self.state = LoadState::FinishLinker;
                }
                Err(source) => {
                    return self.fail_package(ctx, source);
                }
            }
        }

        if self.state == LoadState::FinishLinker {
            let linker = self.linker.as_mut().expect("linker exists past CreateLinker");
            match linker.tick_tables(slice) {
                Ok(false) => return TickOutcome::Continuing,
                Ok(true) => {
                    let mut packages: Vec<Name> = linker
                        .imports()
                        .iter()
                        .map(|import| import.package)
                        .filter(|pkg| *pkg != self.package)
                        .collect();
                    packages.sort_unstable();
                    packages.dedup();
                    self.requested_imports = packages;
                    self.state = LoadState::CreateImports;
                }
                Err(source) => return self.fail_package(ctx, source),
            }
        }

        if self.state == LoadState::CreateImports {
            while self.import_index < self.linker_ref().imports().len() {
                if slice.give_up() {
                    return TickOutcome::Continuing;
                }
                let index = self.import_index;
                let linker = self.linker.as_mut().expect("linker exists");
                if let Err(source) = linker.create_import(index, ctx) {
                    return self.fail_package(ctx, source);
                }
                self.import_index += 1;
            }
            self.state = LoadState::CreateExports;
        }

        if self.state == LoadState::CreateExports {
            while self.export_index < self.linker_ref().exports().len() {
                if slice.give_up() {
                    return TickOutcome::Continuing;
                }
                let index = self.export_index;
                let linker = self.linker.as_mut().expect("linker exists");
                if let Err(source) = linker.create_export(index, ctx) {
                    return self.fail_package(ctx, source);
                }
                self.export_index += 1;
            }
            self.state = LoadState::PreloadObjects;
        }

        if self.state == LoadState::PreloadObjects {
            while self.preload_index < self.linker_ref().exports().len() {
                if slice.give_up() {
                    return TickOutcome::Continuing;
                }
                let index = self.preload_index;
                let linker = self.linker.as_mut().expect("linker exists");
                match linker.preload_export(index, ctx) {
                    Ok(stats) => {
                        if stats.unknown > 0 || stats.kind_mismatches > 0 {
                            log::debug!(
                                "package '{}': export {} loaded with {} unknown, {} mismatched properties",
                                self.package,
                                index,
                                stats.unknown,
                                stats.kind_mismatches
                            );
                        }
                    }
                    Err(source) => return self.fail_package(ctx, source),
                }
                self.preload_index += 1;
            }
            self.state = LoadState::FinishExportGuids;
        }

        if self.state == LoadState::FinishExportGuids {
            let linker = self.linker.as_mut().expect("linker exists");
            let unresolved = linker.finish_imports(ctx);
            if unresolved > 0 {
                log::warn!(
                    "package '{}': {} imports left unresolved",
                    self.package,
                    unresolved
                );
            }
            for index in 0..linker.exports().len() {
                let export = linker.exports()[index];
                let handle = linker.export_handle(index);
                if export.has_guid() {
                    ctx.register_guid(export.guid, handle);
                }
                ctx.queue_post_load(handle);
            }
            self.state = LoadState::PostLoad;
        }

        if self.state == LoadState::PostLoad {
            let hook = ctx.post_load_hook();
            while ctx.has_pending_post_load() {
                if slice.give_up() {
                    return TickOutcome::Continuing;
                }
                let Some(handle) = ctx.next_post_load() else {
                    break;
                };
                let Some(object) = ctx.arena.get(handle) else {
                    continue;
                };
                let mut object = object.write();
                if !object.flags.contains(ObjectFlags::NEED_POST_LOAD) {
                    continue;
                }
                object.flags.remove(ObjectFlags::NEED_POST_LOAD);
                if let Some(hook) = &hook {
                    hook(ctx, handle, &mut object);
                }
            }
            self.state = LoadState::FinishObjects;
        }

        if self.state == LoadState::FinishObjects {
            let linker = self.linker.as_ref().expect("linker exists");
            for index in 0..linker.exports().len() {
                let handle = linker.export_handle(index);
                if let Some(object) = ctx.arena.get(handle) {
                    object.write().flags.remove(ObjectFlags::ASYNC_LOADING);
                }
            }
            log::debug!(
                "package '{}' loaded: {} exports live",
                self.package,
                linker.exports().len()
            );
            self.state = LoadState::Done;
            self.fire(Ok(()));
            return TickOutcome::Done;
        }

        TickOutcome::Continuing
    }

    fn linker_ref(&self) -> &LinkerLoad {
        self.linker.as_ref().expect("linker exists")
    }

    fn fail_package(&mut self, ctx: &LoadContext, source: crate::package::PackageError) -> TickOutcome {
        self.fail(
            ctx,
            LoadError::Package {
                package: self.package,
                source,
            },
        );
        TickOutcome::Failed
    }

    /// Tear down partially created objects and report the failure.
    pub(crate) fn fail(&mut self, ctx: &LoadContext, error: LoadError) {
        log::warn!("{}", error);
        if let Some(linker) = &self.linker {
            for index in 0..linker.exports().len() {
                let handle = linker.export_handle(index);
                if let Some(object) = ctx.arena.get(handle) {
                    object.write().flags.insert(ObjectFlags::PENDING_KILL);
                }
            }
        }
        ctx.directory.remove_package(self.package);
        self.state = LoadState::Done;
        self.error = Some(error.clone());
        self.fire(Err(error));
    }

    fn fire(&mut self, result: Result<(), LoadError>) {
        for callback in self.callbacks.drain(..) {
            callback(result.clone());
        }
    }
}
