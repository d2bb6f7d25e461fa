// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The async loader: one scheduler driving every in-flight package.
//!
//! [`AsyncLoader::tick`] is the cooperative heartbeat: it routes finished
//! I/O to its package, gives each package a share of the time slice, spins
//! up dependency loads the packages discovered, and retires finished ones.
//! Callers embed `tick` in their frame loop, or call [`AsyncLoader::flush`]
//! to run a load to completion synchronously.

use crate::config::{self, LoaderConfig};
use crate::loader::async_package::{AsyncPackage, LoadState};
use crate::loader::context::LoadContext;
use crate::loader::io::{ByteSource, FileSource, IoDispatcher, MemorySource};
use crate::loader::{LoadError, TimeSlice};
use crate::name::Name;
use dashmap::{DashMap, DashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolves a package name to its bytes' source.
pub trait PackageProvider: Send + Sync {
    /// Open `package`, or `None` when this provider does not have it.
    fn open(&self, package: Name) -> Option<Box<dyn ByteSource>>;
}

/// Packages as files under one directory, named `<package>.<extension>`.
pub struct DirProvider {
    root: PathBuf,
    extension: String,
}

impl DirProvider {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            extension: config::PACKAGE_FILE_EXTENSION.to_string(),
        }
    }

    /// Override the file extension (no leading dot).
    #[must_use]
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }
}

impl PackageProvider for DirProvider {
    fn open(&self, package: Name) -> Option<Box<dyn ByteSource>> {
        let path = self
            .root
            .join(format!("{}.{}", package, self.extension));
        if path.is_file() {
            Some(Box::new(FileSource::new(path)))
        } else {
            None
        }
    }
}

/// In-memory package store (tests, generated content).
#[derive(Default)]
pub struct MemoryProvider {
    packages: DashMap<Name, Vec<u8>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a package's bytes.
    pub fn insert(&self, package: Name, bytes: Vec<u8>) {
        self.packages.insert(package, bytes);
    }
}

impl PackageProvider for MemoryProvider {
    fn open(&self, package: Name) -> Option<Box<dyn ByteSource>> {
        self.packages
            .get(&package)
            .map(|bytes| Box::new(MemorySource::new(bytes.clone())) as Box<dyn ByteSource>)
    }
}

type LoadCallback = Box<dyn FnOnce(Result<(), LoadError>) + Send>;

/// Drives every in-flight package load.
pub struct AsyncLoader {
    config: LoaderConfig,
    ctx: Arc<LoadContext>,
    io: IoDispatcher,
    provider: Box<dyn PackageProvider>,
    packages: Vec<AsyncPackage>,
    loaded: DashSet<Name>,
}

impl AsyncLoader {
    /// Loader over `provider`, with `config.io_workers` read threads.
    #[must_use]
    pub fn new(config: LoaderConfig, ctx: Arc<LoadContext>, provider: Box<dyn PackageProvider>) -> Self {
        let io = IoDispatcher::new(config.io_workers);
        Self {
            config,
            ctx,
            io,
            provider,
            packages: Vec::new(),
            loaded: DashSet::new(),
        }
    }

    /// Shared load context.
    #[must_use]
    pub fn context(&self) -> &Arc<LoadContext> {
        &self.ctx
    }

    /// Number of in-flight packages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.packages.len()
    }

    /// True while `package` is in flight.
    #[must_use]
    pub fn is_loading(&self, package: Name) -> bool {
        self.packages.iter().any(|p| p.package() == package)
    }

    /// Request `package` at default priority.
    pub fn load_package(&mut self, package: Name, callback: Option<LoadCallback>) {
        self.load_package_prioritized(package, 0, callback);
    }

    /// Request `package`. A request for an already in-flight package only
    /// attaches the callback; a request for an already loaded package
    /// completes immediately.
    pub fn load_package_prioritized(
        &mut self,
        package: Name,
        priority: i32,
        callback: Option<LoadCallback>,
    ) {
        if self.loaded.contains(&package) {
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return;
        }
        if let Some(existing) = self.packages.iter_mut().find(|p| p.package() == package) {
            if let Some(callback) = callback {
                existing.add_callback(callback);
            }
            return;
        }
        let mut pending = AsyncPackage::new(package, priority);
        if let Some(callback) = callback {
            pending.add_callback(callback);
        }
        match self.provider.open(package) {
            Some(source) => {
                let id = self.io.submit(package, priority, source);
                pending.set_io_id(id);
                log::debug!("package '{}': load requested (priority {})", package, priority);
                self.packages.push(pending);
            }
            None => {
                pending.fail(&self.ctx, LoadError::Missing { package });
            }
        }
    }

    /// Abort `package`'s load if it is still in flight.
    pub fn cancel(&mut self, package: Name) {
        if let Some(pos) = self.packages.iter().position(|p| p.package() == package) {
            let mut pending = self.packages.remove(pos);
            if let Some(id) = pending.io_id() {
                self.io.cancel(id);
            }
            pending.cancel(&self.ctx);
        }
    }

    /// One heartbeat: deliver I/O, tick every package within the configured
    /// time slice, start discovered dependency loads, retire finished
    /// packages. Returns how many loads remain in flight.
    pub fn tick(&mut self) -> usize {
        while let Some(completion) = self.io.poll() {
            if let Some(package) = self
                .packages
                .iter_mut()
                .find(|p| p.io_id() == Some(completion.id))
            {
                package.deliver_io(&self.ctx, completion.result);
            }
        }

        let mut slice = TimeSlice::new(self.config.time_slice);
        let mut dependencies: Vec<(Name, i32)> = Vec::new();
        for package in &mut self.packages {
            package.tick(&self.ctx, &mut slice);
            let priority = package.priority();
            dependencies.extend(
                package
                    .take_import_requests()
                    .into_iter()
                    .map(|name| (name, priority)),
            );
        }

        for package in &self.packages {
            if package.state() == LoadState::Done && package.error().is_none() {
                self.loaded.insert(package.package());
            }
        }
        self.packages.retain(|p| p.state() != LoadState::Done);

        for (name, priority) in dependencies {
            self.load_package_prioritized(name, priority, None);
        }
        self.packages.len()
    }

    /// Run every in-flight load to completion.
    pub fn flush(&mut self) {
        while self.tick() > 0 {
            // The only thing worth waiting on between ticks is I/O.
            std::thread::sleep(Duration::from_micros(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::arena::ObjectArena;
    use crate::reflect::registry::TypeRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_loader(provider: Box<dyn PackageProvider>) -> AsyncLoader {
        let ctx = Arc::new(LoadContext::new(
            Arc::new(ObjectArena::new()),
            Arc::new(TypeRegistry::new()),
        ));
        AsyncLoader::new(LoaderConfig::default(), ctx, provider)
    }

    #[test]
    fn test_missing_package_fails_immediately() {
        let mut loader = test_loader(Box::new(MemoryProvider::new()));
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        loader.load_package(
            Name::intern("NoSuchPkg"),
            Some(Box::new(move |result| {
                assert!(matches!(result, Err(LoadError::Missing { .. })));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert_eq!(loader.pending(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_request_attaches_callback() {
        let provider = MemoryProvider::new();
        // Garbage bytes: the load will fail, but both callbacks must fire.
        provider.insert(Name::intern("DupPkg"), vec![0xFF; 64]);
        let mut loader = test_loader(Box::new(provider));
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let seen = Arc::clone(&fired);
            loader.load_package(
                Name::intern("DupPkg"),
                Some(Box::new(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }
        assert_eq!(loader.pending(), 1);
        loader.flush();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_fires_cancelled() {
        let provider = MemoryProvider::new();
        provider.insert(Name::intern("CancelPkg"), vec![0; 128]);
        let mut loader = test_loader(Box::new(provider));
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        loader.load_package(
            Name::intern("CancelPkg"),
            Some(Box::new(move |result| {
                assert!(matches!(result, Err(LoadError::Cancelled { .. })));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );
        loader.cancel(Name::intern("CancelPkg"));
        assert_eq!(loader.pending(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dir_provider_resolves_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("MapPkg.rpk"), b"x").unwrap();
        let provider = DirProvider::new(dir.path().to_path_buf());
        assert!(provider.open(Name::intern("MapPkg")).is_some());
        assert!(provider.open(Name::intern("Absent")).is_none());
    }
}
