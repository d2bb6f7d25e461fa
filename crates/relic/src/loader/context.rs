// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared loading context.
//!
//! Replaces ambient globals with one explicit object threaded through the
//! linkers and the async packages: the arena, the type registry, the
//! cross-package object directory, the export-GUID cache and the pending
//! post-load queue.

use crate::name::Name;
use crate::object::arena::{ObjectArena, ObjectHandle};
use crate::object::instance::ObjectInstance;
use crate::reflect::registry::TypeRegistry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Cross-package lookup of live objects by `(package, name)`.
///
/// This is what lets an import resolve to a provisional placeholder while
/// its source package is still loading, and what lets that package adopt
/// the placeholder instead of minting a second identity.
#[derive(Default)]
pub struct ObjectDirectory {
    entries: DashMap<(Name, Name), ObjectHandle>,
}

impl ObjectDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-point) a `(package, object)` pair.
    pub fn register(&self, package: Name, object: Name, handle: ObjectHandle) {
        self.entries.insert((package, object), handle);
    }

    /// Resolve a pair to a live handle.
    #[must_use]
    pub fn lookup(&self, package: Name, object: Name) -> Option<ObjectHandle> {
        self.entries.get(&(package, object)).map(|h| *h)
    }

    /// Drop every entry belonging to `package` (teardown of a failed or
    /// cancelled load).
    pub fn remove_package(&self, package: Name) {
        self.entries.retain(|(pkg, _), _| *pkg != package);
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Post-load hook signature: runs once per freshly loaded object.
pub type PostLoadHook = dyn Fn(&LoadContext, ObjectHandle, &mut ObjectInstance) + Send + Sync;

/// Everything a load needs beyond its own bytes.
pub struct LoadContext {
    /// Live object storage.
    pub arena: Arc<ObjectArena>,
    /// Process-wide type registry.
    pub registry: Arc<TypeRegistry>,
    /// Cross-package object lookup.
    pub directory: ObjectDirectory,
    /// Export GUIDs registered by finished packages.
    guid_cache: DashMap<[u8; 16], ObjectHandle>,
    /// Objects awaiting their post-load pass. Hooks may push more; the
    /// post-load phase drains until the queue stays empty.
    pending_post_load: Mutex<VecDeque<ObjectHandle>>,
    post_load_hook: Mutex<Option<Arc<PostLoadHook>>>,
}

impl LoadContext {
    /// Fresh context over `arena` and `registry`.
    #[must_use]
    pub fn new(arena: Arc<ObjectArena>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            arena,
            registry,
            directory: ObjectDirectory::new(),
            guid_cache: DashMap::new(),
            pending_post_load: Mutex::new(VecDeque::new()),
            post_load_hook: Mutex::new(None),
        }
    }

    /// Install the post-load hook (replaces any previous one).
    pub fn set_post_load_hook(&self, hook: Arc<PostLoadHook>) {
        *self.post_load_hook.lock() = Some(hook);
    }

    /// Current post-load hook, if any.
    #[must_use]
    pub fn post_load_hook(&self) -> Option<Arc<PostLoadHook>> {
        self.post_load_hook.lock().clone()
    }

    /// Queue an object for the post-load phase.
    pub fn queue_post_load(&self, handle: ObjectHandle) {
        self.pending_post_load.lock().push_back(handle);
    }

    /// Take the next pending post-load object.
    pub fn next_post_load(&self) -> Option<ObjectHandle> {
        self.pending_post_load.lock().pop_front()
    }

    /// True while post-load work remains queued.
    #[must_use]
    pub fn has_pending_post_load(&self) -> bool {
        !self.pending_post_load.lock().is_empty()
    }

    /// Remember an export GUID (cross-package GUID-addressed references).
    pub fn register_guid(&self, guid: [u8; 16], handle: ObjectHandle) {
        if guid != [0; 16] {
            self.guid_cache.insert(guid, handle);
        }
    }

    /// Resolve a GUID registered by any finished package.
    #[must_use]
    pub fn lookup_guid(&self, guid: &[u8; 16]) -> Option<ObjectHandle> {
        self.guid_cache.get(guid).map(|h| *h)
    }
}
