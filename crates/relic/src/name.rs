// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interned name type.
//!
//! Every identifier in the reflection system (class names, property names,
//! package names, name-table entries) is a [`Name`]: a `u32` index into a
//! process-wide interner. Comparing names is an integer compare; resolving a
//! name back to text is a table lookup. Index 0 is reserved for the `None`
//! name, which doubles as the tagged-property stream sentinel.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Reserved text for [`Name::NONE`].
pub const NAME_NONE_TEXT: &str = "None";

struct NameInterner {
    by_text: DashMap<Arc<str>, u32>,
    by_index: RwLock<Vec<Arc<str>>>,
}

impl NameInterner {
    fn new() -> Self {
        let none: Arc<str> = Arc::from(NAME_NONE_TEXT);
        let by_text = DashMap::new();
        by_text.insert(Arc::clone(&none), 0);
        Self {
            by_text,
            by_index: RwLock::new(vec![none]),
        }
    }

    fn intern(&self, text: &str) -> u32 {
        if let Some(existing) = self.by_text.get(text) {
            return *existing;
        }
        // Slow path: take the table lock, then re-check so two racing
        // interns of the same string agree on one index.
        let mut table = self.by_index.write();
        if let Some(existing) = self.by_text.get(text) {
            return *existing;
        }
        let index = table.len() as u32;
        let shared: Arc<str> = Arc::from(text);
        table.push(Arc::clone(&shared));
        self.by_text.insert(shared, index);
        index
    }

    fn resolve(&self, index: u32) -> Option<Arc<str>> {
        self.by_index.read().get(index as usize).cloned()
    }
}

fn interner() -> &'static NameInterner {
    static INTERNER: OnceLock<NameInterner> = OnceLock::new();
    INTERNER.get_or_init(NameInterner::new)
}

/// Process-wide interned identifier.
///
/// `Name` is `Copy` and four bytes; all text lives in the interner for the
/// life of the process (names are never recycled, matching the write-once
/// registry discipline of the type system).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// The `None` name; index 0, used as the tagged-property sentinel.
    pub const NONE: Name = Name(0);

    /// Intern `text`, returning the canonical index for it.
    ///
    /// Interning `"None"` yields [`Name::NONE`].
    pub fn intern(text: &str) -> Name {
        Name(interner().intern(text))
    }

    /// Raw interner index.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Reconstruct a name from an interner index, if it exists.
    #[must_use]
    pub fn from_index(index: u32) -> Option<Name> {
        interner().resolve(index).map(|_| Name(index))
    }

    /// True for [`Name::NONE`].
    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Resolve to the interned text.
    #[must_use]
    pub fn as_str(self) -> Arc<str> {
        // Index 0 always resolves; any other Name was produced by intern().
        interner()
            .resolve(self.0)
            .unwrap_or_else(|| Arc::from(NAME_NONE_TEXT))
    }
}

/// Number of names interned so far (diagnostics).
#[must_use]
pub fn interned_count() -> usize {
    interner().by_index.read().len()
}

impl Default for Name {
    fn default() -> Self {
        Name::NONE
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?}#{})", &*self.as_str(), self.0)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::intern(text)
    }
}
