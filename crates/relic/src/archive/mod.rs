// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary serialization protocol.
//!
//! An archive is a bounds-checked cursor over bytes plus a bundle of mode
//! flags ([`ArchiveOptions`]). Object references and names never hit the
//! wire directly: they go through the [`WriteLinker`]/[`ReadLinker`] seam,
//! which maps them to package-table indices on save and resolves (possibly
//! deferring) them on load. The tagged-property format in [`tagged`] is the
//! on-disk object encoding.

pub mod cursor;
pub mod tagged;

pub use cursor::{Reader, Writer};
pub use tagged::{load_tagged, save_tagged, LoadStats};

use crate::config;
use crate::name::Name;
use crate::object::arena::ObjectHandle;
use crate::object::value::ValueError;
use std::fmt;

/// Serialization errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveError {
    /// Write past the end of a fixed region, or an unpatchable offset.
    WriteFailed { offset: usize, reason: String },
    /// The stream is shorter or stranger than its own framing claims.
    /// Aborts the in-flight load.
    Corrupt { offset: usize, reason: String },
    /// Typed access against instance storage failed.
    Value(ValueError),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::WriteFailed { offset, reason } => {
                write!(f, "archive write failed at offset {}: {}", offset, reason)
            }
            ArchiveError::Corrupt { offset, reason } => {
                write!(f, "corrupt archive at offset {}: {}", offset, reason)
            }
            ArchiveError::Value(err) => write!(f, "archive value access: {}", err),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Value(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValueError> for ArchiveError {
    fn from(err: ValueError) -> Self {
        ArchiveError::Value(err)
    }
}

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Mode flags and version gates shared by the read and write cursors.
///
/// Exactly one direction is implied by the cursor type itself; the flags
/// here are the orthogonal policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Writing to / reading from durable storage (transient properties are
    /// excluded).
    pub persistent: bool,
    /// Undo-transaction archive: duplicate-transient properties are
    /// skipped, deprecated properties are still written.
    pub transacting: bool,
    /// Big-endian wire order instead of the native little-endian.
    pub swap_bytes: bool,
    /// Strip editor-only properties on both save and load.
    pub filter_editor_only: bool,
    /// Write every serializable property, ignoring the delta-from-default
    /// comparison.
    pub binary_properties: bool,
    /// Currently serializing a class default object (delta compare is
    /// meaningless there).
    pub serializing_defaults: bool,
    /// Format version gate for conditional fields.
    pub version: u32,
    /// Licensee-specific version gate.
    pub licensee_version: u32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            transacting: false,
            swap_bytes: false,
            filter_editor_only: false,
            binary_properties: false,
            serializing_defaults: false,
            version: config::PACKAGE_FILE_VERSION,
            licensee_version: config::PACKAGE_FILE_LICENSEE_VERSION,
        }
    }
}

impl ArchiveOptions {
    /// Default persistent-archive options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle byte swapping.
    #[must_use]
    pub fn with_swap_bytes(mut self, swap: bool) -> Self {
        self.swap_bytes = swap;
        self
    }

    /// Toggle editor-only filtering.
    #[must_use]
    pub fn with_filter_editor_only(mut self, filter: bool) -> Self {
        self.filter_editor_only = filter;
        self
    }

    /// Toggle transacting mode.
    #[must_use]
    pub fn with_transacting(mut self, transacting: bool) -> Self {
        self.transacting = transacting;
        self
    }

    /// Toggle forced full property serialization.
    #[must_use]
    pub fn with_binary_properties(mut self, binary: bool) -> Self {
        self.binary_properties = binary;
        self
    }

    /// Target an explicit format version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Save-side linker seam: maps in-memory identities to table indices.
///
/// Contract: `map_name(Name::NONE)` must return index 0 (the tagged-stream
/// sentinel relies on it). `map_object` returns a signed package index:
/// positive `n` means export `n - 1`, negative `n` means import `-n - 1`,
/// zero means null.
pub trait WriteLinker {
    fn map_name(&mut self, name: Name) -> u32;
    fn map_object(&mut self, handle: ObjectHandle) -> i32;
}

/// Load-side linker seam: resolves table indices back to identities.
///
/// `object_at` may defer: an import whose package is still in flight
/// resolves to null now and is retried by the loader's fix-up phase.
pub trait ReadLinker {
    fn name_at(&self, index: u32) -> Option<Name>;
    fn object_at(&mut self, index: i32) -> ObjectHandle;
}

/// Table-free linker for standalone archives (tests, tools): names map to
/// their interner index, object references collapse to null.
#[derive(Debug, Default, Clone, Copy)]
pub struct LooseLinker;

impl WriteLinker for LooseLinker {
    fn map_name(&mut self, name: Name) -> u32 {
        name.index()
    }

    fn map_object(&mut self, _handle: ObjectHandle) -> i32 {
        0
    }
}

impl ReadLinker for LooseLinker {
    fn name_at(&self, index: u32) -> Option<Name> {
        Name::from_index(index)
    }

    fn object_at(&mut self, _index: i32) -> ObjectHandle {
        ObjectHandle::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_persistent() {
        let opts = ArchiveOptions::default();
        assert!(opts.persistent);
        assert!(!opts.transacting);
        assert!(!opts.swap_bytes);
        assert_eq!(opts.version, config::PACKAGE_FILE_VERSION);
    }

    #[test]
    fn test_loose_linker_names_roundtrip() {
        let mut linker = LooseLinker;
        let name = Name::intern("ArchSeam");
        let index = linker.map_name(name);
        assert_eq!(linker.name_at(index), Some(name));
        assert_eq!(linker.map_name(Name::NONE), 0);
        assert_eq!(linker.name_at(0), Some(Name::NONE));
    }

    #[test]
    fn test_error_display() {
        let err = ArchiveError::Corrupt {
            offset: 17,
            reason: "unexpected end of stream".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt archive at offset 17: unexpected end of stream"
        );
    }
}
