// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relic Global Configuration - Single Source of Truth
//!
//! This module centralizes the on-disk format constants and the runtime
//! loader configuration. **NEVER hardcode these elsewhere!**
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time constants (file tag, format versions)
//! - **Level 2 (Dynamic)**: [`LoaderConfig`] for runtime tuning (time slice,
//!   I/O workers, compression)

use std::time::Duration;

// =======================================================================
// Package file format constants
// =======================================================================

/// Magic tag at byte 0 of every package file.
///
/// A summary whose first four bytes disagree with this value (in either
/// byte order) is rejected as corrupt before anything else is parsed.
pub const PACKAGE_FILE_TAG: u32 = 0x9E2A_83C1;

/// Same tag as stored by a byte-swapped writer. Seeing this value means the
/// file is valid but every scalar must be read with swapped endianness.
pub const PACKAGE_FILE_TAG_SWAPPED: u32 = PACKAGE_FILE_TAG.swap_bytes();

/// Current package file format version, written into every saved summary.
pub const PACKAGE_FILE_VERSION: u32 = 7;

/// Current licensee format version. Licensee builds bump this independently
/// of [`PACKAGE_FILE_VERSION`] to gate their own conditional fields.
pub const PACKAGE_FILE_LICENSEE_VERSION: u32 = 0;

/// Oldest package file version the loader still understands.
///
/// Anything older fails the load with an unsupported-version error rather
/// than being mis-parsed.
pub const PACKAGE_FILE_MIN_VERSION: u32 = 3;

/// Default file extension for package files on disk.
pub const PACKAGE_FILE_EXTENSION: &str = "rpk";

// =======================================================================
// Package flags (summary bitfield)
// =======================================================================

/// Package contains executable script/code objects.
pub const PKG_CONTAINS_CODE: u32 = 1 << 0;
/// Package contains map data.
pub const PKG_CONTAINS_MAP: u32 = 1 << 1;
/// Package was produced by a cook pass (editor-only data stripped).
pub const PKG_COOKED: u32 = 1 << 2;
/// Editor-only properties were filtered out at save time.
pub const PKG_FILTERED_EDITOR_ONLY: u32 = 1 << 3;
/// Export payload segment is stored deflate-compressed.
pub const PKG_COMPRESSED: u32 = 1 << 4;

// =======================================================================
// Loader defaults
// =======================================================================

/// Default soft time budget for one async loading tick.
pub const DEFAULT_TIME_SLICE: Duration = Duration::from_millis(5);

/// Default number of I/O worker threads servicing the request queue.
pub const DEFAULT_IO_WORKERS: usize = 1;

/// Runtime configuration for the async loader.
///
/// Constructed once and handed to [`crate::loader::AsyncLoader`]; cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Soft per-tick budget. `None` disables time slicing: a tick runs each
    /// package to its next I/O stall or to completion.
    pub time_slice: Option<Duration>,
    /// Number of I/O worker threads.
    pub io_workers: usize,
    /// Compress export payload segments when saving through the loader's
    /// save path.
    pub compress_on_save: bool,
    /// Extension appended to package names by directory-backed providers.
    pub package_extension: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            time_slice: Some(DEFAULT_TIME_SLICE),
            io_workers: DEFAULT_IO_WORKERS,
            compress_on_save: false,
            package_extension: PACKAGE_FILE_EXTENSION.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Set the per-tick time budget.
    #[must_use]
    pub fn with_time_slice(mut self, budget: Option<Duration>) -> Self {
        self.time_slice = budget;
        self
    }

    /// Set the I/O worker thread count (clamped to at least one).
    #[must_use]
    pub fn with_io_workers(mut self, workers: usize) -> Self {
        self.io_workers = workers.max(1);
        self
    }

    /// Enable or disable payload compression on save.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_on_save = compress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_swap_is_involutive() {
        assert_eq!(PACKAGE_FILE_TAG_SWAPPED.swap_bytes(), PACKAGE_FILE_TAG);
        assert_ne!(PACKAGE_FILE_TAG, PACKAGE_FILE_TAG_SWAPPED);
    }

    #[test]
    fn test_version_window() {
        assert!(PACKAGE_FILE_MIN_VERSION <= PACKAGE_FILE_VERSION);
    }

    #[test]
    fn test_config_builders() {
        let cfg = LoaderConfig::default()
            .with_io_workers(0)
            .with_time_slice(None)
            .with_compression(true);
        assert_eq!(cfg.io_workers, 1);
        assert!(cfg.time_slice.is_none());
        assert!(cfg.compress_on_save);
    }
}
