// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Package file format: summary header, name/import/export tables.
//!
//! A package file is a fixed-size summary followed by a body (name table,
//! import table, export table, then the per-export tagged payload segment).
//! The body may be deflate-compressed as one block; the summary never is,
//! so magic/version validation works before any decompression.

pub mod format;

pub use format::{ObjectExport, ObjectImport, PackageIndex, PackageSummary};

use crate::archive::ArchiveError;
use crate::name::Name;
use crate::object::value::ValueError;
use crate::reflect::ReflectError;
use std::fmt;

/// Package-level load/save errors. One package's failure never takes down
/// the process; these surface through the load-completion callback.
#[derive(Debug, Clone)]
pub enum PackageError {
    /// The file does not start with the package magic in either byte order.
    BadMagic { found: u32 },
    /// Format version outside the supported range.
    UnsupportedVersion { version: u32, min: u32, max: u32 },
    /// Structurally invalid file (bad table offsets, short body, ...).
    Corrupt { reason: String },
    /// An export's class is not registered.
    UnknownClass { class: Name },
    /// The compressed body failed to inflate.
    Decompress { reason: String },
    /// Byte-level serialization failure.
    Archive(ArchiveError),
    /// Type-system failure while instantiating exports.
    Reflect(ReflectError),
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::BadMagic { found } => {
                write!(f, "bad package magic 0x{:08X}", found)
            }
            PackageError::UnsupportedVersion { version, min, max } => write!(
                f,
                "unsupported package version {} (supported {}..={})",
                version, min, max
            ),
            PackageError::Corrupt { reason } => write!(f, "corrupt package: {}", reason),
            PackageError::UnknownClass { class } => {
                write!(f, "export references unregistered class '{}'", class)
            }
            PackageError::Decompress { reason } => {
                write!(f, "package body decompression failed: {}", reason)
            }
            PackageError::Archive(err) => write!(f, "{}", err),
            PackageError::Reflect(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PackageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackageError::Archive(err) => Some(err),
            PackageError::Reflect(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArchiveError> for PackageError {
    fn from(err: ArchiveError) -> Self {
        PackageError::Archive(err)
    }
}

impl From<ValueError> for PackageError {
    fn from(err: ValueError) -> Self {
        PackageError::Archive(ArchiveError::Value(err))
    }
}

impl From<ReflectError> for PackageError {
    fn from(err: ReflectError) -> Self {
        PackageError::Reflect(err)
    }
}
