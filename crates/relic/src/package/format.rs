// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! On-disk structures: package summary, import/export table entries and the
//! signed package index.

use crate::archive::cursor::{Reader, Writer};
use crate::archive::WriteLinker;
use crate::config;
use crate::name::Name;
use crate::package::PackageError;

/// Serialized byte size of [`PackageSummary`] (fixed; the body starts right
/// after it).
pub const SUMMARY_SIZE: usize = 4 * 11 + 16;

// =======================================================================
// Package index
// =======================================================================

/// Signed reference into a package's tables.
///
/// Zero is null, positive `n` addresses export `n - 1`, negative `n`
/// addresses import `-n - 1`. This is the wire form of every object
/// reference inside a package payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackageIndex(i32);

impl PackageIndex {
    /// The null reference.
    pub const NULL: PackageIndex = PackageIndex(0);

    /// Reference to export table entry `index`.
    #[must_use]
    pub fn from_export(index: usize) -> Self {
        PackageIndex(index as i32 + 1)
    }

    /// Reference to import table entry `index`.
    #[must_use]
    pub fn from_import(index: usize) -> Self {
        PackageIndex(-(index as i32) - 1)
    }

    /// Rebuild from the raw signed value.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        PackageIndex(raw)
    }

    /// Raw signed value (what goes on the wire, compact-encoded).
    #[inline]
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }

    /// True for the null reference.
    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Export table index, if this is an export reference.
    #[must_use]
    pub fn export_index(self) -> Option<usize> {
        if self.0 > 0 {
            Some(self.0 as usize - 1)
        } else {
            None
        }
    }

    /// Import table index, if this is an import reference.
    #[must_use]
    pub fn import_index(self) -> Option<usize> {
        if self.0 < 0 {
            Some((-self.0) as usize - 1)
        } else {
            None
        }
    }
}

// =======================================================================
// Summary
// =======================================================================

/// Fixed-size package header.
///
/// All offsets and counts describe the *body* (the bytes following the
/// summary, after decompression when [`config::PKG_COMPRESSED`] is set) and
/// are relative to the body's first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub version: u32,
    pub licensee_version: u32,
    pub package_flags: u32,
    pub name_count: u32,
    pub name_offset: u32,
    pub import_count: u32,
    pub import_offset: u32,
    pub export_count: u32,
    pub export_offset: u32,
    /// Body size after decompression; equals the stored body size for
    /// uncompressed packages.
    pub uncompressed_size: u32,
    /// Package content GUID (zero when absent).
    pub guid: [u8; 16],
}

impl Default for PackageSummary {
    fn default() -> Self {
        Self {
            version: config::PACKAGE_FILE_VERSION,
            licensee_version: config::PACKAGE_FILE_LICENSEE_VERSION,
            package_flags: 0,
            name_count: 0,
            name_offset: 0,
            import_count: 0,
            import_offset: 0,
            export_count: 0,
            export_offset: 0,
            uncompressed_size: 0,
            guid: [0; 16],
        }
    }
}

impl PackageSummary {
    /// Write the summary, magic first.
    pub fn serialize(&self, writer: &mut Writer) {
        writer.write_u32(config::PACKAGE_FILE_TAG);
        writer.write_u32(self.version);
        writer.write_u32(self.licensee_version);
        writer.write_u32(self.package_flags);
        writer.write_u32(self.name_count);
        writer.write_u32(self.name_offset);
        writer.write_u32(self.import_count);
        writer.write_u32(self.import_offset);
        writer.write_u32(self.export_count);
        writer.write_u32(self.export_offset);
        writer.write_u32(self.uncompressed_size);
        writer.write_bytes(&self.guid);
    }

    /// Parse and validate a summary.
    ///
    /// Seeing the byte-swapped magic flips the reader's swap flag for the
    /// rest of the stream; any other first word is [`PackageError::BadMagic`].
    /// The version window is enforced here, before any table is touched.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self, PackageError> {
        let magic = reader.read_u32().map_err(|_| PackageError::Corrupt {
            reason: "file shorter than the package magic".into(),
        })?;
        if magic == config::PACKAGE_FILE_TAG_SWAPPED {
            let swapped = !reader.options().swap_bytes;
            reader.options_mut().swap_bytes = swapped;
        } else if magic != config::PACKAGE_FILE_TAG {
            return Err(PackageError::BadMagic { found: magic });
        }
        let read = |r: &mut Reader<'_>| {
            r.read_u32().map_err(|_| PackageError::Corrupt {
                reason: "truncated package summary".into(),
            })
        };
        let version = read(reader)?;
        if !(config::PACKAGE_FILE_MIN_VERSION..=config::PACKAGE_FILE_VERSION).contains(&version) {
            return Err(PackageError::UnsupportedVersion {
                version,
                min: config::PACKAGE_FILE_MIN_VERSION,
                max: config::PACKAGE_FILE_VERSION,
            });
        }
        let licensee_version = read(reader)?;
        let package_flags = read(reader)?;
        let name_count = read(reader)?;
        let name_offset = read(reader)?;
        let import_count = read(reader)?;
        let import_offset = read(reader)?;
        let export_count = read(reader)?;
        let export_offset = read(reader)?;
        let uncompressed_size = read(reader)?;
        let mut guid = [0u8; 16];
        guid.copy_from_slice(reader.read_bytes(16).map_err(|_| PackageError::Corrupt {
            reason: "truncated package summary".into(),
        })?);
        Ok(Self {
            version,
            licensee_version,
            package_flags,
            name_count,
            name_offset,
            import_count,
            import_offset,
            export_count,
            export_offset,
            uncompressed_size,
            guid,
        })
    }

    /// True when the body is stored deflate-compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.package_flags & config::PKG_COMPRESSED != 0
    }
}

// =======================================================================
// Table entries
// =======================================================================

/// One import table entry: an object defined by another package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectImport {
    /// Package the object lives in.
    pub package: Name,
    /// Object name within that package.
    pub name: Name,
    /// Class name, for placeholder construction before the source package
    /// finishes loading.
    pub class_name: Name,
    /// GUID of the referenced object at save time (zero when it had none).
    /// Lets resolution survive the object moving to another package.
    pub guid: [u8; 16],
}

impl ObjectImport {
    pub fn serialize(&self, writer: &mut Writer, linker: &mut dyn WriteLinker) {
        let package = linker.map_name(self.package);
        let name = linker.map_name(self.name);
        let class_name = linker.map_name(self.class_name);
        writer.write_u32(package);
        writer.write_u32(name);
        writer.write_u32(class_name);
        writer.write_bytes(&self.guid);
    }

    pub fn deserialize(reader: &mut Reader<'_>, names: &[Name]) -> Result<Self, PackageError> {
        let package = table_name(reader, names)?;
        let name = table_name(reader, names)?;
        let class_name = table_name(reader, names)?;
        let mut guid = [0u8; 16];
        guid.copy_from_slice(reader.read_bytes(16)?);
        Ok(Self {
            package,
            name,
            class_name,
            guid,
        })
    }

    /// True when the import carries a non-zero GUID.
    #[must_use]
    pub fn has_guid(&self) -> bool {
        self.guid != [0; 16]
    }
}

/// One export table entry: an object this package defines, plus where its
/// tagged payload sits in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectExport {
    pub name: Name,
    pub class_name: Name,
    /// Enclosing object within this package, or null.
    pub outer: PackageIndex,
    /// Payload offset relative to the body's first byte.
    pub serial_offset: u32,
    /// Payload byte size.
    pub serial_size: u32,
    /// Object flag bits persisted with the export.
    pub object_flags: u32,
    /// Stable cross-package GUID (zero when absent).
    pub guid: [u8; 16],
}

impl ObjectExport {
    pub fn serialize(&self, writer: &mut Writer, linker: &mut dyn WriteLinker) {
        let name = linker.map_name(self.name);
        let class_name = linker.map_name(self.class_name);
        writer.write_u32(name);
        writer.write_u32(class_name);
        writer.write_compact_index(self.outer.raw());
        writer.write_u32(self.serial_offset);
        writer.write_u32(self.serial_size);
        writer.write_u32(self.object_flags);
        writer.write_bytes(&self.guid);
    }

    pub fn deserialize(reader: &mut Reader<'_>, names: &[Name]) -> Result<Self, PackageError> {
        let name = table_name(reader, names)?;
        let class_name = table_name(reader, names)?;
        let outer = PackageIndex::from_raw(reader.read_compact_index()?);
        let serial_offset = reader.read_u32()?;
        let serial_size = reader.read_u32()?;
        let object_flags = reader.read_u32()?;
        let mut guid = [0u8; 16];
        guid.copy_from_slice(reader.read_bytes(16)?);
        Ok(Self {
            name,
            class_name,
            outer,
            serial_offset,
            serial_size,
            object_flags,
            guid,
        })
    }

    /// True when the export carries a non-zero GUID.
    #[must_use]
    pub fn has_guid(&self) -> bool {
        self.guid != [0; 16]
    }
}

fn table_name(reader: &mut Reader<'_>, names: &[Name]) -> Result<Name, PackageError> {
    let index = reader.read_u32()? as usize;
    names.get(index).copied().ok_or(PackageError::Corrupt {
        reason: format!("name index {} outside table of {}", index, names.len()),
    })
}
