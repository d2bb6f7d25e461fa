// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property descriptors: one field of a struct or class.
//!
//! A [`PropertyDescriptor`] is the only type information the serializer, the
//! GC token-stream builder and the default-propagation code ever see, so it
//! carries everything those consumers need as plain data: byte offset,
//! element size, fixed-array dimension, a [`PropertyKind`] tag and the
//! filtering flags.

use crate::name::Name;
use crate::reflect::class::ClassDescriptor;
use std::ops::{BitOr, Range};
use std::sync::Arc;

// =======================================================================
// Property flags
// =======================================================================

/// Filtering/behavior flags for a property.
///
/// Plain bit set; combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    /// No flags set.
    pub const NONE: PropertyFlags = PropertyFlags(0);
    /// Never written to persistent archives.
    pub const TRANSIENT: PropertyFlags = PropertyFlags(1 << 0);
    /// Serialized by native code, skipped by the tagged-property path.
    pub const NATIVE: PropertyFlags = PropertyFlags(1 << 1);
    /// Stripped when the archive filters editor-only data.
    pub const EDITOR_ONLY: PropertyFlags = PropertyFlags(1 << 2);
    /// Replicated over the network.
    pub const NET_REPLICATED: PropertyFlags = PropertyFlags(1 << 3);
    /// Reset to default when an object is duplicated; skipped while
    /// transacting.
    pub const DUPLICATE_TRANSIENT: PropertyFlags = PropertyFlags(1 << 4);
    /// Still loaded for migration, no longer saved (see the save-filter
    /// policy in `archive::tagged`).
    pub const DEPRECATED: PropertyFlags = PropertyFlags(1 << 5);
    /// Only meaningful on archetype objects.
    pub const ARCHETYPE_ONLY: PropertyFlags = PropertyFlags(1 << 6);

    /// True if every flag in `other` is set in `self`.
    #[inline]
    #[must_use]
    pub fn contains(self, other: PropertyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set in `self`.
    #[inline]
    #[must_use]
    pub fn intersects(self, other: PropertyFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bits (for table serialization).
    #[inline]
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits.
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        PropertyFlags(bits)
    }
}

impl BitOr for PropertyFlags {
    type Output = PropertyFlags;
    fn bitor(self, rhs: PropertyFlags) -> PropertyFlags {
        PropertyFlags(self.0 | rhs.0)
    }
}

// =======================================================================
// Property kinds
// =======================================================================

/// Closed set of field kinds, dispatched by exhaustive match in the
/// serializer and the token-stream builder.
///
/// Aggregate kinds carry their inner descriptor: the element descriptor for
/// `Array`, key/value descriptors for `Map`, the nested class for `Struct`.
/// Inner descriptors of `Array`/`Map` always have offset 0 (they address the
/// start of an element, not a location in the owning instance).
#[derive(Debug, Clone)]
pub enum PropertyKind {
    /// Unsigned 8-bit value.
    Byte,
    /// Signed 32-bit integer.
    Int,
    /// Boolean, one byte unless a bitfield mask narrows it to one bit.
    Bool,
    /// 32-bit IEEE float.
    Float,
    /// Interned name (stored as interner index, serialized via name table).
    Name,
    /// Heap string (slot index into the instance value heap).
    Str,
    /// Reference to an arena object.
    Object,
    /// Interface reference; same storage as `Object`, always traced.
    Interface,
    /// Bound delegate: target object reference plus function name.
    Delegate,
    /// Inline nested struct.
    Struct(Arc<ClassDescriptor>),
    /// Dynamically sized array of the inner descriptor.
    Array(Box<PropertyDescriptor>),
    /// Key/value map.
    Map {
        key: Box<PropertyDescriptor>,
        value: Box<PropertyDescriptor>,
    },
}

/// `Struct` compares by descriptor identity: the registry hands out one
/// descriptor per class name, so pointer equality is the right notion.
impl PartialEq for PropertyKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Struct(a), Self::Struct(b)) => Arc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map { key, value }, Self::Map { key: k, value: v }) => key == k && value == v,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl PropertyKind {
    /// Size in bytes of one element of this kind inside instance storage.
    ///
    /// Variable-size kinds (`Str`, `Array`, `Map`) store a 4-byte slot index
    /// into the instance value heap, so their in-place size is fixed.
    #[must_use]
    pub fn element_size(&self) -> usize {
        match self {
            Self::Byte | Self::Bool => 1,
            Self::Int | Self::Float | Self::Name | Self::Str | Self::Array(_) | Self::Map { .. } => {
                4
            }
            Self::Object | Self::Interface => 8,
            Self::Delegate => 12,
            Self::Struct(class) => class.size(),
        }
    }

    /// Minimum alignment of one element.
    #[must_use]
    pub fn alignment(&self) -> usize {
        match self {
            Self::Byte | Self::Bool => 1,
            Self::Struct(class) => class.alignment(),
            Self::Object | Self::Interface => 8,
            _ => 4,
        }
    }

    /// Wire discriminant written into property tags.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Byte => 1,
            Self::Int => 2,
            Self::Bool => 3,
            Self::Float => 4,
            Self::Name => 5,
            Self::Str => 6,
            Self::Object => 7,
            Self::Interface => 8,
            Self::Delegate => 9,
            Self::Struct(_) => 10,
            Self::Array(_) => 11,
            Self::Map { .. } => 12,
        }
    }

    /// Human-readable kind name for diagnostics.
    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::Byte => "Byte",
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::Float => "Float",
            Self::Name => "Name",
            Self::Str => "Str",
            Self::Object => "Object",
            Self::Interface => "Interface",
            Self::Delegate => "Delegate",
            Self::Struct(_) => "Struct",
            Self::Array(_) => "Array",
            Self::Map { .. } => "Map",
        }
    }

    /// True if an instance of this kind can hold outgoing object references,
    /// directly or transitively.
    ///
    /// The token-stream builder over-approximates on this answer: a kind
    /// that *may* carry a reference always contributes tokens.
    #[must_use]
    pub fn is_reference_bearing(&self) -> bool {
        match self {
            Self::Object | Self::Interface | Self::Delegate => true,
            Self::Struct(class) => class
                .fields(true)
                .any(|p| p.kind.is_reference_bearing()),
            Self::Array(inner) => inner.kind.is_reference_bearing(),
            Self::Map { key, value } => {
                key.kind.is_reference_bearing() || value.kind.is_reference_bearing()
            }
            _ => false,
        }
    }
}

// =======================================================================
// Property descriptor
// =======================================================================

/// Metadata for one field of a class or struct.
///
/// Created at registration time, immutable once the owning class is linked.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Field name.
    pub name: Name,
    /// Byte offset inside the owning aggregate.
    pub offset: usize,
    /// Fixed C-array dimension; 1 for a plain field.
    pub array_dim: usize,
    /// Field kind.
    pub kind: PropertyKind,
    /// Filtering flags.
    pub flags: PropertyFlags,
    /// For `Bool` bitfields: the bit inside the shared byte. `None` means a
    /// whole-byte boolean.
    pub bit_mask: Option<u8>,
    /// Archive version that introduced this field. Older saves simply leave
    /// it at the class default; saves targeting an older version omit it.
    pub min_version: Option<u32>,
}

impl PropertyDescriptor {
    /// Create a plain descriptor (dimension 1, no flags).
    pub fn new(name: impl Into<Name>, offset: usize, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            offset,
            array_dim: 1,
            kind,
            flags: PropertyFlags::NONE,
            bit_mask: None,
            min_version: None,
        }
    }

    /// Set flags.
    #[must_use]
    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set a fixed array dimension (must be >= 1).
    #[must_use]
    pub fn with_array_dim(mut self, dim: usize) -> Self {
        self.array_dim = dim.max(1);
        self
    }

    /// Mark as a boolean bitfield addressed by `mask` within its byte.
    #[must_use]
    pub fn with_bit_mask(mut self, mask: u8) -> Self {
        self.bit_mask = Some(mask);
        self
    }

    /// Gate on an archive version.
    #[must_use]
    pub fn with_min_version(mut self, version: u32) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Size of one element.
    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.kind.element_size()
    }

    /// Total in-place footprint (`element_size * array_dim`).
    #[inline]
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.element_size() * self.array_dim
    }

    /// Occupied byte range inside the owning aggregate.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.offset..self.offset + self.total_size()
    }

    /// True if this property shares its byte as a bitfield.
    #[inline]
    #[must_use]
    pub fn is_bitfield(&self) -> bool {
        self.bit_mask.is_some() && matches!(self.kind, PropertyKind::Bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_ops() {
        let f = PropertyFlags::TRANSIENT | PropertyFlags::DEPRECATED;
        assert!(f.contains(PropertyFlags::TRANSIENT));
        assert!(f.intersects(PropertyFlags::DEPRECATED));
        assert!(!f.contains(PropertyFlags::EDITOR_ONLY));
        assert_eq!(PropertyFlags::from_bits(f.bits()), f);
    }

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(PropertyKind::Byte.element_size(), 1);
        assert_eq!(PropertyKind::Bool.element_size(), 1);
        assert_eq!(PropertyKind::Int.element_size(), 4);
        assert_eq!(PropertyKind::Float.element_size(), 4);
        assert_eq!(PropertyKind::Name.element_size(), 4);
        assert_eq!(PropertyKind::Str.element_size(), 4);
        assert_eq!(PropertyKind::Object.element_size(), 8);
        assert_eq!(PropertyKind::Delegate.element_size(), 12);
    }

    #[test]
    fn test_byte_range_with_dimension() {
        let prop = PropertyDescriptor::new("Samples", 8, PropertyKind::Int).with_array_dim(4);
        assert_eq!(prop.total_size(), 16);
        assert_eq!(prop.byte_range(), 8..24);
    }

    #[test]
    fn test_kind_equality_is_structural_with_struct_identity() {
        use crate::reflect::class::ClassFlags;
        use crate::reflect::registry::TypeRegistry;

        assert_eq!(PropertyKind::Int, PropertyKind::Int);
        assert_ne!(PropertyKind::Int, PropertyKind::Float);
        let a = PropertyKind::Array(Box::new(PropertyDescriptor::new("E", 0, PropertyKind::Int)));
        let b = PropertyKind::Array(Box::new(PropertyDescriptor::new("E", 0, PropertyKind::Int)));
        assert_eq!(a, b);

        // Struct kinds compare by descriptor identity, not class contents.
        let registry = TypeRegistry::new();
        let c1 = registry
            .register_class("KindEqOne", 4, 4, ClassFlags::STRUCT, None)
            .unwrap();
        let c2 = registry
            .register_class("KindEqTwo", 4, 4, ClassFlags::STRUCT, None)
            .unwrap();
        assert_eq!(
            PropertyKind::Struct(Arc::clone(&c1)),
            PropertyKind::Struct(Arc::clone(&c1))
        );
        assert_ne!(PropertyKind::Struct(c1), PropertyKind::Struct(c2));
    }

    #[test]
    fn test_reference_bearing_kinds() {
        assert!(PropertyKind::Object.is_reference_bearing());
        assert!(PropertyKind::Interface.is_reference_bearing());
        assert!(PropertyKind::Delegate.is_reference_bearing());
        assert!(!PropertyKind::Int.is_reference_bearing());
        let arr = PropertyKind::Array(Box::new(PropertyDescriptor::new(
            "Inner",
            0,
            PropertyKind::Object,
        )));
        assert!(arr.is_reference_bearing());
    }
}
