// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance storage: raw property bytes plus the value heap.
//!
//! Fixed-size values live at their descriptor offset inside [`Contents`].
//! Variable-size values (strings, dynamic arrays, maps) live in the
//! [`ValueHeap`] and are addressed from the byte block by a 4-byte slot
//! index. Dynamic-array elements carry their own backing block and heap, so
//! nested aggregates recurse without sharing slot namespaces.

use crate::name::Name;
use crate::object::arena::ObjectHandle;
use crate::object::value::{self, PropertyValue, ValueError};
use crate::reflect::class::{ClassDescriptor, ClassFlags};
use crate::reflect::property::{PropertyDescriptor, PropertyKind};
use crate::reflect::ReflectError;
use std::ops::BitOr;
use std::sync::Arc;

// =======================================================================
// Object flags
// =======================================================================

/// Per-object lifecycle flags, mostly driven by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ObjectFlags(u32);

impl ObjectFlags {
    /// No flags set.
    pub const NONE: ObjectFlags = ObjectFlags(0);
    /// Export created, payload not yet deserialized.
    pub const NEED_LOAD: ObjectFlags = ObjectFlags(1 << 0);
    /// Deserialized, post-load hook not yet run.
    pub const NEED_POST_LOAD: ObjectFlags = ObjectFlags(1 << 1);
    /// Currently owned by an in-flight async package.
    pub const ASYNC_LOADING: ObjectFlags = ObjectFlags(1 << 2);
    /// Marked for destruction; resolves but must not be re-referenced.
    pub const PENDING_KILL: ObjectFlags = ObjectFlags(1 << 3);
    /// Never saved into packages.
    pub const TRANSIENT: ObjectFlags = ObjectFlags(1 << 4);

    /// True if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub fn contains(self, other: ObjectFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set flags in place.
    #[inline]
    pub fn insert(&mut self, other: ObjectFlags) {
        self.0 |= other.0;
    }

    /// Clear flags in place.
    #[inline]
    pub fn remove(&mut self, other: ObjectFlags) {
        self.0 &= !other.0;
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits.
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        ObjectFlags(bits)
    }
}

impl BitOr for ObjectFlags {
    type Output = ObjectFlags;
    fn bitor(self, rhs: ObjectFlags) -> ObjectFlags {
        ObjectFlags(self.0 | rhs.0)
    }
}

// =======================================================================
// Value heap
// =======================================================================

/// Backing storage for variable-size property values of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueHeap {
    pub strings: Vec<String>,
    pub arrays: Vec<DynArray>,
    pub maps: Vec<DynMap>,
}

/// A dynamic array: contiguous element bytes plus its own heap for the
/// elements' variable-size values.
#[derive(Debug, Clone, PartialEq)]
pub struct DynArray {
    pub elem_size: usize,
    pub data: Vec<u8>,
    pub heap: ValueHeap,
}

impl DynArray {
    /// Empty array of `elem_size`-byte elements.
    #[must_use]
    pub fn new(elem_size: usize) -> Self {
        Self {
            elem_size: elem_size.max(1),
            data: Vec::new(),
            heap: ValueHeap::default(),
        }
    }

    /// Element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.elem_size
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a default-initialized element and return its byte base.
    pub fn push_default(&mut self, inner: &PropertyDescriptor) -> usize {
        let base = self.data.len();
        self.data.resize(base + self.elem_size, 0);
        init_element(&mut self.data, &mut self.heap, &inner.kind, base);
        base
    }

    /// Drop all elements and their heap values.
    pub fn clear(&mut self) {
        self.data.clear();
        self.heap = ValueHeap::default();
    }
}

/// One map entry; key and value are independent single-element frames.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Contents,
    pub value: Contents,
}

/// A key/value map, stored as an entry list (insertion order preserved,
/// which keeps saves deterministic).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynMap {
    pub entries: Vec<MapEntry>,
}

// =======================================================================
// Contents
// =======================================================================

/// One storage frame: a byte block plus the heap its slot indices address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contents {
    pub data: Vec<u8>,
    pub heap: ValueHeap,
}

impl Contents {
    /// Default-initialized frame for a full property chain of `size` bytes.
    ///
    /// Every heap-addressed field gets a live slot up front, so readers
    /// never see an unwired slot index.
    #[must_use]
    pub fn new_for_props(chain: &[Arc<PropertyDescriptor>], size: usize) -> Self {
        let mut contents = Contents {
            data: vec![0; size],
            heap: ValueHeap::default(),
        };
        init_block(&mut contents.data, &mut contents.heap, chain, 0);
        contents
    }

    /// Single-element frame for one inner descriptor (map keys/values).
    #[must_use]
    pub fn new_for_descriptor(desc: &PropertyDescriptor) -> Self {
        let mut contents = Contents {
            data: vec![0; desc.element_size()],
            heap: ValueHeap::default(),
        };
        init_element(&mut contents.data, &mut contents.heap, &desc.kind, 0);
        contents
    }
}

fn init_block(
    data: &mut Vec<u8>,
    heap: &mut ValueHeap,
    chain: &[Arc<PropertyDescriptor>],
    base: usize,
) {
    for prop in chain {
        for index in 0..prop.array_dim {
            init_element(
                data,
                heap,
                &prop.kind,
                base + prop.offset + index * prop.element_size(),
            );
        }
    }
}

fn init_element(data: &mut Vec<u8>, heap: &mut ValueHeap, kind: &PropertyKind, offset: usize) {
    match kind {
        PropertyKind::Str => {
            let slot = heap.strings.len() as u32;
            heap.strings.push(String::new());
            write_slot(data, offset, slot);
        }
        PropertyKind::Array(inner) => {
            let slot = heap.arrays.len() as u32;
            heap.arrays.push(DynArray::new(inner.element_size()));
            write_slot(data, offset, slot);
        }
        PropertyKind::Map { .. } => {
            let slot = heap.maps.len() as u32;
            heap.maps.push(DynMap::default());
            write_slot(data, offset, slot);
        }
        PropertyKind::Struct(class) => {
            // Nested struct fields share the owner's frame.
            for field in class.property_link() {
                for index in 0..field.array_dim {
                    init_element(
                        data,
                        heap,
                        &field.kind,
                        offset + field.offset + index * field.element_size(),
                    );
                }
            }
        }
        _ => {}
    }
}

fn write_slot(data: &mut [u8], offset: usize, slot: u32) {
    if offset + 4 <= data.len() {
        data[offset..offset + 4].copy_from_slice(&slot.to_le_bytes());
    }
}

// =======================================================================
// Object instance
// =======================================================================

/// One live object: identity plus its storage frame.
#[derive(Debug, Clone)]
pub struct ObjectInstance {
    /// Object name, unique within its package.
    pub name: Name,
    /// Owning package name.
    pub package: Name,
    /// Runtime type.
    pub class: Arc<ClassDescriptor>,
    /// Enclosing object (subobject chains), or null.
    pub outer: ObjectHandle,
    /// Lifecycle flags.
    pub flags: ObjectFlags,
    /// Stable cross-package GUID (zero when absent). Persisted with the
    /// export and used as a resolution fallback for moved objects.
    pub guid: [u8; 16],
    /// Property storage.
    pub contents: Contents,
}

impl ObjectInstance {
    /// Construct a default-initialized instance of a linked class.
    ///
    /// The class must be linked (its default frame is cloned) and must not
    /// be abstract.
    pub fn new(
        name: Name,
        package: Name,
        class: &Arc<ClassDescriptor>,
        outer: ObjectHandle,
    ) -> Result<Self, ReflectError> {
        if class.flags().contains(ClassFlags::ABSTRACT) {
            return Err(ReflectError::Layout {
                class: class.name(),
                reason: format!("cannot instantiate abstract class for object '{}'", name),
            });
        }
        let contents = match class.default_contents() {
            Some(defaults) => (*defaults).clone(),
            None => {
                return Err(ReflectError::Layout {
                    class: class.name(),
                    reason: "class must be linked before instantiation".into(),
                })
            }
        };
        Ok(Self {
            name,
            package,
            class: Arc::clone(class),
            outer,
            flags: ObjectFlags::NONE,
            guid: [0; 16],
            contents,
        })
    }

    /// Read a property by name (element 0 of fixed arrays; use
    /// [`get_index`](Self::get_index) for the rest).
    pub fn get(&self, name: impl Into<Name>) -> Result<PropertyValue, ValueError> {
        let name = name.into();
        let prop = self
            .class
            .find_property(name)
            .ok_or(ValueError::UnknownProperty { name })?;
        value::read_field_value(&self.contents.data, &self.contents.heap, &prop, 0)
    }

    /// Read one element of a fixed-array property.
    pub fn get_index(&self, name: impl Into<Name>, index: usize) -> Result<PropertyValue, ValueError> {
        let name = name.into();
        let prop = self
            .class
            .find_property(name)
            .ok_or(ValueError::UnknownProperty { name })?;
        if index >= prop.array_dim {
            return Err(ValueError::IndexOutOfRange {
                property: name,
                index,
                dim: prop.array_dim,
            });
        }
        value::read_value(&self.contents.data, &self.contents.heap, &prop, 0, index)
    }

    /// Write a property by name. Fixed-array properties take a
    /// [`PropertyValue::Array`] of exactly `array_dim` elements.
    pub fn set(&mut self, name: impl Into<Name>, value: &PropertyValue) -> Result<(), ValueError> {
        let name = name.into();
        let prop = self
            .class
            .find_property(name)
            .ok_or(ValueError::UnknownProperty { name })?;
        value::write_field_value(
            &mut self.contents.data,
            &mut self.contents.heap,
            &prop,
            0,
            value,
        )
    }

    /// Write one element of a fixed-array property.
    pub fn set_index(
        &mut self,
        name: impl Into<Name>,
        index: usize,
        value: &PropertyValue,
    ) -> Result<(), ValueError> {
        let name = name.into();
        let prop = self
            .class
            .find_property(name)
            .ok_or(ValueError::UnknownProperty { name })?;
        if index >= prop.array_dim {
            return Err(ValueError::IndexOutOfRange {
                property: name,
                index,
                dim: prop.array_dim,
            });
        }
        value::write_value(
            &mut self.contents.data,
            &mut self.contents.heap,
            &prop,
            0,
            index,
            value,
        )
    }

    /// Fully qualified `Package.Object` path for diagnostics.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}
