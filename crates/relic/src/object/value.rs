// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed value access over raw instance storage.
//!
//! [`PropertyValue`] is the boxed, owner-independent form of one property:
//! reading copies out of the frame, writing copies in. The serializer and
//! the delta-from-default comparison both go through this module, so the
//! byte-level encoding of each kind lives here and nowhere else.

use crate::name::Name;
use crate::object::arena::ObjectHandle;
use crate::object::instance::{Contents, MapEntry, ValueHeap};
use crate::reflect::property::{PropertyDescriptor, PropertyKind};
use std::fmt;

/// One property value, detached from any storage frame.
///
/// `Struct` holds per-field values in property-link order. A fixed-array
/// property reads/writes as an `Array` of exactly `array_dim` elements.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Byte(u8),
    Int(i32),
    Bool(bool),
    Float(f32),
    Name(Name),
    Str(String),
    Object(ObjectHandle),
    Interface(ObjectHandle),
    Delegate {
        target: ObjectHandle,
        function: Name,
    },
    Struct(Vec<PropertyValue>),
    Array(Vec<PropertyValue>),
    Map(Vec<(PropertyValue, PropertyValue)>),
}

impl PropertyValue {
    /// Variant name for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Byte(_) => "Byte",
            Self::Int(_) => "Int",
            Self::Bool(_) => "Bool",
            Self::Float(_) => "Float",
            Self::Name(_) => "Name",
            Self::Str(_) => "Str",
            Self::Object(_) => "Object",
            Self::Interface(_) => "Interface",
            Self::Delegate { .. } => "Delegate",
            Self::Struct(_) => "Struct",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
        }
    }
}

/// Value access errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Property name not found on the class.
    UnknownProperty { name: Name },
    /// Value variant does not match the property kind.
    KindMismatch {
        property: Name,
        expected: &'static str,
        found: &'static str,
    },
    /// Read or write past the end of the storage frame.
    OutOfBounds {
        property: Name,
        offset: usize,
        len: usize,
    },
    /// A heap slot index points at nothing.
    BadSlot { property: Name, slot: usize },
    /// Fixed-array index outside `array_dim`.
    IndexOutOfRange {
        property: Name,
        index: usize,
        dim: usize,
    },
    /// Struct value with the wrong number of field values.
    Arity {
        property: Name,
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::UnknownProperty { name } => write!(f, "unknown property '{}'", name),
            ValueError::KindMismatch {
                property,
                expected,
                found,
            } => write!(
                f,
                "property '{}' expects {}, got {}",
                property, expected, found
            ),
            ValueError::OutOfBounds {
                property,
                offset,
                len,
            } => write!(
                f,
                "property '{}' access at offset {} beyond frame of {} bytes",
                property, offset, len
            ),
            ValueError::BadSlot { property, slot } => {
                write!(f, "property '{}' heap slot {} is unwired", property, slot)
            }
            ValueError::IndexOutOfRange {
                property,
                index,
                dim,
            } => write!(
                f,
                "property '{}' index {} outside dimension {}",
                property, index, dim
            ),
            ValueError::Arity {
                property,
                expected,
                got,
            } => write!(
                f,
                "property '{}' expects {} field values, got {}",
                property, expected, got
            ),
        }
    }
}

impl std::error::Error for ValueError {}

// =======================================================================
// Reading
// =======================================================================

/// Read a whole property: fixed arrays come back as `Array(dim)`.
pub fn read_field_value(
    data: &[u8],
    heap: &ValueHeap,
    desc: &PropertyDescriptor,
    base: usize,
) -> Result<PropertyValue, ValueError> {
    if desc.array_dim > 1 {
        let mut items = Vec::with_capacity(desc.array_dim);
        for index in 0..desc.array_dim {
            items.push(read_value(data, heap, desc, base, index)?);
        }
        return Ok(PropertyValue::Array(items));
    }
    read_value(data, heap, desc, base, 0)
}

/// Read one element of a property at `base + offset + index * element_size`.
pub fn read_value(
    data: &[u8],
    heap: &ValueHeap,
    desc: &PropertyDescriptor,
    base: usize,
    index: usize,
) -> Result<PropertyValue, ValueError> {
    let off = base + desc.offset + index * desc.element_size();
    match &desc.kind {
        PropertyKind::Byte => Ok(PropertyValue::Byte(read_u8(data, off, desc.name)?)),
        PropertyKind::Int => Ok(PropertyValue::Int(read_u32(data, off, desc.name)? as i32)),
        PropertyKind::Bool => {
            let byte = read_u8(data, off, desc.name)?;
            let set = match desc.bit_mask {
                Some(mask) => byte & mask != 0,
                None => byte != 0,
            };
            Ok(PropertyValue::Bool(set))
        }
        PropertyKind::Float => Ok(PropertyValue::Float(f32::from_bits(read_u32(
            data, off, desc.name,
        )?))),
        PropertyKind::Name => {
            let raw = read_u32(data, off, desc.name)?;
            Ok(PropertyValue::Name(
                Name::from_index(raw).unwrap_or(Name::NONE),
            ))
        }
        PropertyKind::Str => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let text = heap.strings.get(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            Ok(PropertyValue::Str(text.clone()))
        }
        PropertyKind::Object => Ok(PropertyValue::Object(ObjectHandle::from_bits(read_u64(
            data, off, desc.name,
        )?))),
        PropertyKind::Interface => Ok(PropertyValue::Interface(ObjectHandle::from_bits(
            read_u64(data, off, desc.name)?,
        ))),
        PropertyKind::Delegate => {
            let target = ObjectHandle::from_bits(read_u64(data, off, desc.name)?);
            let raw = read_u32(data, off + 8, desc.name)?;
            Ok(PropertyValue::Delegate {
                target,
                function: Name::from_index(raw).unwrap_or(Name::NONE),
            })
        }
        PropertyKind::Struct(class) => {
            let mut fields = Vec::new();
            for field in class.property_link() {
                fields.push(read_field_value(data, heap, &field, off)?);
            }
            Ok(PropertyValue::Struct(fields))
        }
        PropertyKind::Array(inner) => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let array = heap.arrays.get(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            let mut items = Vec::with_capacity(array.len());
            for k in 0..array.len() {
                items.push(read_value(
                    &array.data,
                    &array.heap,
                    inner,
                    k * array.elem_size,
                    0,
                )?);
            }
            Ok(PropertyValue::Array(items))
        }
        PropertyKind::Map { key, value } => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let map = heap.maps.get(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            let mut entries = Vec::with_capacity(map.entries.len());
            for entry in &map.entries {
                entries.push((
                    read_field_value(&entry.key.data, &entry.key.heap, key, 0)?,
                    read_field_value(&entry.value.data, &entry.value.heap, value, 0)?,
                ));
            }
            Ok(PropertyValue::Map(entries))
        }
    }
}

// =======================================================================
// Writing
// =======================================================================

/// Write a whole property: fixed arrays take `Array(dim)`.
pub fn write_field_value(
    data: &mut Vec<u8>,
    heap: &mut ValueHeap,
    desc: &PropertyDescriptor,
    base: usize,
    value: &PropertyValue,
) -> Result<(), ValueError> {
    if desc.array_dim > 1 {
        let items = match value {
            PropertyValue::Array(items) => items,
            other => {
                return Err(ValueError::KindMismatch {
                    property: desc.name,
                    expected: "Array (fixed dimension)",
                    found: other.kind_name(),
                })
            }
        };
        if items.len() != desc.array_dim {
            return Err(ValueError::Arity {
                property: desc.name,
                expected: desc.array_dim,
                got: items.len(),
            });
        }
        for (index, item) in items.iter().enumerate() {
            write_value(data, heap, desc, base, index, item)?;
        }
        return Ok(());
    }
    write_value(data, heap, desc, base, 0, value)
}

/// Write one element of a property.
pub fn write_value(
    data: &mut Vec<u8>,
    heap: &mut ValueHeap,
    desc: &PropertyDescriptor,
    base: usize,
    index: usize,
    value: &PropertyValue,
) -> Result<(), ValueError> {
    let off = base + desc.offset + index * desc.element_size();
    match (&desc.kind, value) {
        (PropertyKind::Byte, PropertyValue::Byte(v)) => write_u8(data, off, *v, desc.name),
        (PropertyKind::Int, PropertyValue::Int(v)) => write_u32(data, off, *v as u32, desc.name),
        (PropertyKind::Bool, PropertyValue::Bool(v)) => {
            let byte = read_u8(data, off, desc.name)?;
            let byte = match desc.bit_mask {
                Some(mask) => {
                    if *v {
                        byte | mask
                    } else {
                        byte & !mask
                    }
                }
                None => u8::from(*v),
            };
            write_u8(data, off, byte, desc.name)
        }
        (PropertyKind::Float, PropertyValue::Float(v)) => {
            write_u32(data, off, v.to_bits(), desc.name)
        }
        (PropertyKind::Name, PropertyValue::Name(v)) => write_u32(data, off, v.index(), desc.name),
        (PropertyKind::Str, PropertyValue::Str(v)) => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let text = heap.strings.get_mut(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            v.clone_into(text);
            Ok(())
        }
        (PropertyKind::Object, PropertyValue::Object(v)) => {
            write_u64(data, off, v.bits(), desc.name)
        }
        (PropertyKind::Interface, PropertyValue::Interface(v)) => {
            write_u64(data, off, v.bits(), desc.name)
        }
        (PropertyKind::Delegate, PropertyValue::Delegate { target, function }) => {
            write_u64(data, off, target.bits(), desc.name)?;
            write_u32(data, off + 8, function.index(), desc.name)
        }
        (PropertyKind::Struct(class), PropertyValue::Struct(fields)) => {
            let chain = class.property_link();
            if fields.len() != chain.len() {
                return Err(ValueError::Arity {
                    property: desc.name,
                    expected: chain.len(),
                    got: fields.len(),
                });
            }
            for (field, value) in chain.iter().zip(fields) {
                write_field_value(data, heap, field, off, value)?;
            }
            Ok(())
        }
        (PropertyKind::Array(inner), PropertyValue::Array(items)) => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let array = heap.arrays.get_mut(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            array.clear();
            for item in items {
                let elem_base = array.push_default(inner);
                write_value(&mut array.data, &mut array.heap, inner, elem_base, 0, item)?;
            }
            Ok(())
        }
        (PropertyKind::Map { key, value: val }, PropertyValue::Map(pairs)) => {
            let slot = read_u32(data, off, desc.name)? as usize;
            let map = heap.maps.get_mut(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            map.entries.clear();
            for (k, v) in pairs {
                let mut entry = MapEntry {
                    key: Contents::new_for_descriptor(key),
                    value: Contents::new_for_descriptor(val),
                };
                write_field_value(&mut entry.key.data, &mut entry.key.heap, key, 0, k)?;
                write_field_value(&mut entry.value.data, &mut entry.value.heap, val, 0, v)?;
                map.entries.push(entry);
            }
            Ok(())
        }
        (kind, other) => Err(ValueError::KindMismatch {
            property: desc.name,
            expected: kind.tag_name(),
            found: other.kind_name(),
        }),
    }
}

// =======================================================================
// Byte helpers
// =======================================================================

/// Raw heap-slot index at `off` (serializer fast path).
pub(crate) fn slot_index(data: &[u8], off: usize, property: Name) -> Result<usize, ValueError> {
    read_u32(data, off, property).map(|v| v as usize)
}

fn read_u8(data: &[u8], off: usize, property: Name) -> Result<u8, ValueError> {
    data.get(off).copied().ok_or(ValueError::OutOfBounds {
        property,
        offset: off,
        len: data.len(),
    })
}

fn read_u32(data: &[u8], off: usize, property: Name) -> Result<u32, ValueError> {
    if off + 4 > data.len() {
        return Err(ValueError::OutOfBounds {
            property,
            offset: off,
            len: data.len(),
        });
    }
    let mut bits = [0u8; 4];
    bits.copy_from_slice(&data[off..off + 4]);
    Ok(u32::from_le_bytes(bits))
}

fn read_u64(data: &[u8], off: usize, property: Name) -> Result<u64, ValueError> {
    if off + 8 > data.len() {
        return Err(ValueError::OutOfBounds {
            property,
            offset: off,
            len: data.len(),
        });
    }
    let mut bits = [0u8; 8];
    bits.copy_from_slice(&data[off..off + 8]);
    Ok(u64::from_le_bytes(bits))
}

fn write_u8(data: &mut [u8], off: usize, v: u8, property: Name) -> Result<(), ValueError> {
    let len = data.len();
    match data.get_mut(off) {
        Some(byte) => {
            *byte = v;
            Ok(())
        }
        None => Err(ValueError::OutOfBounds {
            property,
            offset: off,
            len,
        }),
    }
}

fn write_u32(data: &mut [u8], off: usize, v: u32, property: Name) -> Result<(), ValueError> {
    if off + 4 > data.len() {
        return Err(ValueError::OutOfBounds {
            property,
            offset: off,
            len: data.len(),
        });
    }
    data[off..off + 4].copy_from_slice(&v.to_le_bytes());
    Ok(())
}

fn write_u64(data: &mut [u8], off: usize, v: u64, property: Name) -> Result<(), ValueError> {
    if off + 8 > data.len() {
        return Err(ValueError::OutOfBounds {
            property,
            offset: off,
            len: data.len(),
        });
    }
    data[off..off + 8].copy_from_slice(&v.to_le_bytes());
    Ok(())
}
