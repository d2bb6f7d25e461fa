// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagged-property object format.
//!
//! Each serialized property is framed as `(name, kind, array index, size,
//! payload)` and the stream ends with the `None` name sentinel, so a reader
//! can skip anything it does not recognize by size alone. That framing is
//! what buys schema evolution in both directions: unknown disk properties
//! are skipped, missing disk properties keep their class default.
//!
//! Save is delta-from-default: a property equal to its class default is not
//! written unless the archive forces full binary serialization or is
//! serializing the defaults themselves.

use crate::archive::{ArchiveError, ArchiveOptions, ArchiveResult, ReadLinker, Writer, WriteLinker};
use crate::archive::cursor::Reader;
use crate::name::Name;
use crate::object::instance::{Contents, MapEntry, ValueHeap};
use crate::object::value::{self, PropertyValue, ValueError};
use crate::reflect::class::{ClassDescriptor, ClassFlags};
use crate::reflect::property::{PropertyDescriptor, PropertyFlags, PropertyKind};
use std::sync::Arc;

/// Counters from one tagged-property load, surfaced for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Properties decoded into the instance.
    pub properties: usize,
    /// Disk properties with no counterpart on the current class.
    pub unknown: usize,
    /// Disk properties whose kind tag disagrees with the current class.
    pub kind_mismatches: usize,
    /// Payload bytes left unconsumed inside otherwise-valid property frames.
    pub residual_bytes: usize,
}

/// Save filter: decides whether a property is written at all.
///
/// Editor-only filtering always wins; deprecated properties are written
/// only for transacting or forced-binary archives (they still load, for
/// data migration).
#[must_use]
pub fn should_serialize(prop: &PropertyDescriptor, options: &ArchiveOptions) -> bool {
    if prop.flags.contains(PropertyFlags::NATIVE) {
        return false;
    }
    if options.persistent && prop.flags.contains(PropertyFlags::TRANSIENT) {
        return false;
    }
    if options.filter_editor_only && prop.flags.contains(PropertyFlags::EDITOR_ONLY) {
        return false;
    }
    if options.transacting && prop.flags.contains(PropertyFlags::DUPLICATE_TRANSIENT) {
        return false;
    }
    if prop.flags.contains(PropertyFlags::DEPRECATED)
        && !(options.transacting || options.binary_properties)
    {
        return false;
    }
    if let Some(min) = prop.min_version {
        if options.version < min {
            return false;
        }
    }
    true
}

/// Write one object's property stream (terminated by the sentinel).
pub fn save_tagged(
    writer: &mut Writer,
    linker: &mut dyn WriteLinker,
    class: &ClassDescriptor,
    contents: &Contents,
) -> ArchiveResult<()> {
    let chain = class.property_link();
    let defaults = class.default_contents();
    let default_frame = defaults.as_ref().map(|d| (&d.data[..], &d.heap, 0usize));
    save_block(
        writer,
        linker,
        &chain,
        &contents.data,
        &contents.heap,
        0,
        default_frame,
    )?;
    let sentinel = linker.map_name(Name::NONE);
    writer.write_u32(sentinel);
    Ok(())
}

/// Read one object's property stream into `contents`.
///
/// Unknown and kind-mismatched disk properties are skipped by size and
/// counted; a stream that ends before its own framing says it should is a
/// [`ArchiveError::Corrupt`].
pub fn load_tagged(
    reader: &mut Reader<'_>,
    linker: &mut dyn ReadLinker,
    class: &ClassDescriptor,
    contents: &mut Contents,
) -> ArchiveResult<LoadStats> {
    let mut stats = LoadStats::default();
    load_block(
        reader,
        linker,
        class,
        &mut contents.data,
        &mut contents.heap,
        0,
        &mut stats,
    )?;
    Ok(stats)
}

fn save_block(
    writer: &mut Writer,
    linker: &mut dyn WriteLinker,
    chain: &[Arc<PropertyDescriptor>],
    data: &[u8],
    heap: &ValueHeap,
    base: usize,
    defaults: Option<(&[u8], &ValueHeap, usize)>,
) -> ArchiveResult<()> {
    let options = *writer.options();
    let compare_defaults = !options.binary_properties && !options.serializing_defaults;
    for prop in chain {
        if !should_serialize(prop, &options) {
            continue;
        }
        for index in 0..prop.array_dim {
            if compare_defaults {
                if let Some((def_data, def_heap, def_base)) = defaults {
                    let live = value::read_value(data, heap, prop, base, index)?;
                    let default = value::read_value(def_data, def_heap, prop, def_base, index)?;
                    if live == default {
                        continue;
                    }
                }
            }
            let name_index = linker.map_name(prop.name);
            writer.write_u32(name_index);
            writer.write_u8(prop.kind.tag());
            writer.write_compact_index(index as i32);
            if matches!(prop.kind, PropertyKind::Bool) {
                // Booleans travel inside the tag itself; no payload.
                let live = value::read_value(data, heap, prop, base, index)?;
                let set = matches!(live, PropertyValue::Bool(true));
                writer.write_u8(u8::from(set));
                writer.write_u32(0);
                continue;
            }
            let mut scratch = Writer::new(options);
            write_element(&mut scratch, linker, prop, data, heap, base, index)?;
            let payload = scratch.into_bytes();
            writer.write_u32(payload.len() as u32);
            writer.write_bytes(&payload);
        }
    }
    Ok(())
}

fn load_block(
    reader: &mut Reader<'_>,
    linker: &mut dyn ReadLinker,
    class: &ClassDescriptor,
    data: &mut Vec<u8>,
    heap: &mut ValueHeap,
    base: usize,
    stats: &mut LoadStats,
) -> ArchiveResult<()> {
    loop {
        let tag_offset = reader.tell();
        let name_index = reader.read_u32()?;
        let name = linker.name_at(name_index).ok_or(ArchiveError::Corrupt {
            offset: tag_offset,
            reason: format!("name index {} outside the name table", name_index),
        })?;
        if name.is_none() {
            return Ok(());
        }
        let kind_tag = reader.read_u8()?;
        let array_index = reader.read_compact_index()?;
        let bool_value = if kind_tag == PropertyKind::Bool.tag() {
            Some(reader.read_u8()? != 0)
        } else {
            None
        };
        let size = reader.read_u32()? as usize;

        let prop = match class.find_property(name) {
            Some(prop) => prop,
            None => {
                // Forward compatibility: newer saves may carry properties
                // this class no longer declares.
                log::warn!(
                    "class '{}': skipping unknown property '{}' ({} bytes)",
                    class.name(),
                    name,
                    size
                );
                reader.skip(size)?;
                stats.unknown += 1;
                continue;
            }
        };
        if prop.kind.tag() != kind_tag {
            log::warn!(
                "class '{}': property '{}' kind mismatch (disk tag {}, expected {}); skipping",
                class.name(),
                name,
                kind_tag,
                prop.kind.tag_name()
            );
            reader.skip(size)?;
            stats.kind_mismatches += 1;
            continue;
        }
        if array_index < 0 || array_index as usize >= prop.array_dim {
            log::warn!(
                "class '{}': property '{}' array index {} outside dimension {}; skipping",
                class.name(),
                name,
                array_index,
                prop.array_dim
            );
            reader.skip(size)?;
            stats.kind_mismatches += 1;
            continue;
        }
        if reader.options().filter_editor_only && prop.flags.contains(PropertyFlags::EDITOR_ONLY) {
            reader.skip(size)?;
            continue;
        }
        let index = array_index as usize;

        if let Some(set) = bool_value {
            value::write_value(data, heap, &prop, base, index, &PropertyValue::Bool(set))?;
            reader.skip(size)?;
            stats.properties += 1;
            continue;
        }

        // Decode inside a sub-cursor bounded by the frame's own size, so a
        // malformed payload can never eat the next property's tag.
        let payload_offset = reader.tell();
        let payload = reader.read_bytes(size)?;
        let mut sub = Reader::new(payload, *reader.options());
        read_element(&mut sub, linker, &prop, data, heap, base, index, stats)?;
        if !sub.is_eof() {
            log::warn!(
                "class '{}': property '{}' left {} residual payload bytes at offset {}",
                class.name(),
                name,
                sub.remaining(),
                payload_offset
            );
            stats.residual_bytes += sub.remaining();
        }
        stats.properties += 1;
    }
}

fn write_element(
    writer: &mut Writer,
    linker: &mut dyn WriteLinker,
    desc: &PropertyDescriptor,
    data: &[u8],
    heap: &ValueHeap,
    base: usize,
    index: usize,
) -> ArchiveResult<()> {
    let off = base + desc.offset + index * desc.element_size();
    match &desc.kind {
        PropertyKind::Struct(class) => {
            let chain = class.property_link();
            // Atomic structs always serialize whole.
            let defaults = if class.flags().contains(ClassFlags::ATOMIC_SERIALIZE) {
                None
            } else {
                class.default_contents()
            };
            let default_frame = defaults.as_ref().map(|d| (&d.data[..], &d.heap, 0usize));
            save_block(writer, linker, &chain, data, heap, off, default_frame)?;
            let sentinel = linker.map_name(Name::NONE);
            writer.write_u32(sentinel);
            Ok(())
        }
        PropertyKind::Array(inner) => {
            let slot = value::slot_index(data, off, desc.name)?;
            let array = heap.arrays.get(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            writer.write_compact_index(array.len() as i32);
            for k in 0..array.len() {
                write_element(
                    writer,
                    linker,
                    inner,
                    &array.data,
                    &array.heap,
                    k * array.elem_size,
                    0,
                )?;
            }
            Ok(())
        }
        PropertyKind::Map { key, value: val } => {
            let slot = value::slot_index(data, off, desc.name)?;
            let map = heap.maps.get(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            writer.write_compact_index(map.entries.len() as i32);
            for entry in &map.entries {
                write_element(writer, linker, key, &entry.key.data, &entry.key.heap, 0, 0)?;
                write_element(
                    writer,
                    linker,
                    val,
                    &entry.value.data,
                    &entry.value.heap,
                    0,
                    0,
                )?;
            }
            Ok(())
        }
        _ => {
            match value::read_value(data, heap, desc, base, index)? {
                PropertyValue::Byte(v) => writer.write_u8(v),
                PropertyValue::Int(v) => writer.write_i32(v),
                // Raw element position (array/map member): one byte.
                PropertyValue::Bool(v) => writer.write_u8(u8::from(v)),
                PropertyValue::Float(v) => writer.write_f32(v),
                PropertyValue::Name(n) => {
                    let idx = linker.map_name(n);
                    writer.write_u32(idx);
                }
                PropertyValue::Str(s) => writer.write_string(&s),
                PropertyValue::Object(h) | PropertyValue::Interface(h) => {
                    let idx = linker.map_object(h);
                    writer.write_compact_index(idx);
                }
                PropertyValue::Delegate { target, function } => {
                    let idx = linker.map_object(target);
                    writer.write_compact_index(idx);
                    let fn_idx = linker.map_name(function);
                    writer.write_u32(fn_idx);
                }
                PropertyValue::Struct(_) | PropertyValue::Array(_) | PropertyValue::Map(_) => {
                    unreachable!("aggregate kinds are handled frame-wise")
                }
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn read_element(
    reader: &mut Reader<'_>,
    linker: &mut dyn ReadLinker,
    desc: &PropertyDescriptor,
    data: &mut Vec<u8>,
    heap: &mut ValueHeap,
    base: usize,
    index: usize,
    stats: &mut LoadStats,
) -> ArchiveResult<()> {
    let off = base + desc.offset + index * desc.element_size();
    match &desc.kind {
        PropertyKind::Struct(class) => load_block(reader, linker, class, data, heap, off, stats),
        PropertyKind::Array(inner) => {
            let count_offset = reader.tell();
            let count = reader.read_compact_index()?;
            if count < 0 || count as usize > reader.remaining() {
                return Err(ArchiveError::Corrupt {
                    offset: count_offset,
                    reason: format!("array count {} exceeds stream", count),
                });
            }
            let slot = value::slot_index(data, off, desc.name)?;
            let array = heap.arrays.get_mut(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            array.clear();
            for _ in 0..count {
                let elem_base = array.push_default(inner);
                read_element(
                    reader,
                    linker,
                    inner,
                    &mut array.data,
                    &mut array.heap,
                    elem_base,
                    0,
                    stats,
                )?;
            }
            Ok(())
        }
        PropertyKind::Map { key, value: val } => {
            let count_offset = reader.tell();
            let count = reader.read_compact_index()?;
            if count < 0 || count as usize > reader.remaining() {
                return Err(ArchiveError::Corrupt {
                    offset: count_offset,
                    reason: format!("map count {} exceeds stream", count),
                });
            }
            let slot = value::slot_index(data, off, desc.name)?;
            let map = heap.maps.get_mut(slot).ok_or(ValueError::BadSlot {
                property: desc.name,
                slot,
            })?;
            map.entries.clear();
            for _ in 0..count {
                let mut entry = MapEntry {
                    key: Contents::new_for_descriptor(key),
                    value: Contents::new_for_descriptor(val),
                };
                read_element(
                    reader,
                    linker,
                    key,
                    &mut entry.key.data,
                    &mut entry.key.heap,
                    0,
                    0,
                    stats,
                )?;
                read_element(
                    reader,
                    linker,
                    val,
                    &mut entry.value.data,
                    &mut entry.value.heap,
                    0,
                    0,
                    stats,
                )?;
                map.entries.push(entry);
            }
            Ok(())
        }
        scalar => {
            let decoded = match scalar {
                PropertyKind::Byte => PropertyValue::Byte(reader.read_u8()?),
                PropertyKind::Int => PropertyValue::Int(reader.read_i32()?),
                PropertyKind::Bool => PropertyValue::Bool(reader.read_u8()? != 0),
                PropertyKind::Float => PropertyValue::Float(reader.read_f32()?),
                PropertyKind::Name => {
                    let tag_offset = reader.tell();
                    let idx = reader.read_u32()?;
                    let name = linker.name_at(idx).ok_or(ArchiveError::Corrupt {
                        offset: tag_offset,
                        reason: format!("name index {} outside the name table", idx),
                    })?;
                    PropertyValue::Name(name)
                }
                PropertyKind::Str => PropertyValue::Str(reader.read_string()?),
                PropertyKind::Object => {
                    PropertyValue::Object(linker.object_at(reader.read_compact_index()?))
                }
                PropertyKind::Interface => {
                    PropertyValue::Interface(linker.object_at(reader.read_compact_index()?))
                }
                PropertyKind::Delegate => {
                    let target = linker.object_at(reader.read_compact_index()?);
                    let tag_offset = reader.tell();
                    let idx = reader.read_u32()?;
                    let function = linker.name_at(idx).ok_or(ArchiveError::Corrupt {
                        offset: tag_offset,
                        reason: format!("name index {} outside the name table", idx),
                    })?;
                    PropertyValue::Delegate { target, function }
                }
                _ => unreachable!("aggregate kinds are handled above"),
            };
            value::write_value(data, heap, desc, base, index, &decoded)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::LooseLinker;
    use crate::reflect::class::ClassFlags;
    use crate::Name;

    fn linked_class(name: &str, size: usize, props: Vec<PropertyDescriptor>) -> Arc<ClassDescriptor> {
        let class = Arc::new(ClassDescriptor::new(
            Name::intern(name),
            size,
            4,
            ClassFlags::NONE,
            None,
        ));
        for prop in props {
            class.add_property(prop).unwrap();
        }
        class.link().unwrap();
        class
    }

    fn roundtrip(class: &Arc<ClassDescriptor>, contents: &Contents) -> (Contents, LoadStats) {
        let mut writer = Writer::new(ArchiveOptions::default());
        let mut linker = LooseLinker;
        save_tagged(&mut writer, &mut linker, class, contents).unwrap();
        let bytes = writer.into_bytes();
        let mut fresh = (*class.default_contents().unwrap()).clone();
        let mut reader = Reader::new(&bytes, ArchiveOptions::default());
        let stats = load_tagged(&mut reader, &mut linker, class, &mut fresh).unwrap();
        assert!(reader.is_eof());
        (fresh, stats)
    }

    #[test]
    fn test_point_roundtrip_with_no_residual() {
        let class = linked_class(
            "TagPoint",
            8,
            vec![
                PropertyDescriptor::new("X", 0, PropertyKind::Int),
                PropertyDescriptor::new("Y", 4, PropertyKind::Int),
            ],
        );
        let mut contents = (*class.default_contents().unwrap()).clone();
        let x = class.find_property(Name::intern("X")).unwrap();
        let y = class.find_property(Name::intern("Y")).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &x, 0, &PropertyValue::Int(3)).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &y, 0, &PropertyValue::Int(4)).unwrap();

        let (loaded, stats) = roundtrip(&class, &contents);
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &x, 0).unwrap(),
            PropertyValue::Int(3)
        );
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &y, 0).unwrap(),
            PropertyValue::Int(4)
        );
        assert_eq!(stats.properties, 2);
        assert_eq!(stats.residual_bytes, 0);
        assert_eq!(stats.unknown, 0);
    }

    #[test]
    fn test_default_values_are_not_written() {
        let class = linked_class(
            "TagDelta",
            8,
            vec![
                PropertyDescriptor::new("A", 0, PropertyKind::Int),
                PropertyDescriptor::new("B", 4, PropertyKind::Int),
            ],
        );
        let mut contents = (*class.default_contents().unwrap()).clone();
        let a = class.find_property(Name::intern("A")).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &a, 0, &PropertyValue::Int(9)).unwrap();

        let mut writer = Writer::new(ArchiveOptions::default());
        let mut linker = LooseLinker;
        save_tagged(&mut writer, &mut linker, &class, &contents).unwrap();
        let delta_len = writer.tell();

        let mut writer = Writer::new(ArchiveOptions::default().with_binary_properties(true));
        save_tagged(&mut writer, &mut linker, &class, &contents).unwrap();
        let full_len = writer.tell();

        // Only A differs from default, so the delta stream carries one
        // property while the binary stream carries both.
        assert!(delta_len < full_len);
    }

    #[test]
    fn test_unknown_property_is_skipped() {
        let saved_class = linked_class(
            "TagEvolveOld",
            8,
            vec![
                PropertyDescriptor::new("Kept", 0, PropertyKind::Int),
                PropertyDescriptor::new("Dropped", 4, PropertyKind::Int),
            ],
        );
        let mut contents = (*saved_class.default_contents().unwrap()).clone();
        let kept = saved_class.find_property(Name::intern("Kept")).unwrap();
        let dropped = saved_class.find_property(Name::intern("Dropped")).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &kept, 0, &PropertyValue::Int(11)).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &dropped, 0, &PropertyValue::Int(22)).unwrap();

        let mut writer = Writer::new(ArchiveOptions::default());
        let mut linker = LooseLinker;
        save_tagged(&mut writer, &mut linker, &saved_class, &contents).unwrap();
        let bytes = writer.into_bytes();

        // The loading class no longer declares `Dropped`.
        let new_class = linked_class(
            "TagEvolveNew",
            4,
            vec![PropertyDescriptor::new("Kept", 0, PropertyKind::Int)],
        );
        let mut fresh = (*new_class.default_contents().unwrap()).clone();
        let mut reader = Reader::new(&bytes, ArchiveOptions::default());
        let stats = load_tagged(&mut reader, &mut linker, &new_class, &mut fresh).unwrap();
        assert_eq!(stats.properties, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(
            value::read_field_value(&fresh.data, &fresh.heap, &kept, 0).unwrap(),
            PropertyValue::Int(11)
        );
    }

    #[test]
    fn test_kind_mismatch_is_skipped_not_misread() {
        let saved_class = linked_class(
            "TagKindOld",
            4,
            vec![PropertyDescriptor::new("Field", 0, PropertyKind::Int)],
        );
        let mut contents = (*saved_class.default_contents().unwrap()).clone();
        let field = saved_class.find_property(Name::intern("Field")).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &field, 0, &PropertyValue::Int(99)).unwrap();

        let mut writer = Writer::new(ArchiveOptions::default());
        let mut linker = LooseLinker;
        save_tagged(&mut writer, &mut linker, &saved_class, &contents).unwrap();
        let bytes = writer.into_bytes();

        let new_class = linked_class(
            "TagKindNew",
            4,
            vec![PropertyDescriptor::new("Field", 0, PropertyKind::Float)],
        );
        let mut fresh = (*new_class.default_contents().unwrap()).clone();
        let mut reader = Reader::new(&bytes, ArchiveOptions::default());
        let stats = load_tagged(&mut reader, &mut linker, &new_class, &mut fresh).unwrap();
        assert_eq!(stats.kind_mismatches, 1);
        assert_eq!(stats.properties, 0);
        let loaded = new_class.find_property(Name::intern("Field")).unwrap();
        assert_eq!(
            value::read_field_value(&fresh.data, &fresh.heap, &loaded, 0).unwrap(),
            PropertyValue::Float(0.0)
        );
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let class = linked_class(
            "TagTrunc",
            4,
            vec![PropertyDescriptor::new(
                "Items",
                0,
                PropertyKind::Array(Box::new(PropertyDescriptor::new("E", 0, PropertyKind::Int))),
            )],
        );
        let mut contents = (*class.default_contents().unwrap()).clone();
        let items = class.find_property(Name::intern("Items")).unwrap();
        value::write_field_value(
            &mut contents.data,
            &mut contents.heap,
            &items,
            0,
            &PropertyValue::Array(vec![PropertyValue::Int(1), PropertyValue::Int(2)]),
        )
        .unwrap();

        let mut writer = Writer::new(ArchiveOptions::default());
        let mut linker = LooseLinker;
        save_tagged(&mut writer, &mut linker, &class, &contents).unwrap();
        let mut bytes = writer.into_bytes();
        bytes.truncate(bytes.len() - 1);

        let mut fresh = (*class.default_contents().unwrap()).clone();
        let mut reader = Reader::new(&bytes, ArchiveOptions::default());
        let err = load_tagged(&mut reader, &mut linker, &class, &mut fresh).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn test_deprecated_policy() {
        let prop = PropertyDescriptor::new("Old", 0, PropertyKind::Int)
            .with_flags(PropertyFlags::DEPRECATED);
        assert!(!should_serialize(&prop, &ArchiveOptions::default()));
        assert!(should_serialize(
            &prop,
            &ArchiveOptions::default().with_transacting(true)
        ));
        assert!(should_serialize(
            &prop,
            &ArchiveOptions::default().with_binary_properties(true)
        ));

        // Editor-only filtering beats the deprecated carve-outs.
        let both = PropertyDescriptor::new("OldEditor", 0, PropertyKind::Int)
            .with_flags(PropertyFlags::DEPRECATED | PropertyFlags::EDITOR_ONLY);
        let opts = ArchiveOptions::default()
            .with_transacting(true)
            .with_filter_editor_only(true);
        assert!(!should_serialize(&both, &opts));
    }

    #[test]
    fn test_version_gated_property_omitted_for_old_target() {
        let prop = PropertyDescriptor::new("NewField", 0, PropertyKind::Int).with_min_version(5);
        assert!(should_serialize(&prop, &ArchiveOptions::default().with_version(5)));
        assert!(!should_serialize(&prop, &ArchiveOptions::default().with_version(4)));
    }

    #[test]
    fn test_bool_travels_in_tag() {
        let class = linked_class(
            "TagBool",
            1,
            vec![
                PropertyDescriptor::new("bOn", 0, PropertyKind::Bool).with_bit_mask(0x01),
                PropertyDescriptor::new("bOff", 0, PropertyKind::Bool).with_bit_mask(0x02),
            ],
        );
        let mut contents = (*class.default_contents().unwrap()).clone();
        let on = class.find_property(Name::intern("bOn")).unwrap();
        value::write_field_value(&mut contents.data, &mut contents.heap, &on, 0, &PropertyValue::Bool(true)).unwrap();

        let (loaded, stats) = roundtrip(&class, &contents);
        assert_eq!(stats.properties, 1);
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &on, 0).unwrap(),
            PropertyValue::Bool(true)
        );
        let off = class.find_property(Name::intern("bOff")).unwrap();
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &off, 0).unwrap(),
            PropertyValue::Bool(false)
        );
    }

    #[test]
    fn test_nested_struct_and_map_roundtrip() {
        let point = Arc::new(ClassDescriptor::new(
            Name::intern("TagNestPoint"),
            8,
            4,
            ClassFlags::STRUCT,
            None,
        ));
        point
            .add_property(PropertyDescriptor::new("X", 0, PropertyKind::Int))
            .unwrap();
        point
            .add_property(PropertyDescriptor::new("Y", 4, PropertyKind::Int))
            .unwrap();
        point.link().unwrap();

        let class = linked_class(
            "TagNest",
            12,
            vec![
                PropertyDescriptor::new("Origin", 0, PropertyKind::Struct(Arc::clone(&point))),
                PropertyDescriptor::new(
                    "Named",
                    8,
                    PropertyKind::Map {
                        key: Box::new(PropertyDescriptor::new("K", 0, PropertyKind::Str)),
                        value: Box::new(PropertyDescriptor::new(
                            "V",
                            0,
                            PropertyKind::Struct(Arc::clone(&point)),
                        )),
                    },
                ),
            ],
        );
        let mut contents = (*class.default_contents().unwrap()).clone();
        let origin = class.find_property(Name::intern("Origin")).unwrap();
        let named = class.find_property(Name::intern("Named")).unwrap();
        value::write_field_value(
            &mut contents.data,
            &mut contents.heap,
            &origin,
            0,
            &PropertyValue::Struct(vec![PropertyValue::Int(7), PropertyValue::Int(-3)]),
        )
        .unwrap();
        value::write_field_value(
            &mut contents.data,
            &mut contents.heap,
            &named,
            0,
            &PropertyValue::Map(vec![(
                PropertyValue::Str("spawn".into()),
                PropertyValue::Struct(vec![PropertyValue::Int(1), PropertyValue::Int(2)]),
            )]),
        )
        .unwrap();

        let (loaded, _) = roundtrip(&class, &contents);
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &origin, 0).unwrap(),
            PropertyValue::Struct(vec![PropertyValue::Int(7), PropertyValue::Int(-3)])
        );
        assert_eq!(
            value::read_field_value(&loaded.data, &loaded.heap, &named, 0).unwrap(),
            PropertyValue::Map(vec![(
                PropertyValue::Str("spawn".into()),
                PropertyValue::Struct(vec![PropertyValue::Int(1), PropertyValue::Int(2)]),
            )])
        );
    }
}
