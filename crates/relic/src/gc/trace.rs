// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Token stream replay: visit every outgoing object reference of an
//! instance.
//!
//! The replay walks raw instance bytes plus the instance value heap. Frames
//! are `(bytes, heap)` pairs: inline structs stay in the owner's frame,
//! dynamic-array elements switch to the array's own backing storage and
//! heap.

use crate::gc::{RefToken, TokenStream};
use crate::object::arena::ObjectHandle;
use crate::object::instance::{Contents, ValueHeap};
use crate::reflect::property::{PropertyDescriptor, PropertyKind};

/// Replay `stream` over `contents`, invoking `visit` for every non-null
/// reference found.
pub fn trace_refs(stream: &TokenStream, contents: &Contents, visit: &mut dyn FnMut(ObjectHandle)) {
    let tokens = stream.tokens();
    run(tokens, 0, tokens.len(), &contents.data, &contents.heap, visit);
}

fn run(
    tokens: &[RefToken],
    mut i: usize,
    end: usize,
    data: &[u8],
    heap: &ValueHeap,
    visit: &mut dyn FnMut(ObjectHandle),
) {
    while i < end {
        match &tokens[i] {
            RefToken::Reference { offset } => {
                if let Some(handle) = read_handle(data, *offset) {
                    if !handle.is_null() {
                        visit(handle);
                    }
                }
                i += 1;
            }
            RefToken::FixedArrayBegin {
                offset,
                stride,
                count,
                skip_index,
            } => {
                // Inner tokens sit between the begin token and the
                // FixedArrayEnd at skip_index - 1.
                let inner_end = skip_index.saturating_sub(1);
                for k in 0..*count {
                    let base = offset + k * stride;
                    if base + stride <= data.len() {
                        run(tokens, i + 1, inner_end, &data[base..base + stride], heap, visit);
                    }
                }
                i = *skip_index;
            }
            RefToken::StructArrayBegin {
                offset,
                stride,
                skip_index,
            } => {
                let inner_end = skip_index.saturating_sub(1);
                if let Some(array) = read_slot(data, *offset).and_then(|slot| heap.arrays.get(slot))
                {
                    for k in 0..array.len() {
                        let base = k * stride;
                        if base + stride <= array.data.len() {
                            run(
                                tokens,
                                i + 1,
                                inner_end,
                                &array.data[base..base + stride],
                                &array.heap,
                                visit,
                            );
                        }
                    }
                }
                i = *skip_index;
            }
            RefToken::Map { offset, key, value } => {
                if let Some(map) = read_slot(data, *offset).and_then(|slot| heap.maps.get(slot)) {
                    for entry in &map.entries {
                        visit_property_refs(&entry.key.data, &entry.key.heap, key, 0, visit);
                        visit_property_refs(&entry.value.data, &entry.value.heap, value, 0, visit);
                    }
                }
                i += 1;
            }
            RefToken::FixedArrayEnd | RefToken::StructArrayEnd => {
                i += 1;
            }
            RefToken::End => break,
        }
    }
}

/// Descriptor-driven reference walk.
///
/// Used for map entries (whose keys and values have independent layouts)
/// and as the exhaustive comparator the token stream is validated against.
pub fn visit_property_refs(
    data: &[u8],
    heap: &ValueHeap,
    desc: &PropertyDescriptor,
    base: usize,
    visit: &mut dyn FnMut(ObjectHandle),
) {
    for index in 0..desc.array_dim {
        let off = base + desc.offset + index * desc.element_size();
        match &desc.kind {
            PropertyKind::Object | PropertyKind::Interface | PropertyKind::Delegate => {
                if let Some(handle) = read_handle(data, off) {
                    if !handle.is_null() {
                        visit(handle);
                    }
                }
            }
            PropertyKind::Struct(class) => {
                for field in class.property_link() {
                    visit_property_refs(data, heap, &field, off, visit);
                }
            }
            PropertyKind::Array(inner) => {
                if let Some(array) = read_slot(data, off).and_then(|slot| heap.arrays.get(slot)) {
                    for k in 0..array.len() {
                        visit_property_refs(
                            &array.data,
                            &array.heap,
                            inner,
                            k * array.elem_size,
                            visit,
                        );
                    }
                }
            }
            PropertyKind::Map { key, value } => {
                if let Some(map) = read_slot(data, off).and_then(|slot| heap.maps.get(slot)) {
                    for entry in &map.entries {
                        visit_property_refs(&entry.key.data, &entry.key.heap, key, 0, visit);
                        visit_property_refs(&entry.value.data, &entry.value.heap, value, 0, visit);
                    }
                }
            }
            _ => {}
        }
    }
}

fn read_handle(data: &[u8], offset: usize) -> Option<ObjectHandle> {
    if offset + 8 > data.len() {
        return None;
    }
    let mut bits = [0u8; 8];
    bits.copy_from_slice(&data[offset..offset + 8]);
    Some(ObjectHandle::from_bits(u64::from_le_bytes(bits)))
}

fn read_slot(data: &[u8], offset: usize) -> Option<usize> {
    if offset + 4 > data.len() {
        return None;
    }
    let mut bits = [0u8; 4];
    bits.copy_from_slice(&data[offset..offset + 4]);
    let slot = u32::from_le_bytes(bits);
    if slot == u32::MAX {
        None
    } else {
        Some(slot as usize)
    }
}
