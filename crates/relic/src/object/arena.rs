// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generational object arena.
//!
//! Handles pack a slot index and a generation counter into one `u64`, so a
//! reference that outlives its object becomes detectably stale instead of
//! aliasing whatever reuses the slot. Generation starts at 1, which keeps
//! the all-zero bit pattern free for the null handle.

use crate::object::instance::ObjectInstance;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Opaque reference to an arena object.
///
/// Layout: `generation << 32 | slot_index`. The null handle is all zeros
/// and is what zero-initialized instance storage naturally contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// The null reference.
    pub const NULL: ObjectHandle = ObjectHandle(0);

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        ObjectHandle(u64::from(generation) << 32 | u64::from(index))
    }

    /// Rebuild from raw bits (instance storage, wire).
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        ObjectHandle(bits)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// True for the null handle.
    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn index(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    #[inline]
    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}:{}", self.index(), self.generation())
        }
    }
}

struct Slot {
    generation: u32,
    value: Option<Arc<RwLock<ObjectInstance>>>,
}

/// Owner of all live object instances.
#[derive(Default)]
pub struct ObjectArena {
    slots: RwLock<Vec<Slot>>,
    free: Mutex<Vec<u32>>,
}

impl ObjectArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `instance` and hand back its handle.
    pub fn insert(&self, instance: ObjectInstance) -> ObjectHandle {
        let value = Arc::new(RwLock::new(instance));
        if let Some(index) = self.free.lock().pop() {
            let mut slots = self.slots.write();
            let slot = &mut slots[index as usize];
            slot.value = Some(value);
            return ObjectHandle::new(index, slot.generation);
        }
        let mut slots = self.slots.write();
        let index = slots.len() as u32;
        slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        ObjectHandle::new(index, 1)
    }

    /// Resolve a handle. `None` for null, stale or destroyed handles.
    #[must_use]
    pub fn get(&self, handle: ObjectHandle) -> Option<Arc<RwLock<ObjectInstance>>> {
        if handle.is_null() {
            return None;
        }
        let slots = self.slots.read();
        let slot = slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.clone()
    }

    /// True if `handle` currently resolves.
    #[must_use]
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Destroy an object. The slot's generation bumps, so every copy of the
    /// handle goes stale at once. Returns the instance if it was live.
    pub fn remove(&self, handle: ObjectHandle) -> Option<Arc<RwLock<ObjectInstance>>> {
        if handle.is_null() {
            return None;
        }
        let mut slots = self.slots.write();
        let slot = slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        drop(slots);
        self.free.lock().push(handle.index() as u32);
        Some(value)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.value.is_some())
            .count()
    }

    /// True when no objects are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every live object with its handle.
    pub fn for_each(&self, mut f: impl FnMut(ObjectHandle, &Arc<RwLock<ObjectInstance>>)) {
        let slots = self.slots.read();
        for (index, slot) in slots.iter().enumerate() {
            if let Some(value) = &slot.value {
                f(ObjectHandle::new(index as u32, slot.generation), value);
            }
        }
    }
}
