// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object instances and the handle arena.
//!
//! Instances store property data as raw bytes at descriptor offsets plus a
//! per-instance value heap for variable-size values (strings, dynamic
//! arrays, maps). Object identity is a generational [`ObjectHandle`] into
//! the [`ObjectArena`]; a stale handle resolves to `None`, never to a
//! recycled object.

pub mod arena;
pub mod instance;
pub mod value;

pub use arena::{ObjectArena, ObjectHandle};
pub use instance::{Contents, DynArray, DynMap, MapEntry, ObjectFlags, ObjectInstance, ValueHeap};
pub use value::{PropertyValue, ValueError};
