// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime type information: property and class descriptors plus the
//! process-wide registry.
//!
//! This is the data-driven replacement for compile-time type knowledge:
//! every other subsystem (serialization, GC tracing, default propagation)
//! operates purely on `(offset, PropertyKind, inner descriptor)` tuples, so
//! the layout validation in [`ClassDescriptor::link`] is load-bearing.

pub mod class;
pub mod property;
pub mod registry;

pub use class::{ClassDescriptor, ClassFlags, FieldIter};
pub use property::{PropertyDescriptor, PropertyFlags, PropertyKind};
pub use registry::TypeRegistry;

use crate::name::Name;
use std::fmt;

/// Type-registration errors. Fatal to the caller: they indicate a mismatch
/// between code and data that cannot be safely continued past.
#[derive(Debug, Clone)]
pub enum ReflectError {
    /// A type name was re-registered with a different layout.
    DuplicateType { name: Name, reason: String },
    /// Property offsets overlap, exceed the class size, or an inner
    /// descriptor is malformed.
    Layout { class: Name, reason: String },
    /// Lookup of an unregistered type.
    UnknownType { name: Name },
}

impl fmt::Display for ReflectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflectError::DuplicateType { name, reason } => {
                write!(f, "duplicate type '{}': {}", name, reason)
            }
            ReflectError::Layout { class, reason } => {
                write!(f, "layout error in '{}': {}", class, reason)
            }
            ReflectError::UnknownType { name } => write!(f, "unknown type '{}'", name),
        }
    }
}

impl std::error::Error for ReflectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReflectError::Layout {
            class: Name::intern("Widget"),
            reason: "property 'A' range 0..4 overlaps 'B' at 2..6".into(),
        };
        assert_eq!(
            err.to_string(),
            "layout error in 'Widget': property 'A' range 0..4 overlaps 'B' at 2..6"
        );
        let err = ReflectError::UnknownType {
            name: Name::intern("Ghost"),
        };
        assert_eq!(err.to_string(), "unknown type 'Ghost'");
    }
}
