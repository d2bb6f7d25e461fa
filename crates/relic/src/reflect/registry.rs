// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide type registry.
//!
//! Replaces static-initialization-order registration with one explicit,
//! ordered schema-registration pass made at startup. Lock-free lookups via
//! `DashMap`; descriptors are write-once-then-read-only after linking, so
//! readers never contend.

use crate::name::Name;
use crate::reflect::class::{ClassDescriptor, ClassFlags};
use crate::reflect::property::PropertyDescriptor;
use crate::reflect::ReflectError;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of all known class/struct descriptors.
#[derive(Default)]
pub struct TypeRegistry {
    classes: DashMap<Name, Arc<ClassDescriptor>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, or return the existing descriptor on an identical
    /// re-registration (hot-reload support).
    ///
    /// Conflicting re-registration with a different layout is a
    /// [`ReflectError::DuplicateType`].
    pub fn register_class(
        &self,
        name: impl Into<Name>,
        size: usize,
        alignment: usize,
        flags: ClassFlags,
        super_class: Option<&Arc<ClassDescriptor>>,
    ) -> Result<Arc<ClassDescriptor>, ReflectError> {
        let name = name.into();
        let super_name = super_class.map(|s| s.name());
        if let Some(existing) = self.classes.get(&name) {
            if existing.matches_shape(size, alignment, flags, super_name) {
                return Ok(Arc::clone(&existing));
            }
            return Err(ReflectError::DuplicateType {
                name,
                reason: "re-registration with a different layout".into(),
            });
        }
        if let Some(super_class) = super_class {
            if size < super_class.size() {
                return Err(ReflectError::Layout {
                    class: name,
                    reason: format!(
                        "size {} is smaller than super '{}' size {}",
                        size,
                        super_class.name(),
                        super_class.size()
                    ),
                });
            }
        }
        let class = Arc::new(ClassDescriptor::new(
            name,
            size,
            alignment,
            flags,
            super_class.map(Arc::clone),
        ));
        match self.classes.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                // Lost a registration race; keep the winner if shapes agree.
                let winner = Arc::clone(existing.get());
                if winner.matches_shape(size, alignment, flags, super_name) {
                    Ok(winner)
                } else {
                    Err(ReflectError::DuplicateType {
                        name,
                        reason: "concurrent re-registration with a different layout".into(),
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&class));
                Ok(class)
            }
        }
    }

    /// Append a property to a registered class. See
    /// [`ClassDescriptor::add_property`] for the layout rules enforced.
    pub fn add_property(
        &self,
        class: &Arc<ClassDescriptor>,
        prop: PropertyDescriptor,
    ) -> Result<(), ReflectError> {
        class.add_property(prop)
    }

    /// Finalize a class. Idempotent.
    pub fn link(&self, class: &Arc<ClassDescriptor>) -> Result<(), ReflectError> {
        class.link()
    }

    /// Link every registered class. Registration order does not matter:
    /// linking recurses through supers and nested structs first.
    pub fn link_all(&self) -> Result<(), ReflectError> {
        for entry in &self.classes {
            entry.value().link()?;
        }
        Ok(())
    }

    /// Look up a descriptor by name.
    #[must_use]
    pub fn find(&self, name: Name) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(&name).map(|c| Arc::clone(&c))
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::property::PropertyKind;

    #[test]
    fn test_register_and_find() {
        let registry = TypeRegistry::new();
        let class = registry
            .register_class("RegPoint", 8, 4, ClassFlags::NONE, None)
            .unwrap();
        class
            .add_property(PropertyDescriptor::new("X", 0, PropertyKind::Int))
            .unwrap();
        assert!(registry.find(Name::intern("RegPoint")).is_some());
        assert!(registry.find(Name::intern("Missing")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identical_reregistration_is_idempotent() {
        let registry = TypeRegistry::new();
        let a = registry
            .register_class("RegTwice", 8, 4, ClassFlags::NONE, None)
            .unwrap();
        let b = registry
            .register_class("RegTwice", 8, 4, ClassFlags::NONE, None)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_conflicting_reregistration_fails() {
        let registry = TypeRegistry::new();
        registry
            .register_class("RegConflict", 8, 4, ClassFlags::NONE, None)
            .unwrap();
        let err = registry
            .register_class("RegConflict", 16, 4, ClassFlags::NONE, None)
            .unwrap_err();
        assert!(matches!(err, ReflectError::DuplicateType { .. }));
    }

    #[test]
    fn test_derived_smaller_than_super_fails() {
        let registry = TypeRegistry::new();
        let base = registry
            .register_class("RegBase16", 16, 4, ClassFlags::NONE, None)
            .unwrap();
        let err = registry
            .register_class("RegShrunk", 8, 4, ClassFlags::NONE, Some(&base))
            .unwrap_err();
        assert!(matches!(err, ReflectError::Layout { .. }));
    }

    #[test]
    fn test_link_all() {
        let registry = TypeRegistry::new();
        let base = registry
            .register_class("RegLinkBase", 4, 4, ClassFlags::NONE, None)
            .unwrap();
        base.add_property(PropertyDescriptor::new("A", 0, PropertyKind::Int))
            .unwrap();
        let derived = registry
            .register_class("RegLinkDerived", 8, 4, ClassFlags::NONE, Some(&base))
            .unwrap();
        derived
            .add_property(PropertyDescriptor::new("B", 4, PropertyKind::Int))
            .unwrap();
        registry.link_all().unwrap();
        assert!(base.is_linked());
        assert!(derived.is_linked());
        assert_eq!(derived.property_link().len(), 2);
    }
}
