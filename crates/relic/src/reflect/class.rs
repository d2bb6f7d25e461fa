// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Class and struct descriptors.
//!
//! A [`ClassDescriptor`] chains property descriptors into a single-inheritance
//! hierarchy and carries the per-type caches the rest of the engine depends
//! on: the property-link chain (all fields, super-most first), the GC
//! reference token stream and the default object. All three are computed
//! exactly once by [`ClassDescriptor::link`]; descriptors are read-only
//! afterwards.

use crate::gc::TokenStream;
use crate::name::Name;
use crate::object::instance::Contents;
use crate::reflect::property::{PropertyDescriptor, PropertyKind};
use crate::reflect::ReflectError;
use parking_lot::RwLock;
use std::ops::BitOr;
use std::sync::Arc;

// =======================================================================
// Class flags
// =======================================================================

/// Behavior flags for a class or struct descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ClassFlags(u32);

impl ClassFlags {
    /// No flags set.
    pub const NONE: ClassFlags = ClassFlags(0);
    /// Backed by native code.
    pub const NATIVE: ClassFlags = ClassFlags(1 << 0);
    /// Instances are never saved.
    pub const TRANSIENT: ClassFlags = ClassFlags(1 << 1);
    /// Serialized whole: delta-from-default compression is disabled for
    /// values of this type.
    pub const ATOMIC_SERIALIZE: ClassFlags = ClassFlags(1 << 2);
    /// Only configuration data, no object identity.
    pub const CONFIG_ONLY: ClassFlags = ClassFlags(1 << 3);
    /// Cannot be instantiated directly.
    pub const ABSTRACT: ClassFlags = ClassFlags(1 << 4);
    /// Plain struct (value aggregate) rather than a first-class object type.
    pub const STRUCT: ClassFlags = ClassFlags(1 << 5);

    /// True if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub fn contains(self, other: ClassFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ClassFlags {
    type Output = ClassFlags;
    fn bitor(self, rhs: ClassFlags) -> ClassFlags {
        ClassFlags(self.0 | rhs.0)
    }
}

// =======================================================================
// Class descriptor
// =======================================================================

struct ClassInner {
    properties: Vec<Arc<PropertyDescriptor>>,
    linked: bool,
    linking: bool,
    property_link: Vec<Arc<PropertyDescriptor>>,
    token_stream: Arc<TokenStream>,
    default_contents: Option<Arc<Contents>>,
}

/// A named aggregate type: memory layout plus field semantics.
///
/// Shared via `Arc`; interior mutability covers only the registration
/// window. After [`link`](Self::link) succeeds the descriptor never changes.
pub struct ClassDescriptor {
    name: Name,
    size: usize,
    alignment: usize,
    flags: ClassFlags,
    super_class: Option<Arc<ClassDescriptor>>,
    inner: RwLock<ClassInner>,
}

impl ClassDescriptor {
    pub(crate) fn new(
        name: Name,
        size: usize,
        alignment: usize,
        flags: ClassFlags,
        super_class: Option<Arc<ClassDescriptor>>,
    ) -> Self {
        Self {
            name,
            size,
            alignment,
            flags,
            super_class,
            inner: RwLock::new(ClassInner {
                properties: Vec::new(),
                linked: false,
                linking: false,
                property_link: Vec::new(),
                token_stream: Arc::new(TokenStream::default()),
                default_contents: None,
            }),
        }
    }

    /// Type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Name {
        self.name
    }

    /// Total instance size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Minimum alignment (descriptive; instance storage is byte-addressed).
    #[inline]
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Behavior flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// Direct super type, if any.
    #[must_use]
    pub fn super_class(&self) -> Option<Arc<ClassDescriptor>> {
        self.super_class.clone()
    }

    /// Size of the inherited region (`super.size`, 0 for roots).
    #[must_use]
    pub fn super_size(&self) -> usize {
        self.super_class.as_ref().map_or(0, |s| s.size())
    }

    /// True if `self` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_child_of(&self, ancestor: &ClassDescriptor) -> bool {
        if std::ptr::eq(self, ancestor) || self.name == ancestor.name {
            return true;
        }
        let mut cursor = self.super_class.clone();
        while let Some(class) = cursor {
            if class.name == ancestor.name {
                return true;
            }
            cursor = class.super_class.clone();
        }
        false
    }

    /// True once [`link`](Self::link) has completed.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.inner.read().linked
    }

    /// Snapshot of the locally declared properties, in declaration order.
    #[must_use]
    pub fn local_properties(&self) -> Vec<Arc<PropertyDescriptor>> {
        self.inner.read().properties.clone()
    }

    /// Iterate fields, super-most first then local declaration order.
    ///
    /// Restartable: every call walks the chain from the top. Works before
    /// linking; after linking the cached chain is used.
    #[must_use]
    pub fn fields(&self, include_super: bool) -> FieldIter {
        if !include_super {
            return FieldIter {
                props: self.local_properties().into_iter(),
            };
        }
        {
            let inner = self.inner.read();
            if inner.linked {
                return FieldIter {
                    props: inner.property_link.clone().into_iter(),
                };
            }
        }
        FieldIter {
            props: self.collect_chain().into_iter(),
        }
    }

    /// All fields including inherited ones, super-most first.
    ///
    /// Equal to the cached property-link chain once linked.
    #[must_use]
    pub fn property_link(&self) -> Vec<Arc<PropertyDescriptor>> {
        let inner = self.inner.read();
        if inner.linked {
            inner.property_link.clone()
        } else {
            drop(inner);
            self.collect_chain()
        }
    }

    fn collect_chain(&self) -> Vec<Arc<PropertyDescriptor>> {
        let mut lineage: Vec<Arc<ClassDescriptor>> = Vec::new();
        let mut cursor = self.super_class.clone();
        while let Some(class) = cursor {
            cursor = class.super_class.clone();
            lineage.push(class);
        }
        let mut chain = Vec::new();
        for class in lineage.iter().rev() {
            chain.extend(class.local_properties());
        }
        chain.extend(self.local_properties());
        chain
    }

    /// Find a property by name anywhere in the chain.
    #[must_use]
    pub fn find_property(&self, name: Name) -> Option<Arc<PropertyDescriptor>> {
        self.fields(true).find(|p| p.name == name)
    }

    /// The GC reference token stream. Empty until linked.
    #[must_use]
    pub fn token_stream(&self) -> Arc<TokenStream> {
        Arc::clone(&self.inner.read().token_stream)
    }

    /// The class default object's contents. `None` until linked.
    #[must_use]
    pub fn default_contents(&self) -> Option<Arc<Contents>> {
        self.inner.read().default_contents.clone()
    }

    /// Append a locally declared property.
    ///
    /// Fails with a layout error if the class is already linked, if the new
    /// byte range overlaps an existing property (boolean bitfields sharing
    /// one byte excepted), if it reaches into the inherited region, or if it
    /// exceeds the class size.
    pub fn add_property(&self, prop: PropertyDescriptor) -> Result<(), ReflectError> {
        let mut inner = self.inner.write();
        if inner.linked {
            return Err(ReflectError::Layout {
                class: self.name,
                reason: format!("cannot add property '{}' after link", prop.name),
            });
        }
        validate_inner_descriptors(self.name, &prop)?;
        let range = prop.byte_range();
        if range.end > self.size {
            return Err(ReflectError::Layout {
                class: self.name,
                reason: format!(
                    "property '{}' range {}..{} exceeds class size {}",
                    prop.name, range.start, range.end, self.size
                ),
            });
        }
        if range.start < self.super_size() {
            return Err(ReflectError::Layout {
                class: self.name,
                reason: format!(
                    "property '{}' offset {} falls inside inherited region 0..{}",
                    prop.name,
                    range.start,
                    self.super_size()
                ),
            });
        }
        for existing in &inner.properties {
            let other = existing.byte_range();
            let overlaps = range.start < other.end && other.start < range.end;
            if !overlaps {
                continue;
            }
            // Bitfields may share one byte; they are addressed by bit mask.
            let shared_bitfield = prop.is_bitfield()
                && existing.is_bitfield()
                && prop.offset == existing.offset;
            if !shared_bitfield {
                return Err(ReflectError::Layout {
                    class: self.name,
                    reason: format!(
                        "property '{}' range {}..{} overlaps '{}' at {}..{}",
                        prop.name, range.start, range.end, existing.name, other.start, other.end
                    ),
                });
            }
        }
        inner.properties.push(Arc::new(prop));
        Ok(())
    }

    /// Finalize the descriptor: validate layout, cache the property-link
    /// chain, build the GC token stream and the default object.
    ///
    /// Idempotent; re-linking a linked class is a no-op. Recursive struct
    /// nesting (a struct containing itself by value) is rejected.
    pub fn link(&self) -> Result<(), ReflectError> {
        {
            let mut inner = self.inner.write();
            if inner.linked {
                return Ok(());
            }
            if inner.linking {
                return Err(ReflectError::Layout {
                    class: self.name,
                    reason: "recursive struct nesting detected during link".into(),
                });
            }
            inner.linking = true;
        }
        let result = self.link_impl();
        if result.is_err() {
            self.inner.write().linking = false;
        }
        result
    }

    fn link_impl(&self) -> Result<(), ReflectError> {
        if let Some(super_class) = &self.super_class {
            super_class.link()?;
            if self.size < super_class.size() {
                return Err(ReflectError::Layout {
                    class: self.name,
                    reason: format!(
                        "size {} is smaller than super '{}' size {}",
                        self.size,
                        super_class.name(),
                        super_class.size()
                    ),
                });
            }
        }

        // Nested aggregate types must be linked first so their token
        // streams and defaults can be reused rather than recomputed.
        for prop in self.local_properties() {
            link_nested(&prop.kind)?;
        }

        let chain = self.collect_chain();
        for prop in &chain {
            if prop.byte_range().end > self.size {
                return Err(ReflectError::Layout {
                    class: self.name,
                    reason: format!(
                        "property '{}' range ends at {} beyond class size {}",
                        prop.name,
                        prop.byte_range().end,
                        self.size
                    ),
                });
            }
        }

        let stream = crate::gc::build_token_stream(&chain);
        let defaults = Contents::new_for_props(&chain, self.size);

        let mut inner = self.inner.write();
        inner.property_link = chain;
        inner.token_stream = Arc::new(stream);
        inner.default_contents = Some(Arc::new(defaults));
        inner.linking = false;
        inner.linked = true;
        Ok(())
    }

    /// True if the local layout matches `other`'s registration parameters.
    /// Used for idempotent re-registration.
    pub(crate) fn matches_shape(
        &self,
        size: usize,
        alignment: usize,
        flags: ClassFlags,
        super_name: Option<Name>,
    ) -> bool {
        self.size == size
            && self.alignment == alignment
            && self.flags == flags
            && self.super_class.as_ref().map(|s| s.name()) == super_name
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("super", &self.super_class.as_ref().map(|s| s.name()))
            .field("linked", &self.is_linked())
            .finish()
    }
}

fn link_nested(kind: &PropertyKind) -> Result<(), ReflectError> {
    match kind {
        PropertyKind::Struct(class) => class.link(),
        PropertyKind::Array(inner) => link_nested(&inner.kind),
        PropertyKind::Map { key, value } => {
            link_nested(&key.kind)?;
            link_nested(&value.kind)
        }
        _ => Ok(()),
    }
}

fn validate_inner_descriptors(class: Name, prop: &PropertyDescriptor) -> Result<(), ReflectError> {
    fn check(class: Name, owner: Name, kind: &PropertyKind) -> Result<(), ReflectError> {
        match kind {
            PropertyKind::Array(inner) => {
                if inner.offset != 0 {
                    return Err(ReflectError::Layout {
                        class,
                        reason: format!(
                            "array property '{}' inner descriptor must have offset 0",
                            owner
                        ),
                    });
                }
                check(class, owner, &inner.kind)
            }
            PropertyKind::Map { key, value } => {
                if key.offset != 0 || value.offset != 0 {
                    return Err(ReflectError::Layout {
                        class,
                        reason: format!(
                            "map property '{}' inner descriptors must have offset 0",
                            owner
                        ),
                    });
                }
                check(class, owner, &key.kind)?;
                check(class, owner, &value.kind)
            }
            _ => Ok(()),
        }
    }
    check(class, prop.name, &prop.kind)
}

/// Restartable iterator over a snapshot of a field chain.
pub struct FieldIter {
    props: std::vec::IntoIter<Arc<PropertyDescriptor>>,
}

impl Iterator for FieldIter {
    type Item = Arc<PropertyDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        self.props.next()
    }
}

impl ExactSizeIterator for FieldIter {
    fn len(&self) -> usize {
        self.props.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::property::PropertyFlags;

    fn int_prop(name: &str, offset: usize) -> PropertyDescriptor {
        PropertyDescriptor::new(name, offset, PropertyKind::Int)
    }

    #[test]
    fn test_overlap_rejected() {
        let class = ClassDescriptor::new(Name::intern("Overlap"), 16, 4, ClassFlags::NONE, None);
        class.add_property(int_prop("A", 0)).unwrap();
        let err = class.add_property(int_prop("B", 2)).unwrap_err();
        assert!(matches!(err, ReflectError::Layout { .. }));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let class = ClassDescriptor::new(Name::intern("Bounds"), 8, 4, ClassFlags::NONE, None);
        let err = class.add_property(int_prop("A", 8)).unwrap_err();
        assert!(matches!(err, ReflectError::Layout { .. }));
    }

    #[test]
    fn test_bitfields_may_share_a_byte() {
        let class = ClassDescriptor::new(Name::intern("Bits"), 4, 1, ClassFlags::NONE, None);
        class
            .add_property(
                PropertyDescriptor::new("bFlagA", 0, PropertyKind::Bool).with_bit_mask(0x01),
            )
            .unwrap();
        class
            .add_property(
                PropertyDescriptor::new("bFlagB", 0, PropertyKind::Bool).with_bit_mask(0x02),
            )
            .unwrap();
        assert_eq!(class.local_properties().len(), 2);
    }

    #[test]
    fn test_field_iteration_super_first() {
        let base = Arc::new(ClassDescriptor::new(
            Name::intern("IterBase"),
            4,
            4,
            ClassFlags::NONE,
            None,
        ));
        base.add_property(int_prop("BaseField", 0)).unwrap();
        let derived = ClassDescriptor::new(
            Name::intern("IterDerived"),
            8,
            4,
            ClassFlags::NONE,
            Some(Arc::clone(&base)),
        );
        derived.add_property(int_prop("LocalField", 4)).unwrap();

        let names: Vec<String> = derived
            .fields(true)
            .map(|p| p.name.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["BaseField", "LocalField"]);

        let local_only: Vec<String> = derived
            .fields(false)
            .map(|p| p.name.as_str().to_string())
            .collect();
        assert_eq!(local_only, vec!["LocalField"]);
    }

    #[test]
    fn test_local_offset_may_not_enter_inherited_region() {
        let base = Arc::new(ClassDescriptor::new(
            Name::intern("RegionBase"),
            8,
            4,
            ClassFlags::NONE,
            None,
        ));
        let derived = ClassDescriptor::new(
            Name::intern("RegionDerived"),
            16,
            4,
            ClassFlags::NONE,
            Some(base),
        );
        let err = derived.add_property(int_prop("Bad", 4)).unwrap_err();
        assert!(matches!(err, ReflectError::Layout { .. }));
    }

    #[test]
    fn test_link_is_idempotent() {
        let class = ClassDescriptor::new(Name::intern("Idem"), 8, 4, ClassFlags::NONE, None);
        class.add_property(int_prop("A", 0)).unwrap();
        class.add_property(int_prop("B", 4)).unwrap();
        class.link().unwrap();
        let first_chain = class.property_link();
        let first_stream = class.token_stream();
        class.link().unwrap();
        assert_eq!(first_chain.len(), class.property_link().len());
        assert_eq!(*first_stream, *class.token_stream());
        assert!(class.is_linked());
    }

    #[test]
    fn test_add_after_link_rejected() {
        let class = ClassDescriptor::new(Name::intern("Sealed"), 8, 4, ClassFlags::NONE, None);
        class.link().unwrap();
        let err = class.add_property(int_prop("Late", 0)).unwrap_err();
        assert!(matches!(err, ReflectError::Layout { .. }));
    }

    #[test]
    fn test_flags_survive() {
        let class = ClassDescriptor::new(
            Name::intern("Flagged"),
            4,
            4,
            ClassFlags::NATIVE | ClassFlags::TRANSIENT,
            None,
        );
        assert!(class.flags().contains(ClassFlags::NATIVE));
        assert!(!class.flags().contains(ClassFlags::ABSTRACT));
        let _ = PropertyFlags::NONE;
    }
}
