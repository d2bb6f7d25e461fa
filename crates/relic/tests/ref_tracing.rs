// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Token-stream tracing vs a descriptor walk over randomized contents.
//!
//! The token stream is a flattened, precomputed view of where references
//! live; the descriptor walk re-derives the same offsets the slow way.
//! Both must report the same multiset of handles for any contents.

use relic::gc::{trace_refs, visit_property_refs};
use relic::{
    ClassFlags, Name, ObjectHandle, ObjectInstance, PropertyDescriptor, PropertyKind,
    PropertyValue, TypeRegistry,
};

fn ref_heavy_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    let cell = registry
        .register_class("TraceRefCell", 8, 8, ClassFlags::STRUCT, None)
        .unwrap();
    registry
        .add_property(&cell, PropertyDescriptor::new("Ref", 0, PropertyKind::Object))
        .unwrap();
    cell.link().unwrap();

    let ship = registry
        .register_class("TraceShip", 48, 8, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&ship, PropertyDescriptor::new("Owner", 0, PropertyKind::Object))
        .unwrap();
    registry
        .add_property(
            &ship,
            PropertyDescriptor::new("Crew", 8, PropertyKind::Object).with_array_dim(3),
        )
        .unwrap();
    registry
        .add_property(
            &ship,
            PropertyDescriptor::new("Inner", 32, PropertyKind::Struct(cell)),
        )
        .unwrap();
    registry
        .add_property(
            &ship,
            PropertyDescriptor::new(
                "Links",
                40,
                PropertyKind::Array(Box::new(PropertyDescriptor::new(
                    "Links",
                    0,
                    PropertyKind::Object,
                ))),
            ),
        )
        .unwrap();
    registry
        .add_property(
            &ship,
            PropertyDescriptor::new(
                "Lookup",
                44,
                PropertyKind::Map {
                    key: Box::new(PropertyDescriptor::new("Key", 0, PropertyKind::Int)),
                    value: Box::new(PropertyDescriptor::new("Value", 0, PropertyKind::Object)),
                },
            ),
        )
        .unwrap();
    ship.link().unwrap();
    registry
}

fn rand_handle() -> ObjectHandle {
    // Non-null: generation at least 1.
    let index = fastrand::u32(0..1024) as u64;
    let generation = fastrand::u32(1..16) as u64;
    ObjectHandle::from_bits(generation << 32 | index)
}

#[test]
fn test_token_stream_matches_descriptor_walk() {
    fastrand::seed(0x5EED);
    let registry = ref_heavy_registry();
    let ship = registry.find(Name::intern("TraceShip")).unwrap();
    let package = Name::intern("TracePkg");

    for round in 0..32 {
        let mut instance = ObjectInstance::new(
            Name::intern(&format!("Hull{}", round)),
            package,
            &ship,
            ObjectHandle::NULL,
        )
        .unwrap();
        instance.set("Owner", &PropertyValue::Object(rand_handle())).unwrap();
        instance
            .set(
                "Crew",
                &PropertyValue::Array(vec![
                    PropertyValue::Object(rand_handle()),
                    PropertyValue::Object(ObjectHandle::NULL),
                    PropertyValue::Object(rand_handle()),
                ]),
            )
            .unwrap();
        instance
            .set(
                "Inner",
                &PropertyValue::Struct(vec![PropertyValue::Object(rand_handle())]),
            )
            .unwrap();
        let links: Vec<PropertyValue> = (0..fastrand::usize(0..6))
            .map(|_| PropertyValue::Object(rand_handle()))
            .collect();
        instance.set("Links", &PropertyValue::Array(links)).unwrap();
        let lookup: Vec<(PropertyValue, PropertyValue)> = (0..fastrand::usize(0..4))
            .map(|i| (PropertyValue::Int(i as i32), PropertyValue::Object(rand_handle())))
            .collect();
        instance.set("Lookup", &PropertyValue::Map(lookup)).unwrap();

        let mut fast: Vec<u64> = Vec::new();
        trace_refs(&ship.token_stream(), &instance.contents, &mut |handle| {
            fast.push(handle.bits());
        });

        let mut slow: Vec<u64> = Vec::new();
        for prop in ship.fields(true) {
            visit_property_refs(&instance.contents.data, &instance.contents.heap, &prop, 0, &mut |handle| {
                slow.push(handle.bits());
            });
        }

        fast.sort_unstable();
        slow.sort_unstable();
        assert_eq!(fast, slow, "round {} diverged", round);
    }
}
