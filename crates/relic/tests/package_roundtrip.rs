// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end package save/load, synchronous linker path.

use relic::archive::ArchiveOptions;
use relic::linker::{save_package, LinkerLoad};
use relic::loader::{LoadContext, TimeSlice};
use relic::object::ObjectArena;
use relic::package::PackageError;
use relic::{
    ClassFlags, Name, ObjectHandle, ObjectInstance, PropertyDescriptor, PropertyKind,
    PropertyValue, TypeRegistry,
};
use std::sync::Arc;

fn point_registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    let point = registry
        .register_class("Point", 8, 4, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&point, PropertyDescriptor::new("X", 0, PropertyKind::Int))
        .unwrap();
    registry
        .add_property(&point, PropertyDescriptor::new("Y", 4, PropertyKind::Int))
        .unwrap();
    point.link().unwrap();
    Arc::new(registry)
}

fn new_ctx(registry: Arc<TypeRegistry>) -> LoadContext {
    LoadContext::new(Arc::new(ObjectArena::new()), registry)
}

/// Drive one package through every linker phase synchronously.
fn load_sync(ctx: &LoadContext, package: Name, bytes: &[u8]) -> Result<LinkerLoad, PackageError> {
    let mut linker = LinkerLoad::new(package, bytes)?;
    let mut slice = TimeSlice::unlimited();
    assert!(linker.tick_tables(&mut slice)?);
    for i in 0..linker.imports().len() {
        linker.create_import(i, ctx)?;
    }
    for i in 0..linker.exports().len() {
        linker.create_export(i, ctx)?;
    }
    for i in 0..linker.exports().len() {
        linker.preload_export(i, ctx)?;
    }
    linker.finish_imports(ctx);
    Ok(linker)
}

fn save_point_package(registry: &TypeRegistry, package: Name, compress: bool) -> Vec<u8> {
    let arena = ObjectArena::new();
    let point = registry.find(Name::intern("Point")).unwrap();
    let mut origin = ObjectInstance::new(Name::intern("Origin"), package, &point, ObjectHandle::NULL).unwrap();
    origin.set("X", &PropertyValue::Int(17)).unwrap();
    origin.set("Y", &PropertyValue::Int(-4)).unwrap();
    let root = arena.insert(origin);
    save_package(&arena, package, &[root], ArchiveOptions::default(), compress).unwrap()
}

#[test]
fn test_point_roundtrip() {
    let registry = point_registry();
    let package = Name::intern("RtPointPkg");
    let bytes = save_point_package(&registry, package, false);

    let ctx = new_ctx(Arc::clone(&registry));
    let linker = load_sync(&ctx, package, &bytes).unwrap();
    assert_eq!(linker.exports().len(), 1);

    let handle = ctx.directory.lookup(package, Name::intern("Origin")).unwrap();
    let object = ctx.arena.get(handle).unwrap();
    let object = object.read();
    assert_eq!(object.get("X").unwrap(), PropertyValue::Int(17));
    assert_eq!(object.get("Y").unwrap(), PropertyValue::Int(-4));
}

#[test]
fn test_compressed_roundtrip() {
    let registry = point_registry();
    let package = Name::intern("RtZlibPkg");
    let bytes = save_point_package(&registry, package, true);

    let ctx = new_ctx(Arc::clone(&registry));
    let linker = load_sync(&ctx, package, &bytes).unwrap();
    assert!(linker.summary().is_compressed());

    let handle = ctx.directory.lookup(package, Name::intern("Origin")).unwrap();
    let object = ctx.arena.get(handle).unwrap();
    assert_eq!(object.read().get("X").unwrap(), PropertyValue::Int(17));
}

#[test]
fn test_truncated_package_is_rejected() {
    let registry = point_registry();
    let package = Name::intern("RtTruncPkg");
    let bytes = save_point_package(&registry, package, false);

    // Anywhere short of the full file must fail cleanly, never panic.
    for len in [10, 59, bytes.len() - 1] {
        let ctx = new_ctx(Arc::clone(&registry));
        let result = load_sync(&ctx, package, &bytes[..len]);
        assert!(result.is_err(), "accepted a {}-byte prefix", len);
    }
}

#[test]
fn test_bad_magic_is_rejected() {
    let registry = point_registry();
    let ctx = new_ctx(registry);
    let err = load_sync(&ctx, Name::intern("RtMagicPkg"), &[0x55; 128]).unwrap_err();
    assert!(matches!(err, PackageError::BadMagic { .. }));
}

#[test]
fn test_cyclic_exports_roundtrip() {
    let registry = TypeRegistry::new();
    let node = registry
        .register_class("RingNode", 8, 8, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&node, PropertyDescriptor::new("Next", 0, PropertyKind::Object))
        .unwrap();
    node.link().unwrap();
    let registry = Arc::new(registry);

    let package = Name::intern("RtRingPkg");
    let arena = ObjectArena::new();
    let a = arena.insert(
        ObjectInstance::new(Name::intern("NodeA"), package, &node, ObjectHandle::NULL).unwrap(),
    );
    let b = arena.insert(
        ObjectInstance::new(Name::intern("NodeB"), package, &node, ObjectHandle::NULL).unwrap(),
    );
    arena.get(a).unwrap().write().set("Next", &PropertyValue::Object(b)).unwrap();
    arena.get(b).unwrap().write().set("Next", &PropertyValue::Object(a)).unwrap();

    // Only NodeA is a root; NodeB must be gathered through the cycle.
    let bytes = save_package(&arena, package, &[a], ArchiveOptions::default(), false).unwrap();

    let ctx = new_ctx(Arc::clone(&registry));
    let linker = load_sync(&ctx, package, &bytes).unwrap();
    assert_eq!(linker.exports().len(), 2);

    let a2 = ctx.directory.lookup(package, Name::intern("NodeA")).unwrap();
    let b2 = ctx.directory.lookup(package, Name::intern("NodeB")).unwrap();
    let a2_next = ctx.arena.get(a2).unwrap().read().get("Next").unwrap();
    let b2_next = ctx.arena.get(b2).unwrap().read().get("Next").unwrap();
    assert_eq!(a2_next, PropertyValue::Object(b2));
    assert_eq!(b2_next, PropertyValue::Object(a2));
}

#[test]
fn test_string_and_array_roundtrip() {
    let registry = TypeRegistry::new();
    let actor = registry
        .register_class("TaggedActor", 8, 4, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&actor, PropertyDescriptor::new("Label", 0, PropertyKind::Str))
        .unwrap();
    registry
        .add_property(
            &actor,
            PropertyDescriptor::new(
                "Scores",
                4,
                PropertyKind::Array(Box::new(PropertyDescriptor::new(
                    "Scores",
                    0,
                    PropertyKind::Int,
                ))),
            ),
        )
        .unwrap();
    actor.link().unwrap();
    let registry = Arc::new(registry);

    let package = Name::intern("RtHeapPkg");
    let arena = ObjectArena::new();
    let mut instance =
        ObjectInstance::new(Name::intern("Hero"), package, &actor, ObjectHandle::NULL).unwrap();
    instance.set("Label", &PropertyValue::Str("the chosen one".into())).unwrap();
    instance
        .set(
            "Scores",
            &PropertyValue::Array(vec![
                PropertyValue::Int(3),
                PropertyValue::Int(1),
                PropertyValue::Int(4),
            ]),
        )
        .unwrap();
    let root = arena.insert(instance);
    let bytes = save_package(&arena, package, &[root], ArchiveOptions::default(), false).unwrap();

    let ctx = new_ctx(Arc::clone(&registry));
    load_sync(&ctx, package, &bytes).unwrap();
    let handle = ctx.directory.lookup(package, Name::intern("Hero")).unwrap();
    let object = ctx.arena.get(handle).unwrap();
    let object = object.read();
    assert_eq!(object.get("Label").unwrap(), PropertyValue::Str("the chosen one".into()));
    assert_eq!(
        object.get("Scores").unwrap(),
        PropertyValue::Array(vec![
            PropertyValue::Int(3),
            PropertyValue::Int(1),
            PropertyValue::Int(4),
        ])
    );
}

fn evo_registry(with_z: bool) -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    let size = if with_z { 12 } else { 8 };
    let shape = registry
        .register_class("EvoShape", size, 4, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&shape, PropertyDescriptor::new("X", 0, PropertyKind::Int))
        .unwrap();
    registry
        .add_property(&shape, PropertyDescriptor::new("Y", 4, PropertyKind::Int))
        .unwrap();
    if with_z {
        registry
            .add_property(&shape, PropertyDescriptor::new("Z", 8, PropertyKind::Int))
            .unwrap();
    }
    shape.link().unwrap();
    Arc::new(registry)
}

fn save_evo(registry: &TypeRegistry, package: Name, with_z: bool) -> Vec<u8> {
    let shape = registry.find(Name::intern("EvoShape")).unwrap();
    let arena = ObjectArena::new();
    let mut instance =
        ObjectInstance::new(Name::intern("Shape1"), package, &shape, ObjectHandle::NULL).unwrap();
    instance.set("X", &PropertyValue::Int(1)).unwrap();
    instance.set("Y", &PropertyValue::Int(2)).unwrap();
    if with_z {
        instance.set("Z", &PropertyValue::Int(3)).unwrap();
    }
    let root = arena.insert(instance);
    save_package(&arena, package, &[root], ArchiveOptions::default(), false).unwrap()
}

#[test]
fn test_newer_data_into_older_class_skips_unknown() {
    let newer = evo_registry(true);
    let package = Name::intern("RtEvoFwdPkg");
    let bytes = save_evo(&newer, package, true);

    // Loader's class has no Z: the tagged entry is skipped, X/Y still land.
    let ctx = new_ctx(evo_registry(false));
    load_sync(&ctx, package, &bytes).unwrap();
    let handle = ctx.directory.lookup(package, Name::intern("Shape1")).unwrap();
    let object = ctx.arena.get(handle).unwrap();
    let object = object.read();
    assert_eq!(object.get("X").unwrap(), PropertyValue::Int(1));
    assert_eq!(object.get("Y").unwrap(), PropertyValue::Int(2));
}

#[test]
fn test_older_data_into_newer_class_keeps_default() {
    let older = evo_registry(false);
    let package = Name::intern("RtEvoBackPkg");
    let bytes = save_evo(&older, package, false);

    let ctx = new_ctx(evo_registry(true));
    load_sync(&ctx, package, &bytes).unwrap();
    let handle = ctx.directory.lookup(package, Name::intern("Shape1")).unwrap();
    let object = ctx.arena.get(handle).unwrap();
    let object = object.read();
    assert_eq!(object.get("X").unwrap(), PropertyValue::Int(1));
    assert_eq!(object.get("Z").unwrap(), PropertyValue::Int(0));
}

#[test]
fn test_unknown_export_class_fails() {
    let registry = TypeRegistry::new();
    let ghost = registry
        .register_class("GhostClass", 4, 4, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&ghost, PropertyDescriptor::new("V", 0, PropertyKind::Int))
        .unwrap();
    ghost.link().unwrap();

    let package = Name::intern("RtGhostPkg");
    let arena = ObjectArena::new();
    let root = arena.insert(
        ObjectInstance::new(Name::intern("Spook"), package, &ghost, ObjectHandle::NULL).unwrap(),
    );
    let bytes = save_package(&arena, package, &[root], ArchiveOptions::default(), false).unwrap();

    // Empty registry on the load side.
    let ctx = new_ctx(Arc::new(TypeRegistry::new()));
    let err = load_sync(&ctx, package, &bytes).unwrap_err();
    assert!(matches!(err, PackageError::UnknownClass { .. }));
}

#[test]
fn test_delegate_and_interface_roundtrip() {
    use relic::gc::trace_refs;

    let registry = TypeRegistry::new();
    let panel = registry
        .register_class("UiPanel", 24, 8, ClassFlags::NONE, None)
        .unwrap();
    registry
        .add_property(&panel, PropertyDescriptor::new("OnClick", 0, PropertyKind::Delegate))
        .unwrap();
    registry
        .add_property(&panel, PropertyDescriptor::new("Theme", 16, PropertyKind::Interface))
        .unwrap();
    panel.link().unwrap();
    let registry = Arc::new(registry);

    let package = Name::intern("RtDelegatePkg");
    let arena = ObjectArena::new();
    let panel_class = registry.find(Name::intern("UiPanel")).unwrap();
    let handler = arena.insert(
        ObjectInstance::new(Name::intern("Handler"), package, &panel_class, ObjectHandle::NULL)
            .unwrap(),
    );
    let theme = arena.insert(
        ObjectInstance::new(Name::intern("DarkTheme"), package, &panel_class, ObjectHandle::NULL)
            .unwrap(),
    );
    let mut root =
        ObjectInstance::new(Name::intern("MainPanel"), package, &panel_class, ObjectHandle::NULL)
            .unwrap();
    root.set(
        "OnClick",
        &PropertyValue::Delegate { target: handler, function: Name::intern("HandleClick") },
    )
    .unwrap();
    root.set("Theme", &PropertyValue::Interface(theme)).unwrap();
    let root = arena.insert(root);

    // Only the panel is a root: both targets must be gathered through the
    // delegate and interface reference slots.
    let bytes = save_package(&arena, package, &[root], ArchiveOptions::default(), false).unwrap();

    let ctx = new_ctx(Arc::clone(&registry));
    let linker = load_sync(&ctx, package, &bytes).unwrap();
    assert_eq!(linker.exports().len(), 3);

    let panel2 = ctx.directory.lookup(package, Name::intern("MainPanel")).unwrap();
    let handler2 = ctx.directory.lookup(package, Name::intern("Handler")).unwrap();
    let theme2 = ctx.directory.lookup(package, Name::intern("DarkTheme")).unwrap();
    let object = ctx.arena.get(panel2).unwrap();
    let object = object.read();
    // The bound function name must come back through the loaded name table.
    assert_eq!(
        object.get("OnClick").unwrap(),
        PropertyValue::Delegate { target: handler2, function: Name::intern("HandleClick") },
    );
    assert_eq!(object.get("Theme").unwrap(), PropertyValue::Interface(theme2));

    // Both targets are live references for the tracer.
    let mut traced: Vec<ObjectHandle> = Vec::new();
    trace_refs(&panel_class.token_stream(), &object.contents, &mut |handle| {
        traced.push(handle);
    });
    traced.sort_unstable_by_key(|h| h.bits());
    let mut expected = vec![handler2, theme2];
    expected.sort_unstable_by_key(|h| h.bits());
    assert_eq!(traced, expected);
}

#[test]
fn test_transient_objects_are_not_saved() {
    use relic::ObjectFlags;

    let registry = point_registry();
    let point = registry.find(Name::intern("Point")).unwrap();
    let package = Name::intern("RtTransientPkg");
    let arena = ObjectArena::new();
    let keep = arena.insert(
        ObjectInstance::new(Name::intern("Kept"), package, &point, ObjectHandle::NULL).unwrap(),
    );
    let mut scratch =
        ObjectInstance::new(Name::intern("Scratch"), package, &point, ObjectHandle::NULL).unwrap();
    scratch.flags.insert(ObjectFlags::TRANSIENT);
    let scratch = arena.insert(scratch);

    let bytes =
        save_package(&arena, package, &[keep, scratch], ArchiveOptions::default(), false).unwrap();
    let ctx = new_ctx(Arc::clone(&registry));
    let linker = load_sync(&ctx, package, &bytes).unwrap();
    assert_eq!(linker.exports().len(), 1);
    assert_eq!(linker.exports()[0].name, Name::intern("Kept"));
}
