// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Relic - Reflected Objects, Packaged and Streamed
//!
//! A pure Rust engine for reflection-driven binary object serialization and
//! incremental, asynchronous package loading: runtime class descriptors
//! drive a self-describing tagged property format, packages carry name,
//! import and export tables, and loads are time-sliced state machines that
//! resolve cross-package references without ever blocking a frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relic::{
//!     ClassFlags, Name, ObjectArena, ObjectInstance, PropertyDescriptor,
//!     PropertyKind, PropertyValue, TypeRegistry,
//! };
//! use relic::archive::ArchiveOptions;
//! use relic::linker::save_package;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Describe a class at runtime.
//!     let registry = TypeRegistry::new();
//!     let point = registry.register_class(Name::intern("Point"), 8, 4, ClassFlags::NONE, None)?;
//!     registry.add_property(
//!         &point,
//!         PropertyDescriptor::new(Name::intern("X"), 0, PropertyKind::Int),
//!     )?;
//!     registry.add_property(
//!         &point,
//!         PropertyDescriptor::new(Name::intern("Y"), 4, PropertyKind::Int),
//!     )?;
//!     point.link()?;
//!
//!     // Instantiate and save.
//!     let arena = ObjectArena::new();
//!     let pkg = Name::intern("MyPkg");
//!     let mut origin = ObjectInstance::new(Name::intern("Origin"), pkg, &point, relic::ObjectHandle::NULL)?;
//!     origin.set("X", &PropertyValue::Int(3))?;
//!     let root = arena.insert(origin);
//!     let bytes = save_package(&arena, pkg, &[root], ArchiveOptions::default(), false)?;
//!     std::fs::write("MyPkg.rpk", bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                         Loader Layer                               |
//! |   AsyncLoader -> AsyncPackage (phased, time-sliced) -> IoDispatcher|
//! +--------------------------------------------------------------------+
//! |                         Linker Layer                               |
//! |   LinkerLoad / LinkerSave | name, import and export tables         |
//! +--------------------------------------------------------------------+
//! |                        Archive Layer                               |
//! |   Tagged property streams | compact indices | byte cursors         |
//! +--------------------------------------------------------------------+
//! |                    Reflection and Objects                          |
//! |   ClassDescriptor/PropertyDescriptor | ObjectArena | ref tokens    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TypeRegistry`] | Registers and links runtime class descriptors |
//! | [`ObjectArena`] | Generational storage for live object instances |
//! | [`loader::AsyncLoader`] | Schedules every in-flight package load |
//! | [`linker::LinkerSave`] | Gathers an object graph into a package file |
//! | [`Name`] | Interned case-preserving identifier, 4 bytes to copy |
//!
//! ## Modules Overview
//!
//! - [`reflect`] - Class and property descriptors (start here)
//! - [`object`] - Instances, the arena, typed property access
//! - [`archive`] - Tagged binary serialization
//! - [`package`] - On-disk package format (summary and tables)
//! - [`linker`] - Save/load bridging between tables and live objects
//! - [`loader`] - Incremental async loading
//! - [`gc`] - Reference token streams for graph traversal

/// Byte cursors, archive policy flags and the tagged property format.
pub mod archive;
/// File format constants and loader configuration.
pub mod config;
/// Reference token streams (precomputed object-reference layouts).
pub mod gc;
/// Save and load linkers over package tables.
pub mod linker;
/// Incremental asynchronous package loading.
pub mod loader;
/// Interned names.
pub mod name;
/// Object instances and their storage arena.
pub mod object;
/// On-disk package format: summary, name/import/export tables.
pub mod package;
/// Runtime reflection: class and property descriptors.
pub mod reflect;

pub use config::LoaderConfig;
pub use name::Name;
pub use object::{ObjectArena, ObjectFlags, ObjectHandle, ObjectInstance, PropertyValue};
pub use reflect::{ClassDescriptor, ClassFlags, PropertyDescriptor, PropertyFlags, PropertyKind, TypeRegistry};
