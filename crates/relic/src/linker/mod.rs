// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linkers: the bridge between package tables and live objects.
//!
//! [`LinkerSave`] gathers an object graph into export/import/name tables
//! and writes a package file; [`LinkerLoad`] parses one incrementally and
//! resolves table indices back to arena handles, deferring imports whose
//! source package is still in flight.

pub mod load;
pub mod save;

pub use load::LinkerLoad;
pub use save::{save_package, LinkerSave};
