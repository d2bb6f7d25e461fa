// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental asynchronous package loading.
//!
//! One [`AsyncPackage`](async_package::AsyncPackage) state machine per
//! in-flight load, ticked cooperatively from a single scheduling thread by
//! [`AsyncLoader`](scheduler::AsyncLoader); byte-level reads are serviced
//! by the [`io::IoDispatcher`] worker pool. A tick either makes progress
//! within the [`TimeSlice`] or parks with its cursors saved, never blocking
//! on I/O and never losing partial progress.

pub mod async_package;
pub mod context;
pub mod io;
pub mod scheduler;

pub use async_package::{AsyncPackage, LoadState, TickOutcome};
pub use context::{LoadContext, ObjectDirectory};
pub use io::{ByteSource, FileSource, IoDispatcher, MemorySource};
pub use scheduler::{AsyncLoader, DirProvider, MemoryProvider, PackageProvider};

use crate::name::Name;
use crate::package::PackageError;
use std::fmt;
use std::time::{Duration, Instant};

/// Soft per-tick time budget.
///
/// `give_up()` always grants the first unit of work in a tick, so an
/// arbitrarily small (even zero) budget still advances every phase by at
/// least one item and the load terminates in a bounded number of ticks.
#[derive(Debug)]
pub struct TimeSlice {
    start: Instant,
    budget: Option<Duration>,
    spent_one: bool,
}

impl TimeSlice {
    /// Fresh slice starting now. `None` disables the budget.
    #[must_use]
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
            spent_one: false,
        }
    }

    /// Slice with no budget at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Check the budget before one unit of work. `true` means yield now.
    pub fn give_up(&mut self) -> bool {
        if !self.spent_one {
            self.spent_one = true;
            return false;
        }
        match self.budget {
            None => false,
            Some(budget) => self.start.elapsed() >= budget,
        }
    }
}

/// One package load's failure, surfaced through its completion callbacks.
#[derive(Debug, Clone)]
pub enum LoadError {
    /// The package file itself is unusable.
    Package { package: Name, source: PackageError },
    /// No provider knows this package.
    Missing { package: Name },
    /// The I/O worker failed to produce the bytes.
    Io { package: Name, reason: String },
    /// The load was cancelled between ticks.
    Cancelled { package: Name },
}

impl LoadError {
    /// The package this failure belongs to.
    #[must_use]
    pub fn package(&self) -> Name {
        match self {
            LoadError::Package { package, .. }
            | LoadError::Missing { package }
            | LoadError::Io { package, .. }
            | LoadError::Cancelled { package } => *package,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Package { package, source } => {
                write!(f, "package '{}' failed to load: {}", package, source)
            }
            LoadError::Missing { package } => write!(f, "package '{}' not found", package),
            LoadError::Io { package, reason } => {
                write!(f, "package '{}' I/O failed: {}", package, reason)
            }
            LoadError::Cancelled { package } => write!(f, "package '{}' load cancelled", package),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Package { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_still_grants_one_unit() {
        let mut slice = TimeSlice::new(Some(Duration::ZERO));
        assert!(!slice.give_up());
        assert!(slice.give_up());
    }

    #[test]
    fn test_unlimited_never_gives_up() {
        let mut slice = TimeSlice::unlimited();
        for _ in 0..1000 {
            assert!(!slice.give_up());
        }
    }

    #[test]
    fn test_load_error_carries_package() {
        let err = LoadError::Missing {
            package: Name::intern("GhostPkg"),
        };
        assert_eq!(err.package(), Name::intern("GhostPkg"));
        assert_eq!(err.to_string(), "package 'GhostPkg' not found");
    }
}
