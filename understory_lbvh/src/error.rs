// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Build failures.

use thiserror::Error;

/// Reasons a build can abort.
///
/// A build either completes or fails as a whole: nothing partial escapes and
/// every intermediate buffer has been released by the time this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The memory resource refused an allocation.
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes asked for.
        requested: usize,
        /// Bytes the resource still had.
        available: usize,
    },
    /// The key/value sorter failed.
    #[error("sort failed: {0}")]
    Sort(String),
    /// A dispatch failed or left the build in an inconsistent state.
    #[error("device operation failed: {0}")]
    Device(String),
    /// More primitives than 32-bit primitive ids can address.
    #[error("{0} primitives exceed the 32-bit primitive id range")]
    TooManyPrimitives(usize),
}
