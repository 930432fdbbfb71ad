// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lock-free growable box.
//!
//! Each coordinate is stored as a `u32` whose unsigned order matches the
//! float order, so growing a box is a `fetch_min`/`fetch_max` per axis.

use core::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

use crate::types::Aabb3;

/// Map an `f32` to a `u32` with the same total order (for non-NaN inputs).
#[inline]
pub(crate) fn encode(f: f32) -> u32 {
    let bits = f.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Inverse of [`encode`].
#[inline]
pub(crate) fn decode(u: u32) -> f32 {
    let bits = if u & 0x8000_0000 != 0 {
        u & 0x7fff_ffff
    } else {
        !u
    };
    f32::from_bits(bits)
}

/// A box that many threads may grow concurrently.
pub struct AtomicAabb3 {
    lower: [AtomicU32; 3],
    upper: [AtomicU32; 3],
}

impl AtomicAabb3 {
    /// A new accumulator holding [`Aabb3::EMPTY`].
    pub fn new() -> Self {
        let lo = encode(f32::INFINITY);
        let hi = encode(f32::NEG_INFINITY);
        Self {
            lower: [AtomicU32::new(lo), AtomicU32::new(lo), AtomicU32::new(lo)],
            upper: [AtomicU32::new(hi), AtomicU32::new(hi), AtomicU32::new(hi)],
        }
    }

    /// Reset to [`Aabb3::EMPTY`].
    pub fn clear(&self) {
        self.store(&Aabb3::EMPTY);
    }

    /// Overwrite with `b`.
    pub fn store(&self, b: &Aabb3) {
        for axis in 0..3 {
            self.lower[axis].store(encode(b.lower[axis]), Ordering::Relaxed);
            self.upper[axis].store(encode(b.upper[axis]), Ordering::Relaxed);
        }
    }

    /// Grow to include the point.
    pub fn grow_point(&self, p: Vec3) {
        self.grow(&Aabb3::from_point(p));
    }

    /// Grow to include the box. Growing by an empty box is a no-op.
    pub fn grow(&self, b: &Aabb3) {
        if b.is_empty() {
            return;
        }
        for axis in 0..3 {
            self.lower[axis].fetch_min(encode(b.lower[axis]), Ordering::Relaxed);
            self.upper[axis].fetch_max(encode(b.upper[axis]), Ordering::Relaxed);
        }
    }

    /// Snapshot the accumulated box.
    pub fn load(&self) -> Aabb3 {
        let get = |a: &[AtomicU32; 3]| {
            Vec3::new(
                decode(a[0].load(Ordering::Relaxed)),
                decode(a[1].load(Ordering::Relaxed)),
                decode(a[2].load(Ordering::Relaxed)),
            )
        };
        Aabb3::new(get(&self.lower), get(&self.upper))
    }
}

impl Default for AtomicAabb3 {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AtomicAabb3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AtomicAabb3").field(&self.load()).finish()
    }
}
