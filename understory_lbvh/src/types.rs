// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and helpers.

use glam::Vec3;

/// Axis-aligned bounding box in 3D.
///
/// A box is *empty* when any axis has `upper < lower`. [`Aabb3::EMPTY`] is the
/// canonical empty value; primitives carrying an empty box are excluded from
/// the hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Aabb3 {
    /// Minimum corner.
    pub lower: Vec3,
    /// Maximum corner.
    pub upper: Vec3,
}

impl Aabb3 {
    /// The "no geometry" sentinel: growing it by anything yields that thing.
    pub const EMPTY: Self = Self {
        lower: Vec3::splat(f32::INFINITY),
        upper: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a new AABB from min/max corners.
    pub const fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    /// A degenerate box holding a single point.
    pub const fn from_point(p: Vec3) -> Self {
        Self { lower: p, upper: p }
    }

    /// Create an AABB from a minimum corner and an extent.
    pub fn from_origin_size(origin: Vec3, size: Vec3) -> Self {
        Self {
            lower: origin,
            upper: origin + size,
        }
    }

    /// Return true if the AABB is empty or inverted on any axis. Assumes no NaN.
    pub fn is_empty(&self) -> bool {
        self.upper.cmplt(self.lower).any()
    }

    /// Midpoint of the box.
    pub fn center(&self) -> Vec3 {
        0.5 * (self.lower + self.upper)
    }

    /// Extent of the box along each axis.
    pub fn size(&self) -> Vec3 {
        self.upper - self.lower
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Smallest box containing both `self` and the point.
    #[must_use]
    pub fn grow_point(&self, p: Vec3) -> Self {
        Self {
            lower: self.lower.min(p),
            upper: self.upper.max(p),
        }
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Self) -> bool {
        self.lower.cmple(other.lower).all() && other.upper.cmple(self.upper).all()
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Union of an iterator of boxes; [`Aabb3::EMPTY`] when there are none.
pub(crate) fn union_all<I: IntoIterator<Item = Aabb3>>(boxes: I) -> Aabb3 {
    boxes
        .into_iter()
        .fold(Aabb3::EMPTY, |acc, b| acc.union(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_identity_for_union() {
        let b = Aabb3::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 3.0, 4.0));
        assert!(Aabb3::EMPTY.is_empty());
        assert_eq!(Aabb3::EMPTY.union(&b), b);
        assert_eq!(b.union(&Aabb3::EMPTY), b);
        assert_eq!(Aabb3::default(), Aabb3::EMPTY);
    }

    #[test]
    fn inverted_on_one_axis_is_empty() {
        let b = Aabb3::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 1.0, 0.0));
        assert!(b.is_empty());
        let flat = Aabb3::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0));
        assert!(!flat.is_empty(), "zero extent is not empty");
    }

    #[test]
    fn center_and_size() {
        let b = Aabb3::from_origin_size(Vec3::new(2.0, 4.0, 6.0), Vec3::new(2.0, 2.0, 4.0));
        assert_eq!(b.center(), Vec3::new(3.0, 5.0, 8.0));
        assert_eq!(b.size(), Vec3::new(2.0, 2.0, 4.0));
        assert!(b.contains(&Aabb3::from_point(b.center())));
    }

    #[test]
    fn union_all_of_nothing_is_empty() {
        assert!(union_all(core::iter::empty()).is_empty());
        let u = union_all([
            Aabb3::from_point(Vec3::ZERO),
            Aabb3::from_point(Vec3::new(1.0, -1.0, 2.0)),
        ]);
        assert_eq!(u, Aabb3::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 0.0, 2.0)));
    }
}
