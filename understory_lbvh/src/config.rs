// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Build configuration.

/// Knobs for a single build.
///
/// `make_leaf_threshold <= 0` selects the default threshold of one primitive
/// per leaf; positive values are clamped by `max_allowed_leaf_size`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildConfig {
    /// Ranges of at most this many primitives become leaves.
    pub make_leaf_threshold: i32,
    /// Upper clamp for `make_leaf_threshold`.
    pub max_allowed_leaf_size: i32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            make_leaf_threshold: 0,
            max_allowed_leaf_size: 1 << 15,
        }
    }
}

impl BuildConfig {
    /// Set the leaf threshold.
    #[must_use]
    pub fn with_leaf_threshold(mut self, threshold: i32) -> Self {
        self.make_leaf_threshold = threshold;
        self
    }

    /// Set the clamp applied to the leaf threshold.
    #[must_use]
    pub fn with_max_allowed_leaf_size(mut self, max: i32) -> Self {
        self.max_allowed_leaf_size = max;
        self
    }

    /// The threshold the builder actually uses; never less than one.
    pub fn effective_leaf_threshold(&self) -> u32 {
        if self.make_leaf_threshold > 0 {
            let t = self.make_leaf_threshold.min(self.max_allowed_leaf_size);
            u32::try_from(t).unwrap_or(0).max(1)
        } else {
            1
        }
    }
}
