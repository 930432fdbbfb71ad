// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memory resources and scoped buffers.
//!
//! Every buffer a build touches is drawn from a caller-supplied
//! [`MemoryResource`]. Intermediates live in a [`DeviceBuffer`] that gives its
//! bytes back when dropped, so they are released on every exit path. Output
//! buffers are [detached](DeviceBuffer::detach) and stay charged to the
//! resource until the caller frees the finished [`Bvh`](crate::Bvh).

use core::fmt::Debug;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BuildError;
use crate::queue::Queue;

/// Allocation accounting against a pool, keyed to an execution queue.
pub trait MemoryResource: Debug + Sync {
    /// Reserve `bytes` for use on `queue`.
    fn malloc(&self, bytes: usize, queue: &Queue) -> Result<(), BuildError>;

    /// Return `bytes` previously reserved on `queue`.
    fn free(&self, bytes: usize, queue: &Queue);
}

/// Host memory with optional capacity limit and usage counters.
#[derive(Debug, Default)]
pub struct HostMemoryResource {
    capacity: Option<usize>,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
}

impl HostMemoryResource {
    /// An unbounded resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resource that refuses to hold more than `capacity` bytes at once.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Bytes currently reserved.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Largest value [`in_use`](Self::in_use) has reached.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Number of successful `malloc` calls.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }
}

impl MemoryResource for HostMemoryResource {
    fn malloc(&self, bytes: usize, _queue: &Queue) -> Result<(), BuildError> {
        let capacity = self.capacity.unwrap_or(usize::MAX);
        let prev = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= capacity)
            })
            .map_err(|used| BuildError::OutOfMemory {
                requested: bytes,
                available: capacity.saturating_sub(used),
            })?;
        self.peak.fetch_max(prev + bytes, Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn free(&self, bytes: usize, _queue: &Queue) {
        let prev = self.in_use.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(prev >= bytes, "freed more than was allocated");
    }
}

/// A buffer charged to a [`MemoryResource`] for as long as it lives.
pub(crate) struct DeviceBuffer<'r, T> {
    data: Vec<T>,
    bytes: usize,
    resource: &'r dyn MemoryResource,
    queue: &'r Queue,
}

impl<'r, T> DeviceBuffer<'r, T> {
    /// Allocate `len` elements, each produced by `init`.
    pub(crate) fn alloc_with(
        len: usize,
        init: impl FnMut(usize) -> T,
        queue: &'r Queue,
        resource: &'r dyn MemoryResource,
    ) -> Result<Self, BuildError> {
        let bytes = len
            .checked_mul(size_of::<T>())
            .ok_or(BuildError::OutOfMemory {
                requested: usize::MAX,
                available: 0,
            })?;
        resource.malloc(bytes, queue)?;
        // Charged from here on; `buf` hands the bytes back if the host allocation fails.
        let mut buf = Self {
            data: Vec::new(),
            bytes,
            resource,
            queue,
        };
        buf.data
            .try_reserve_exact(len)
            .map_err(|_| BuildError::OutOfMemory {
                requested: bytes,
                available: 0,
            })?;
        buf.data.extend((0..len).map(init));
        Ok(buf)
    }

    /// Stop charging the resource here; the caller now owns the bytes.
    pub(crate) fn detach(mut self) -> Vec<T> {
        self.bytes = 0;
        core::mem::take(&mut self.data)
    }
}

impl<'r, T: Clone> DeviceBuffer<'r, T> {
    /// Allocate `len` copies of `value`.
    pub(crate) fn alloc(
        len: usize,
        value: T,
        queue: &'r Queue,
        resource: &'r dyn MemoryResource,
    ) -> Result<Self, BuildError> {
        Self::alloc_with(len, |_| value.clone(), queue, resource)
    }
}

impl<T> Drop for DeviceBuffer<'_, T> {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.resource.free(self.bytes, self.queue);
        }
    }
}

impl<T> Deref for DeviceBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for DeviceBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Debug for DeviceBuffer<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_returns_bytes() {
        let q = Queue::default();
        let res = HostMemoryResource::new();
        {
            let a = DeviceBuffer::alloc(16, 0_u64, &q, &res).unwrap();
            let _b = DeviceBuffer::alloc(4, 0_u32, &q, &res).unwrap();
            assert_eq!(a.len(), 16);
            assert_eq!(res.in_use(), 16 * 8 + 4 * 4);
        }
        assert_eq!(res.in_use(), 0);
        assert_eq!(res.peak(), 16 * 8 + 4 * 4);
        assert_eq!(res.allocations(), 2);
    }

    #[test]
    fn detached_bytes_stay_charged() {
        let q = Queue::default();
        let res = HostMemoryResource::new();
        let buf = DeviceBuffer::alloc_with(3, |i| i as u32, &q, &res).unwrap();
        let v = buf.detach();
        assert_eq!(v, vec![0, 1, 2]);
        assert_eq!(res.in_use(), 12);
        res.free(12, &q);
        assert_eq!(res.in_use(), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let q = Queue::default();
        let res = HostMemoryResource::with_capacity(100);
        let _a = DeviceBuffer::alloc(10, 0_u64, &q, &res).unwrap();
        let err = DeviceBuffer::alloc(10, 0_u32, &q, &res).unwrap_err();
        assert_eq!(
            err,
            BuildError::OutOfMemory {
                requested: 40,
                available: 20,
            }
        );
        assert_eq!(res.in_use(), 80, "a refused request charges nothing");
    }
}
