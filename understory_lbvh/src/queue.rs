// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Execution queue: ordered dispatches of fixed-size work groups.
//!
//! A [`Queue`] plays the role of a device command stream. Every dispatch
//! splits its items into work groups of [`Queue::group_size`] items and runs
//! the groups in parallel on a rayon pool. Items inside one group run on one
//! worker, so locals inside a group closure act as group-local scratch and the
//! end of a loop over the group's items acts as the group barrier.
//!
//! Dispatches return only once every group has finished, so two dispatches
//! issued in sequence observe each other's writes in issue order.

use core::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::BuildError;

/// Items per work group when none is requested.
pub const DEFAULT_GROUP_SIZE: usize = 1024;

/// One work group of a dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WorkGroup {
    /// Global item indices covered by this group.
    pub(crate) range: Range<usize>,
}

/// An in-order execution stream backed by a rayon pool.
#[derive(Clone)]
pub struct Queue {
    pool: Option<Arc<rayon::ThreadPool>>,
    group_size: usize,
}

impl Queue {
    /// A queue on rayon's global pool.
    ///
    /// A `group_size` of zero selects [`DEFAULT_GROUP_SIZE`].
    pub fn new(group_size: usize) -> Self {
        Self {
            pool: None,
            group_size: normalize_group_size(group_size),
        }
    }

    /// A queue with its own pool of `threads` workers.
    pub fn with_threads(threads: usize, group_size: usize) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lbvh-worker-{i}"))
            .build()
            .map_err(|e| BuildError::Device(format!("failed to create worker pool: {e}")))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
            group_size: normalize_group_size(group_size),
        })
    }

    /// Items per work group.
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Number of workers serving this queue.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn num_groups(&self, num_items: usize) -> usize {
        num_items.div_ceil(self.group_size)
    }

    fn group(&self, index: usize, num_items: usize) -> WorkGroup {
        let begin = index * self.group_size;
        WorkGroup {
            range: begin..(begin + self.group_size).min(num_items),
        }
    }

    /// Run `op` on this queue's pool, turning a worker panic into an error.
    pub(crate) fn run<R, F>(&self, label: &str, op: F) -> Result<R, BuildError>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        let result = catch_unwind(AssertUnwindSafe(|| match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }));
        result.map_err(|payload| {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                String::from(*s)
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                String::from("worker panicked")
            };
            BuildError::Device(format!("{label}: {msg}"))
        })
    }

    /// Launch `kernel` once per work group over `num_items` items.
    pub(crate) fn dispatch<R, F>(
        &self,
        label: &str,
        num_items: usize,
        kernel: F,
    ) -> Result<Vec<R>, BuildError>
    where
        R: Send,
        F: Fn(WorkGroup) -> R + Sync + Send,
    {
        let groups = self.num_groups(num_items);
        log::trace!("dispatch {label}: {num_items} items in {groups} groups");
        self.run(label, || {
            (0..groups)
                .into_par_iter()
                .map(|g| kernel(self.group(g, num_items)))
                .collect()
        })
    }

    /// Like [`Queue::dispatch`], handing each group its own chunk of `out`.
    pub(crate) fn dispatch_mut<T, R, F>(
        &self,
        label: &str,
        out: &mut [T],
        kernel: F,
    ) -> Result<Vec<R>, BuildError>
    where
        T: Send,
        R: Send,
        F: Fn(WorkGroup, &mut [T]) -> R + Sync + Send,
    {
        let num_items = out.len();
        log::trace!(
            "dispatch {label}: {num_items} items in {} groups",
            self.num_groups(num_items)
        );
        self.run(label, || {
            out.par_chunks_mut(self.group_size)
                .enumerate()
                .map(|(g, chunk)| kernel(self.group(g, num_items), chunk))
                .collect()
        })
    }

    /// Like [`Queue::dispatch_mut`] over two equally long outputs.
    pub(crate) fn dispatch_mut2<A, B, R, F>(
        &self,
        label: &str,
        a: &mut [A],
        b: &mut [B],
        kernel: F,
    ) -> Result<Vec<R>, BuildError>
    where
        A: Send,
        B: Send,
        R: Send,
        F: Fn(WorkGroup, &mut [A], &mut [B]) -> R + Sync + Send,
    {
        if a.len() != b.len() {
            return Err(BuildError::Device(format!(
                "{label}: output lengths differ ({} vs {})",
                a.len(),
                b.len()
            )));
        }
        let num_items = a.len();
        log::trace!(
            "dispatch {label}: {num_items} items in {} groups",
            self.num_groups(num_items)
        );
        self.run(label, || {
            a.par_chunks_mut(self.group_size)
                .zip(b.par_chunks_mut(self.group_size))
                .enumerate()
                .map(|(g, (ca, cb))| kernel(self.group(g, num_items), ca, cb))
                .collect()
        })
    }
}

fn normalize_group_size(group_size: usize) -> usize {
    if group_size == 0 {
        DEFAULT_GROUP_SIZE
    } else {
        group_size
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_SIZE)
    }
}

impl core::fmt::Debug for Queue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Queue")
            .field("group_size", &self.group_size)
            .field("dedicated_pool", &self.pool.is_some())
            .field("threads", &self.num_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn groups_cover_items_exactly_once() {
        let q = Queue::new(7);
        let seen = AtomicUsize::new(0);
        let ranges = q
            .dispatch("cover", 50, |g| {
                seen.fetch_add(g.range.len(), Ordering::Relaxed);
                g.range
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 50);
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[0], 0..7);
        assert_eq!(ranges[7], 49..50);
    }

    #[test]
    fn empty_dispatch_runs_nothing() {
        let q = Queue::default();
        let out: Vec<()> = q.dispatch("nothing", 0, |_| ()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn dispatch_mut_hands_out_matching_chunks() {
        let q = Queue::with_threads(2, 4).unwrap();
        let mut out = vec![0_usize; 10];
        q.dispatch_mut("iota", &mut out, |g, chunk| {
            for (slot, i) in chunk.iter_mut().zip(g.range) {
                *slot = i;
            }
        })
        .unwrap();
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn mismatched_outputs_are_rejected() {
        let q = Queue::default();
        let mut a = [0_u8; 3];
        let mut b = [0_u8; 4];
        let r = q.dispatch_mut2("mismatch", &mut a, &mut b, |_, _, _| ());
        assert!(matches!(r, Err(BuildError::Device(_))));
    }

    #[test]
    fn worker_panic_becomes_device_error() {
        let q = Queue::new(1);
        let r = q.dispatch("boom", 4, |g| {
            if g.range.start == 2 {
                panic!("kernel fault");
            }
        });
        match r {
            Err(BuildError::Device(msg)) => assert!(msg.contains("kernel fault"), "{msg}"),
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[test]
    fn zero_group_size_selects_default() {
        assert_eq!(Queue::new(0).group_size(), DEFAULT_GROUP_SIZE);
    }
}
