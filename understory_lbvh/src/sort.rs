// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key/value sorting of Morton keys and primitive ids.

use core::fmt::Debug;

use rayon::prelude::*;

use crate::error::BuildError;
use crate::queue::Queue;

/// Sorts `(key, id)` pairs by ascending key.
///
/// Sorting is two-phase: the caller first asks how much scratch a given
/// length needs, allocates it, and then passes it to
/// [`sort_pairs`](Self::sort_pairs). Equal keys may come out in any order.
pub trait KeyValueSorter: Debug + Sync {
    /// Scratch words required to sort `len` pairs.
    fn scratch_len(&self, len: usize) -> usize;

    /// Sort `keys_in`/`ids_in` into `keys_out`/`ids_out`.
    ///
    /// All four slices have the same length and `scratch` holds at least
    /// [`scratch_len`](Self::scratch_len) words.
    fn sort_pairs(
        &self,
        queue: &Queue,
        scratch: &mut [u64],
        keys_in: &[u64],
        ids_in: &[u32],
        keys_out: &mut [u64],
        ids_out: &mut [u32],
    ) -> Result<(), BuildError>;
}

/// Least-significant-digit radix sort over 8-bit digits.
///
/// Digit histograms are computed in parallel; passes whose digit is the same
/// for every key are skipped, which makes the usual case of keys confined to
/// 63 bits (and clustered scenes) cheaper.
#[derive(Copy, Clone, Debug, Default)]
pub struct RadixSorter;

const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;
const PASSES: u32 = u64::BITS / RADIX_BITS;
/// Keys per parallel histogram task.
const HISTOGRAM_CHUNK: usize = 1 << 14;

#[inline]
#[allow(
    clippy::cast_possible_truncation,
    reason = "The shifted key is masked down to one digit."
)]
fn digit(key: u64, pass: u32) -> usize {
    ((key >> (pass * RADIX_BITS)) as usize) & (RADIX - 1)
}

fn histogram(keys: &[u64], pass: u32) -> [usize; RADIX] {
    keys.par_chunks(HISTOGRAM_CHUNK)
        .map(|chunk| {
            let mut h = [0_usize; RADIX];
            for &k in chunk {
                h[digit(k, pass)] += 1;
            }
            h
        })
        .reduce(
            || [0_usize; RADIX],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += *y;
                }
                a
            },
        )
}

fn scatter(
    pass: u32,
    counts: &[usize; RADIX],
    src_keys: &[u64],
    src_ids: &[u32],
    dst_keys: &mut [u64],
    dst_ids: &mut [u32],
) {
    let mut offsets = [0_usize; RADIX];
    let mut sum = 0;
    for (o, c) in offsets.iter_mut().zip(counts) {
        *o = sum;
        sum += *c;
    }
    for (&k, &id) in src_keys.iter().zip(src_ids) {
        let d = digit(k, pass);
        dst_keys[offsets[d]] = k;
        dst_ids[offsets[d]] = id;
        offsets[d] += 1;
    }
}

impl KeyValueSorter for RadixSorter {
    fn scratch_len(&self, len: usize) -> usize {
        // Ping-pong keys, then ids packed two per word.
        len + len.div_ceil(2)
    }

    fn sort_pairs(
        &self,
        queue: &Queue,
        scratch: &mut [u64],
        keys_in: &[u64],
        ids_in: &[u32],
        keys_out: &mut [u64],
        ids_out: &mut [u32],
    ) -> Result<(), BuildError> {
        let len = keys_in.len();
        if ids_in.len() != len || keys_out.len() != len || ids_out.len() != len {
            return Err(BuildError::Sort(format!(
                "length mismatch: keys_in={len}, ids_in={}, keys_out={}, ids_out={}",
                ids_in.len(),
                keys_out.len(),
                ids_out.len()
            )));
        }
        let need = self.scratch_len(len);
        if scratch.len() < need {
            return Err(BuildError::Sort(format!(
                "scratch holds {} words, {need} required",
                scratch.len()
            )));
        }
        let (tmp_keys, tmp_ids) = scratch[..need].split_at_mut(len);
        let tmp_ids = &mut bytemuck::cast_slice_mut::<u64, u32>(tmp_ids)[..len];

        queue.run("radix_sort", || {
            // Where the current sorted-so-far sequence lives.
            #[derive(Copy, Clone, PartialEq, Eq)]
            enum Loc {
                Input,
                Out,
                Tmp,
            }
            let mut cur = Loc::Input;
            for pass in 0..PASSES {
                let src_keys: &[u64] = match cur {
                    Loc::Input => keys_in,
                    Loc::Out => keys_out,
                    Loc::Tmp => tmp_keys,
                };
                let counts = histogram(src_keys, pass);
                if counts.iter().any(|&c| c == len) {
                    continue;
                }
                let next = if cur == Loc::Out { Loc::Tmp } else { Loc::Out };
                match cur {
                    Loc::Input => scatter(pass, &counts, keys_in, ids_in, keys_out, ids_out),
                    Loc::Tmp => scatter(pass, &counts, tmp_keys, tmp_ids, keys_out, ids_out),
                    Loc::Out => scatter(pass, &counts, keys_out, ids_out, tmp_keys, tmp_ids),
                }
                cur = next;
            }
            match cur {
                Loc::Input => {
                    keys_out.copy_from_slice(keys_in);
                    ids_out.copy_from_slice(ids_in);
                }
                Loc::Tmp => {
                    keys_out.copy_from_slice(tmp_keys);
                    ids_out.copy_from_slice(tmp_ids);
                }
                Loc::Out => {}
            }
        })
    }
}
