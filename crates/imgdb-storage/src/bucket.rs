//! The inverted index: one bucket per (channel, sign, coefficient) triple,
//! each holding the refs of every image whose signature set that
//! coefficient.
//!
//! The ref type is a type parameter rather than a fixed `u32`: normal and
//! simple mode store the dense internal index (32-bit), alter mode stores
//! the caller's 64-bit image id directly, since its buckets must remain
//! meaningful across the index renumbering that save-time compaction does.

use std::rc::Rc;

use imgdb_types::{coef_sign_index, ImageId, Result, MAX_COEF_INDEX, NUM_CHANNELS, NUM_SIGNS, NUM_BUCKETS};

use crate::pagedfile::{MappedList, PagedList, SharedPageFile};

/// A value a bucket can hold: either a dense 32-bit internal index or a
/// 64-bit image id.
pub trait BucketRef: Copy + PartialEq {}
impl BucketRef for u32 {}
impl BucketRef for u64 {}

pub fn bucket_id(channel: usize, sign: usize, coef_index: usize) -> usize {
    debug_assert!(channel < NUM_CHANNELS);
    debug_assert!(sign < NUM_SIGNS);
    debug_assert!(coef_index >= 1 && coef_index <= MAX_COEF_INDEX);
    channel * NUM_SIGNS * MAX_COEF_INDEX + sign * MAX_COEF_INDEX + (coef_index - 1)
}

/// The full 3-dimensional index: `NUM_CHANNELS * NUM_SIGNS * MAX_COEF_INDEX`
/// independently growable buckets, all paging through one shared temp file.
pub struct BucketStore<R: BucketRef = u32> {
    shared: Rc<SharedPageFile>,
    buckets: Vec<PagedList<R>>,
}

impl<R: BucketRef> BucketStore<R> {
    pub fn new() -> Self {
        let shared = Rc::new(SharedPageFile::new());
        let buckets = (0..NUM_BUCKETS)
            .map(|_| PagedList::new(Rc::clone(&shared)))
            .collect();
        Self { shared, buckets }
    }

    /// Adds `entry` to the buckets for every coefficient in `sig`, skipping
    /// the chrominance channels when `grayscale` is set.
    pub fn add(
        &mut self,
        sig: &[[i16; imgdb_types::NUM_COEFS]; NUM_CHANNELS],
        entry: R,
        grayscale: bool,
    ) {
        for (channel, coefs) in sig.iter().enumerate() {
            if grayscale && channel > 0 {
                continue;
            }
            for &coef in coefs {
                if coef == 0 {
                    continue;
                }
                let (sign, idx) = coef_sign_index(coef);
                self.buckets[bucket_id(channel, sign, idx)].push(entry);
            }
        }
    }

    /// Removes `entry` from every bucket `sig` placed it in. Normal mode is
    /// the only mode that calls this directly; simple mode relies on the
    /// live-check sentinel instead, and alter mode defers cleanup to save.
    pub fn remove(
        &mut self,
        sig: &[[i16; imgdb_types::NUM_COEFS]; NUM_CHANNELS],
        entry: R,
        grayscale: bool,
    ) {
        for (channel, coefs) in sig.iter().enumerate() {
            if grayscale && channel > 0 {
                continue;
            }
            for &coef in coefs {
                if coef == 0 {
                    continue;
                }
                let (sign, idx) = coef_sign_index(coef);
                self.buckets[bucket_id(channel, sign, idx)].remove_value(entry);
            }
        }
    }

    /// Maps the bucket at `(channel, sign, coef_index)` for scanning during a
    /// query. Returns an empty mapping if the bucket has never been written.
    pub fn map_bucket(&mut self, channel: usize, sign: usize, coef_index: usize) -> Result<MappedList<R>> {
        self.buckets[bucket_id(channel, sign, coef_index)].map_all(false)
    }

    pub fn bucket_len(&self, channel: usize, sign: usize, coef_index: usize) -> usize {
        self.buckets[bucket_id(channel, sign, coef_index)].len()
    }

    /// Pre-grows bucket `(channel, sign, coef_index)` to hold `n` entries,
    /// used during load to avoid page_out churn while replaying signatures.
    pub fn reserve(&mut self, channel: usize, sign: usize, coef_index: usize, n: usize) {
        self.buckets[bucket_id(channel, sign, coef_index)].reserve(n);
    }

    /// Moves every bucket's tail into its base. Called once after a full
    /// load so subsequent reads hit purely memory-mapped pages.
    pub fn set_base_all(&mut self) -> Result<()> {
        for bucket in &mut self.buckets {
            bucket.set_base()?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn page_size(&self) -> usize {
        self.shared.page_size()
    }
}

impl<R: BucketRef> Default for BucketStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts an image id into the 64-bit bucket ref alter mode stores.
pub fn alter_ref(id: ImageId) -> u64 {
    id.as_u64()
}
