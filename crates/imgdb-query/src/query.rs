//! The scoring and selection algorithm.
//!
//! Score accumulation order is coefficient-major (outer loop over query
//! coefficients, inner loop over the images a bucket lists) to match the
//! reference ordering: summing in a different order changes floating-point
//! rounding even though it wouldn't change the set of top-N results.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use imgdb_types::{
    coef_sign_index, weight_for, ImageId, ImageInfo, Result, Score, NUM_CHANNELS, NUM_COEFS,
};
use imgdb_storage::BucketStore;

/// A query's signature, matching flags, and mask filter.
pub struct QueryArg {
    pub sig: [[i16; NUM_COEFS]; NUM_CHANNELS],
    pub avgl: [Score; NUM_CHANNELS],
    pub numres: usize,
    pub sketch: bool,
    pub grayscale: bool,
    pub fast: bool,
    pub nocommon: bool,
    pub uniqueset: bool,
    pub mask: Option<(u32, u32)>,
}

impl QueryArg {
    fn is_grayscale(&self) -> bool {
        self.grayscale
            || self.avgl[1].abs() + self.avgl[2].abs() < imgdb_types::GRAYSCALE_THRESHOLD
    }
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub id: ImageId,
    pub score: Score,
    pub width: i32,
    pub height: i32,
}

struct HeapEntry {
    score: Score,
    index: usize,
    mask: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    /// Larger score sorts greater, so the max-heap's top is the worst
    /// (least similar) candidate, ready to be evicted.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
    }
}

/// Scores every entry in `infos` against `query` and returns the top
/// `query.numres` matches, best first.
///
/// `infos` is indexed by internal index (the same index buckets store
/// refs by); dead entries (`avgl[0] == 0.0`, the simple-mode removal
/// sentinel) are scored but never selected.
pub fn do_query(
    query: &QueryArg,
    infos: &[ImageInfo],
    buckets: &mut BucketStore<u32>,
) -> Result<Vec<QueryResult>> {
    if infos.is_empty() || query.numres == 0 {
        return Ok(Vec::new());
    }

    let sketch = usize::from(query.sketch);
    let query_gray = query.is_grayscale();
    let channels = if query_gray { 1 } else { NUM_CHANNELS };

    let mut scores = vec![0.0 as Score; infos.len()];
    for (i, info) in infos.iter().enumerate() {
        let mut s = 0.0;
        for c in 0..channels {
            s += weight_for(sketch, 0, c) * (info.avgl[c] - query.avgl[c]).abs();
        }
        scores[i] = s;
    }

    let live_count = infos.iter().filter(|i| i.is_live()).count();
    let last_b = if query.fast { 0 } else { NUM_COEFS };
    let mut scale: Score = 0.0;

    for c in 0..channels {
        for b in 0..last_b {
            let k = query.sig[c][b];
            if k == 0 {
                continue;
            }
            let (sign, idx) = coef_sign_index(k);
            let mapped = buckets.map_bucket(c, sign, idx)?;
            let slice = mapped.as_slice();
            if slice.is_empty() {
                continue;
            }
            if query.nocommon && live_count > 0 && slice.len() * 10 > live_count {
                continue;
            }
            let weight = weight_for(sketch, idx, c);
            scale -= weight;
            for &r in slice {
                let pos = r as usize;
                if pos < scores.len() {
                    scores[pos] -= weight;
                }
            }
        }
    }

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    let mut tag_counts: HashMap<u32, usize> = HashMap::new();
    let mut need = query.numres;

    for (i, info) in infos.iter().enumerate() {
        if !info.is_live() {
            continue;
        }
        if let Some((mask_and, mask_xor)) = query.mask {
            if info.mask & mask_and != mask_xor {
                continue;
            }
        }
        let entry = HeapEntry {
            score: scores[i],
            index: i,
            mask: info.mask,
        };

        if query.uniqueset {
            let is_dup = *tag_counts.get(&entry.mask).unwrap_or(&0) > 0;
            if is_dup {
                need += 1;
            }
            *tag_counts.entry(entry.mask).or_insert(0) += 1;
            heap.push(entry);
            while heap.len() > need {
                let worst = heap.pop().expect("heap non-empty");
                if let Some(c) = tag_counts.get_mut(&worst.mask) {
                    *c -= 1;
                }
            }
            while let Some(top) = heap.peek() {
                if *tag_counts.get(&top.mask).unwrap_or(&0) > 1 {
                    let worst = heap.pop().expect("heap non-empty");
                    if let Some(c) = tag_counts.get_mut(&worst.mask) {
                        *c -= 1;
                    }
                } else {
                    break;
                }
            }
        } else if heap.len() < query.numres {
            heap.push(entry);
        } else if let Some(top) = heap.peek() {
            if entry.score < top.score {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    let inv_scale = if scale != 0.0 { 1.0 / scale } else { 0.0 };

    let mut popped = Vec::with_capacity(heap.len());
    while let Some(entry) = heap.pop() {
        popped.push(entry);
    }
    popped.reverse();

    let results = popped
        .into_iter()
        .map(|entry| {
            let info = &infos[entry.index];
            QueryResult {
                id: info.id,
                score: entry.score * inv_scale * 100.0,
                width: info.width,
                height: info.height,
            }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_storage::BucketStore;
    use imgdb_types::ImageId;
    use proptest::prelude::*;
    use test_case::test_case;

    fn make_sig(val: i16) -> [[i16; NUM_COEFS]; NUM_CHANNELS] {
        let mut sig = [[0i16; NUM_COEFS]; NUM_CHANNELS];
        for (c, channel) in sig.iter_mut().enumerate() {
            for (i, coef) in channel.iter_mut().enumerate() {
                *coef = val + c as i16 * 100 + i as i16;
            }
        }
        sig
    }

    #[test]
    fn empty_registry_returns_empty() {
        let mut buckets: BucketStore<u32> = BucketStore::new();
        let query = QueryArg {
            sig: make_sig(1),
            avgl: [0.1, 0.0, 0.0],
            numres: 5,
            sketch: false,
            grayscale: false,
            fast: false,
            nocommon: false,
            uniqueset: false,
            mask: None,
        };
        let results = do_query(&query, &[], &mut buckets).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn self_similarity_scores_highest() {
        let mut buckets: BucketStore<u32> = BucketStore::new();
        let sig = make_sig(1);
        buckets.add(&sig, 0, false);
        let other = make_sig(50);
        buckets.add(&other, 1, false);

        let infos = vec![
            ImageInfo {
                id: ImageId::new(0x42),
                index: 0,
                width: 100,
                height: 100,
                avgl: [0.1, 0.0, 0.0],
                mask: 0,
            },
            ImageInfo {
                id: ImageId::new(0x43),
                index: 1,
                width: 50,
                height: 50,
                avgl: [0.3, 0.0, 0.0],
                mask: 0,
            },
        ];

        let query = QueryArg {
            sig,
            avgl: [0.1, 0.0, 0.0],
            numres: 5,
            sketch: false,
            grayscale: false,
            fast: false,
            nocommon: false,
            uniqueset: false,
            mask: None,
        };

        let results = do_query(&query, &infos, &mut buckets).unwrap();
        assert_eq!(results[0].id, ImageId::new(0x42));
        assert!((results[0].score - 100.0).abs() < 0.01);
    }

    /// The luminance term's channel count must come from the query's own
    /// grayscale status alone, never from a candidate's. A candidate that
    /// happens to be grayscale itself (`avgl[1] == avgl[2] == 0`) must still
    /// be scored over all three channels when the query is not grayscale.
    #[test]
    fn luminance_channels_follow_query_not_candidate() {
        let mut buckets: BucketStore<u32> = BucketStore::new();
        let sig = make_sig(1);
        buckets.add(&sig, 0, false);

        let exact_match = ImageInfo {
            id: ImageId::new(1),
            index: 0,
            width: 1,
            height: 1,
            avgl: [0.1, 5.0, 5.0],
            mask: 0,
        };
        let self_grayscale_but_off_in_color = ImageInfo {
            id: ImageId::new(2),
            index: 1,
            width: 1,
            height: 1,
            avgl: [0.1, 0.0, 0.0],
            mask: 0,
        };
        let infos = vec![exact_match, self_grayscale_but_off_in_color];

        let query = QueryArg {
            sig,
            avgl: [0.1, 5.0, 5.0],
            numres: 2,
            sketch: false,
            grayscale: false,
            fast: true,
            nocommon: false,
            uniqueset: false,
            mask: None,
        };

        let results = do_query(&query, &infos, &mut buckets).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].id,
            ImageId::new(1),
            "the exact match must rank best even though the other candidate is grayscale"
        );
    }

    #[test_case(0.0, 0.0, true ; "exactly zero color channels")]
    #[test_case(0.003, 0.002, true ; "just under threshold")]
    #[test_case(0.01, 0.0, false ; "channel 1 over threshold")]
    #[test_case(0.0, 0.01, false ; "channel 2 over threshold")]
    fn query_grayscale_threshold(ch1: Score, ch2: Score, expected: bool) {
        let query = QueryArg {
            sig: make_sig(1),
            avgl: [0.5, ch1, ch2],
            numres: 5,
            sketch: false,
            grayscale: false,
            fast: false,
            nocommon: false,
            uniqueset: false,
            mask: None,
        };
        assert_eq!(query.is_grayscale(), expected);
    }

    proptest! {
        /// `do_query` never returns more than `numres` results and never
        /// returns a dead (non-live) entry, whatever the registry contents.
        #[test]
        fn result_count_and_liveness_invariant(
            avgls in proptest::collection::vec(
                (0.0f64..2.0, 0.0f64..2.0, 0.0f64..2.0), 1..12
            ),
            numres in 1usize..6,
        ) {
            let mut buckets: BucketStore<u32> = BucketStore::new();
            let sig = make_sig(1);
            buckets.add(&sig, 0, false);
            let infos: Vec<ImageInfo> = avgls
                .iter()
                .enumerate()
                .map(|(i, &(a, b, c))| ImageInfo {
                    id: ImageId::new(i as u64 + 1),
                    index: i as u32,
                    width: 1,
                    height: 1,
                    avgl: [a, b, c],
                    mask: 0,
                })
                .collect();
            let query = QueryArg {
                sig,
                avgl: [0.1, 0.1, 0.1],
                numres,
                sketch: false,
                grayscale: false,
                fast: true,
                nocommon: false,
                uniqueset: false,
                mask: None,
            };
            let live_ids: std::collections::HashSet<ImageId> = infos
                .iter()
                .filter(|i| i.is_live())
                .map(|i| i.id)
                .collect();
            let results = do_query(&query, &infos, &mut buckets).unwrap();
            prop_assert!(results.len() <= numres);
            for r in &results {
                prop_assert!(live_ids.contains(&r.id));
            }
        }
    }

    #[test]
    fn dead_entries_are_never_selected() {
        let mut buckets: BucketStore<u32> = BucketStore::new();
        let sig = make_sig(1);
        buckets.add(&sig, 0, false);
        let infos = vec![ImageInfo {
            id: ImageId::new(1),
            index: 0,
            width: 10,
            height: 10,
            avgl: [0.0, 0.0, 0.0],
            mask: 0,
        }];
        let query = QueryArg {
            sig,
            avgl: [0.1, 0.0, 0.0],
            numres: 5,
            sketch: false,
            grayscale: false,
            fast: false,
            nocommon: false,
            uniqueset: false,
            mask: None,
        };
        let results = do_query(&query, &infos, &mut buckets).unwrap();
        assert!(results.is_empty());
    }
}
