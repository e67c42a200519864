//! Extra comparison and introspection helpers that sit alongside `query`
//! but don't go through the bucket store: pairwise signature comparison,
//! per-coefficient bucket statistics, and list dumps.

use imgdb_types::{weight_for, Result, Score, Signature, NUM_CHANNELS, NUM_COEFS};

/// The luminance-only distance between two signatures: the same base term
/// `do_query` computes before touching any bucket, doubled (both images'
/// luminance contributes, rather than one fixed query side).
pub fn calc_avgl_diff(a: &Signature, b: &Signature) -> Score {
    (0..NUM_CHANNELS)
        .map(|c| (a.avglf[c] - b.avglf[c]).abs())
        .sum()
}

/// A content-based similarity score between two signatures directly,
/// without involving the bucket store: merges each signature's own sorted
/// coefficient list per channel and scores matches the same way a live
/// query would, but symmetrically.
pub fn calc_sim(a: &Signature, b: &Signature, ignore_color: bool) -> Score {
    let channels = if ignore_color || a.is_grayscale() || b.is_grayscale() {
        1
    } else {
        NUM_CHANNELS
    };

    let mut score: Score = 0.0;
    let mut scale: Score = 0.0;

    for c in 0..channels {
        score += 2.0 * weight_for(0, 0, c) * (a.avglf[c] - b.avglf[c]).abs();
    }

    for c in 0..channels {
        let mut sig_a = a.sig[c];
        let mut sig_b = b.sig[c];
        sig_a.sort_unstable();
        sig_b.sort_unstable();

        let (mut b1, mut b2) = (0usize, 0usize);
        while b1 < NUM_COEFS || b2 < NUM_COEFS {
            let ind1 = if b1 == NUM_COEFS { i32::MAX } else { sig_a[b1] as i32 };
            let ind2 = if b2 == NUM_COEFS { i32::MAX } else { sig_b[b2] as i32 };

            let smaller = ind1.min(ind2);
            let weight = if smaller == i32::MAX {
                0.0
            } else {
                weight_for(0, smaller.unsigned_abs() as usize, c)
            };
            scale -= weight;
            if ind1 == ind2 {
                score -= weight;
            }

            if ind1 <= ind2 {
                b1 += 1;
            }
            if ind2 <= ind1 {
                b2 += 1;
            }
        }
    }

    let inv_scale = if scale != 0.0 { 1.0 / scale } else { 0.0 };
    score * 100.0 * inv_scale
}

/// Per-bucket occupancy, `(bucket_index, size)`, for every non-empty
/// bucket. Used for diagnostics, not scoring.
pub fn get_coeff_stats(
    buckets: &mut imgdb_storage::BucketStore<u32>,
) -> Result<Vec<(usize, usize)>> {
    let mut out = Vec::new();
    for c in 0..NUM_CHANNELS {
        for s in 0..imgdb_types::NUM_SIGNS {
            for idx in 1..=imgdb_types::MAX_COEF_INDEX {
                let len = buckets.bucket_len(c, s, idx);
                if len > 0 {
                    out.push((imgdb_storage::bucket::bucket_id(c, s, idx), len));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::ImageId;

    fn sig(id: u64, avglf: [f64; 3], fill: i16) -> Signature {
        Signature {
            id: ImageId::new(id),
            width: 10,
            height: 10,
            sig: [[fill; NUM_COEFS]; NUM_CHANNELS],
            avglf,
        }
    }

    #[test]
    fn calc_avgl_diff_is_symmetric_distance() {
        let a = sig(1, [0.1, 0.2, 0.3], 1);
        let b = sig(2, [0.4, 0.2, 0.1], 1);
        let diff = calc_avgl_diff(&a, &b);
        assert!((diff - (0.3 + 0.0 + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn calc_sim_of_identical_signatures_is_near_100() {
        let a = sig(1, [0.1, 0.0, 0.0], 5);
        let b = sig(2, [0.1, 0.0, 0.0], 5);
        let score = calc_sim(&a, &b, false);
        assert!((score - 100.0).abs() < 0.5, "got {score}");
    }
}
