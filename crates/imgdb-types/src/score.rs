//! Similarity score representation and the fixed weight tables.
//!
//! `Score` is implemented as `f64` rather than the fixed-point alternative
//! the format allows (see DESIGN.md): scores are accumulated and compared at
//! double precision throughout, and `DScore` is kept as a separate alias
//! purely to mirror the spec's vocabulary for "the precision intermediate
//! products are computed at" — with `f64` both are the same type.

/// A similarity score. Higher (for a single weighted term) means "more
/// different"; the query engine negates contributions so that higher final
/// score means "more similar".
pub type Score = f64;

/// Precision used for intermediate products before they're folded back into
/// a `Score` accumulator. Kept distinct from `Score` in name only.
pub type DScore = f64;

/// Grayscale gate: channels I and Q are ignored (on insert and in scoring)
/// once `|avgl[1]| + |avgl[2]|` drops below this.
pub const GRAYSCALE_THRESHOLD: Score = 0.006;

/// Two weight profiles: `0` is the default (photographic) profile, `1` is
/// "sketch" mode, tuned for line-art/drawing queries.
pub const SKETCH_NORMAL: usize = 0;
pub const SKETCH_LINES: usize = 1;

/// `W[sketch][bin][channel]`: the per-position weight applied to a matching
/// coefficient. `bin` comes from [`img_bin`].
pub const WEIGHTS: [[[Score; 3]; 6]; 2] = [
    // Photographic queries (sketch = 0).
    [
        [5.00, 19.21, 34.37],
        [0.83, 1.26, 0.36],
        [1.01, 0.44, 0.45],
        [0.52, 0.53, 0.14],
        [0.47, 0.28, 0.18],
        [0.30, 0.14, 0.27],
    ],
    // Sketch / line-art queries (sketch = 1).
    [
        [4.04, 15.14, 22.62],
        [0.78, 0.92, 0.40],
        [0.46, 0.53, 0.63],
        [0.42, 0.26, 0.25],
        [0.41, 0.14, 0.15],
        [0.32, 0.07, 0.38],
    ],
];

use crate::NUM_PIXELS;

/// `imgBin[i*NUM_PIXELS + j] = (i<5 && j<5) ? max(i,j) : 5`, precomputed at
/// compile time the same way `kimberlite_crypto::crc32`'s lookup table is.
pub const IMG_BIN: [u8; NUM_PIXELS * NUM_PIXELS] = generate_img_bin();

const fn generate_img_bin() -> [u8; NUM_PIXELS * NUM_PIXELS] {
    let mut bin = [5u8; NUM_PIXELS * NUM_PIXELS];
    let mut i = 0;
    while i < 5 {
        let mut j = 0;
        while j < 5 {
            bin[i * NUM_PIXELS + j] = if i > j { i as u8 } else { j as u8 };
            j += 1;
        }
        i += 1;
    }
    bin
}

/// Looks up the weight for a coefficient at position `idx` (its index within
/// the 128x128 grid, `0..NUM_PIXELS*NUM_PIXELS`), for the given channel and
/// sketch mode.
pub fn weight_for(sketch: usize, idx: usize, channel: usize) -> Score {
    WEIGHTS[sketch][IMG_BIN[idx] as usize][channel]
}
