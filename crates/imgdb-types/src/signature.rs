//! The perceptual signature and its in-memory, registry-facing counterpart.

use std::fmt;

use crate::error::{ImgdbError, Result};
use crate::score::{Score, GRAYSCALE_THRESHOLD};

/// Side length of the working image (after the external resize step).
pub const NUM_PIXELS: usize = 128;

/// Number of largest-magnitude non-DC coefficients retained per channel.
pub const NUM_COEFS: usize = 40;

/// Y, I, Q.
pub const NUM_CHANNELS: usize = 3;

/// Positive / negative.
pub const NUM_SIGNS: usize = 2;

/// One past the largest coefficient index (index 0 is the DC term, held
/// separately in `avglf[0]` rather than in `sig`).
pub const MAX_COEF_INDEX: usize = NUM_PIXELS * NUM_PIXELS - 1;

/// Total number of inverted-index buckets: channel x sign x coefficient.
pub const NUM_BUCKETS: usize = NUM_CHANNELS * NUM_SIGNS * MAX_COEF_INDEX;

/// On-disk size of a [`Signature`] record: `id(8) + width(4) + height(4) +
/// sig(3*40*2) + avglf(3*8)`.
pub const SIGNATURE_BYTES: usize = 8 + 4 + 4 + NUM_CHANNELS * NUM_COEFS * 2 + NUM_CHANNELS * 8;

/// Caller-assigned image identifier, unique within a DB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(u64);

impl ImageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for ImageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ImageId> for u64 {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

/// The fixed-size fingerprint of one image: three per-channel coefficient
/// lists plus the average luminance. Immutable once written; see the
/// Lifecycle note in `spec.md` §3.
///
/// The set of 40 coefficients per channel is unordered on disk; scoring does
/// not depend on their order within a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub id: ImageId,
    pub width: i32,
    pub height: i32,
    /// `sig[channel][i]`: a signed coefficient index, `|value|` in
    /// `1..=MAX_COEF_INDEX`, sign carries which side of the bucket it lives
    /// in. Never zero (index 0 is the DC term, excluded by construction).
    pub sig: [[i16; NUM_COEFS]; NUM_CHANNELS],
    /// Average luminance per YIQ channel, each in `[-1, 1]`.
    pub avglf: [f64; NUM_CHANNELS],
}

impl Signature {
    /// True if chrominance is negligible: channels I and Q are skipped on
    /// both insert and score.
    pub fn is_grayscale(&self) -> bool {
        self.avglf[1].abs() + self.avglf[2].abs() < GRAYSCALE_THRESHOLD
    }

    /// Serializes this signature to its fixed-size on-disk form (little
    /// endian, matching the DB file format in `spec.md` §6.2).
    pub fn to_bytes(&self) -> [u8; SIGNATURE_BYTES] {
        let mut buf = [0u8; SIGNATURE_BYTES];
        let mut pos = 0;
        buf[pos..pos + 8].copy_from_slice(&self.id.as_u64().to_le_bytes());
        pos += 8;
        buf[pos..pos + 4].copy_from_slice(&self.width.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.height.to_le_bytes());
        pos += 4;
        for channel in &self.sig {
            for coef in channel {
                buf[pos..pos + 2].copy_from_slice(&coef.to_le_bytes());
                pos += 2;
            }
        }
        for avg in &self.avglf {
            buf[pos..pos + 8].copy_from_slice(&avg.to_le_bytes());
            pos += 8;
        }
        debug_assert_eq!(pos, SIGNATURE_BYTES);
        buf
    }

    /// Deserializes a signature from its fixed-size on-disk form.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::Data`] if `bytes` is shorter than [`SIGNATURE_BYTES`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SIGNATURE_BYTES {
            return Err(ImgdbError::Data(format!(
                "truncated signature record: expected {SIGNATURE_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let mut pos = 0;
        let id = ImageId::new(u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap()));
        pos += 8;
        let width = i32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let height = i32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let mut sig = [[0i16; NUM_COEFS]; NUM_CHANNELS];
        for channel in &mut sig {
            for coef in channel.iter_mut() {
                *coef = i16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap());
                pos += 2;
            }
        }
        let mut avglf = [0.0f64; NUM_CHANNELS];
        for avg in &mut avglf {
            *avg = f64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
            pos += 8;
        }
        debug_assert_eq!(pos, SIGNATURE_BYTES);
        Ok(Signature {
            id,
            width,
            height,
            sig,
            avglf,
        })
    }
}

/// Quantizes `avglf` into `Score` units. With `Score = f64` this is the
/// identity, kept as a named step because every other representation of
/// `Score` needs one.
pub fn avglf_to_avgl(avglf: [f64; NUM_CHANNELS]) -> [Score; NUM_CHANNELS] {
    avglf
}

/// Derived, in-memory metadata for one live image. Lives from `add` until
/// `remove`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub id: ImageId,
    pub index: u32,
    pub width: i32,
    pub height: i32,
    pub avgl: [Score; NUM_CHANNELS],
    /// Caller-supplied tag used for mask filtering and uniqueset dedup.
    pub mask: u32,
}

impl ImageInfo {
    pub fn is_grayscale(&self) -> bool {
        self.avgl[1].abs() + self.avgl[2].abs() < GRAYSCALE_THRESHOLD
    }

    /// `simple` mode's remove-as-sentinel leaves `avgl[0] == 0.0`; used by
    /// the query engine's live-image check.
    pub fn is_live(&self) -> bool {
        self.avgl[0] != 0.0
    }
}

/// Resolves a signed coefficient into `(sign, |coefficient|)`, where
/// `sign == 0` is positive and `sign == 1` is negative. Coefficients are
/// never zero.
pub fn coef_sign_index(coef: i16) -> (usize, usize) {
    if coef > 0 {
        (0, coef as usize)
    } else {
        (1, (-coef) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Signature {
        let mut sig = [[0i16; NUM_COEFS]; NUM_CHANNELS];
        for (c, channel) in sig.iter_mut().enumerate() {
            for (i, coef) in channel.iter_mut().enumerate() {
                *coef = (c as i16 + 1) * (i as i16 + 1);
            }
        }
        Signature {
            id: ImageId::new(0x42),
            width: 640,
            height: 480,
            sig,
            avglf: [0.1, 0.0, 0.0],
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let sig = sample();
        let bytes = sig.to_bytes();
        let back = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(sig, back);
    }

    #[test]
    fn from_bytes_rejects_truncation() {
        let sig = sample();
        let bytes = sig.to_bytes();
        assert!(Signature::from_bytes(&bytes[..SIGNATURE_BYTES - 1]).is_err());
    }

    #[test]
    fn grayscale_gate_matches_threshold() {
        let mut sig = sample();
        sig.avglf = [0.5, 0.001, 0.001];
        assert!(sig.is_grayscale());
        sig.avglf = [0.5, 0.01, 0.0];
        assert!(!sig.is_grayscale());
    }

    #[test]
    fn coef_sign_index_round_trips() {
        assert_eq!(coef_sign_index(5), (0, 5));
        assert_eq!(coef_sign_index(-5), (1, 5));
    }

    proptest! {
        /// Any signature built from arbitrary (but valid-shape) coefficient
        /// and luminance data survives `to_bytes`/`from_bytes` unchanged.
        /// This is the record-level half of Testable Property 3 (round-trip
        /// identical contents after save/load).
        #[test]
        fn to_bytes_from_bytes_preserves_arbitrary_signatures(
            id in any::<u64>(),
            width in any::<i32>(),
            height in any::<i32>(),
            coefs in proptest::collection::vec(-20000i16..=20000, NUM_CHANNELS * NUM_COEFS),
            avglf in proptest::collection::vec(-1.0f64..1.0, NUM_CHANNELS),
        ) {
            let mut sig_coefs = [[0i16; NUM_COEFS]; NUM_CHANNELS];
            for (c, channel) in sig_coefs.iter_mut().enumerate() {
                for (i, coef) in channel.iter_mut().enumerate() {
                    *coef = coefs[c * NUM_COEFS + i];
                }
            }
            let sig = Signature {
                id: ImageId::new(id),
                width,
                height,
                sig: sig_coefs,
                avglf: [avglf[0], avglf[1], avglf[2]],
            };
            let bytes = sig.to_bytes();
            let back = Signature::from_bytes(&bytes).unwrap();
            prop_assert_eq!(sig, back);
        }
    }
}
