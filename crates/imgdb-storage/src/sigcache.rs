//! Out-of-core storage for full signatures, addressed by registry index.
//!
//! Queries only need a handful of coefficients to score a candidate, but
//! re-ranking and `calc_sim` need the whole signature back. Rather than keep
//! every live signature resident, normal-mode DBs spill them to an unlinked
//! temp file and `pread` them back on demand.

use std::fs::File;
use std::os::unix::fs::FileExt;

use imgdb_types::{ImgdbError, Result, Signature, SIGNATURE_BYTES};

/// A flat array of fixed-size signature records, one slot per registry
/// index. Holes left by removal are never reclaimed by this type; the
/// registry is responsible for index reuse.
pub struct SigCache {
    file: File,
}

impl SigCache {
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: tempfile::tempfile().map_err(ImgdbError::Io)?,
        })
    }

    fn offset(index: u32) -> u64 {
        index as u64 * SIGNATURE_BYTES as u64
    }

    /// Writes `sig` into slot `index`, growing the file if needed.
    pub fn write(&self, index: u32, sig: &Signature) -> Result<()> {
        let bytes = sig.to_bytes();
        self.file
            .write_at(&bytes, Self::offset(index))
            .map_err(ImgdbError::Io)?;
        Ok(())
    }

    /// Reads the signature back out of slot `index`.
    pub fn read(&self, index: u32) -> Result<Signature> {
        let mut buf = [0u8; SIGNATURE_BYTES];
        self.file
            .read_exact_at(&mut buf, Self::offset(index))
            .map_err(ImgdbError::Io)?;
        Signature::from_bytes(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::{ImageId, NUM_CHANNELS, NUM_COEFS};

    fn sample(id: u64) -> Signature {
        Signature {
            id: ImageId::new(id),
            width: 100,
            height: 200,
            sig: [[1i16; NUM_COEFS]; NUM_CHANNELS],
            avglf: [0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let cache = SigCache::new().unwrap();
        cache.write(0, &sample(42)).unwrap();
        cache.write(3, &sample(99)).unwrap();
        assert_eq!(cache.read(0).unwrap(), sample(42));
        assert_eq!(cache.read(3).unwrap(), sample(99));
    }

    #[test]
    fn overwrite_replaces_slot() {
        let cache = SigCache::new().unwrap();
        cache.write(1, &sample(1)).unwrap();
        cache.write(1, &sample(2)).unwrap();
        assert_eq!(cache.read(1).unwrap(), sample(2));
    }
}
