//! The on-disk DB file format: header, per-bucket sizes, id table, padding,
//! then full signature records. See module docs on [`save_normal`] and
//! [`load`] for the exact byte layout.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use imgdb_types::{ImageId, ImgdbError, Result, Signature, NUM_BUCKETS};

/// High byte of `version_code`: a format-size marker. Changing the layout of
/// any fixed-width field must bump this.
pub const SRZ_V_SZ: u8 = 0x01;

/// Low byte of `version_code` for the only version this implementation
/// reads or writes. Earlier on-disk layouts (e.g. `0x70`) are rejected on
/// load rather than guessed at: there are no fixtures to validate an
/// undocumented legacy shape against, and silently misreading one risks
/// corrupting the read.
pub const VERSION_0_9_0: u8 = 0x90;

/// Reserved padding slots after the id table, left for alter-mode growth
/// before a header resize is needed.
pub const ID_TABLE_PADDING: usize = 1024;

fn version_code(version: u8) -> u32 {
    ((SRZ_V_SZ as u32) << 8) | version as u32
}

/// Parsed file header plus bucket size table, as read back by [`load_header`].
pub struct FileHeader {
    pub version: u8,
    pub num_images: u64,
    pub first_sig_offset: i64,
    pub bucket_sizes: Vec<u64>,
}

/// Writes a complete normal-mode DB file to `<path>.temp`, then renames it
/// over `path`. `ids` and `signatures` must iterate registry entries in the
/// same order; `bucket_sizes` must be in canonical `(channel, sign, idx)`
/// order and have exactly [`NUM_BUCKETS`] entries.
///
/// # Errors
///
/// [`ImgdbError::Internal`] if `bucket_sizes.len() != NUM_BUCKETS`.
/// [`ImgdbError::Io`] on any filesystem failure.
pub fn save_normal(
    path: &Path,
    bucket_sizes: &[u64],
    ids: &[ImageId],
    signatures: &[Signature],
) -> Result<()> {
    if bucket_sizes.len() != NUM_BUCKETS {
        return Err(ImgdbError::Internal(format!(
            "bucket size table has {} entries, expected {NUM_BUCKETS}",
            bucket_sizes.len()
        )));
    }
    let tmp_path = path.with_extension("temp");
    {
        let mut file = File::create(&tmp_path).map_err(ImgdbError::Io)?;
        write_body(&mut file, bucket_sizes, ids, signatures)?;
        file.sync_all().map_err(ImgdbError::Io)?;
    }
    fs::rename(&tmp_path, path).map_err(ImgdbError::Io)?;
    tracing::info!(path = %path.display(), images = signatures.len(), "saved normal-mode database");
    Ok(())
}

fn write_body(
    file: &mut File,
    bucket_sizes: &[u64],
    ids: &[ImageId],
    signatures: &[Signature],
) -> Result<()> {
    file.write_u32::<LittleEndian>(version_code(VERSION_0_9_0))
        .map_err(ImgdbError::Io)?;
    file.write_u64::<LittleEndian>(signatures.len() as u64)
        .map_err(ImgdbError::Io)?;
    // Patched once the true offset is known.
    let first_sig_offset_pos = file.stream_position().map_err(ImgdbError::Io)?;
    file.write_i64::<LittleEndian>(0).map_err(ImgdbError::Io)?;

    for size in bucket_sizes {
        file.write_u64::<LittleEndian>(*size).map_err(ImgdbError::Io)?;
    }
    for id in ids {
        file.write_u64::<LittleEndian>(id.as_u64())
            .map_err(ImgdbError::Io)?;
    }
    for _ in 0..ID_TABLE_PADDING {
        file.write_u64::<LittleEndian>(0).map_err(ImgdbError::Io)?;
    }

    let first_sig_offset = file.stream_position().map_err(ImgdbError::Io)?;
    for sig in signatures {
        file.write_all(&sig.to_bytes()).map_err(ImgdbError::Io)?;
    }

    file.seek(SeekFrom::Start(first_sig_offset_pos))
        .map_err(ImgdbError::Io)?;
    file.write_i64::<LittleEndian>(first_sig_offset as i64)
        .map_err(ImgdbError::Io)?;
    Ok(())
}

/// Reads the header, bucket size table, and id table, leaving the reader
/// positioned at `first_sig_offset`.
///
/// # Errors
///
/// [`ImgdbError::Data`] if the size marker or version is unsupported.
pub fn load_header(reader: &mut (impl Read + Seek)) -> Result<(FileHeader, Vec<ImageId>)> {
    let version_code = reader.read_u32::<LittleEndian>().map_err(ImgdbError::Io)?;
    let size_marker = (version_code >> 8) as u8;
    let version = (version_code & 0xff) as u8;
    if size_marker != SRZ_V_SZ {
        return Err(ImgdbError::Data(format!(
            "unsupported format size marker {size_marker:#x}"
        )));
    }
    if version != VERSION_0_9_0 {
        return Err(ImgdbError::Data(format!("unsupported version {version:#x}")));
    }

    let num_images = reader.read_u64::<LittleEndian>().map_err(ImgdbError::Io)?;
    let first_sig_offset = reader.read_i64::<LittleEndian>().map_err(ImgdbError::Io)?;

    let mut bucket_sizes = Vec::with_capacity(NUM_BUCKETS);
    for _ in 0..NUM_BUCKETS {
        bucket_sizes.push(reader.read_u64::<LittleEndian>().map_err(ImgdbError::Io)?);
    }

    let mut ids = Vec::with_capacity(num_images as usize);
    for _ in 0..num_images {
        ids.push(ImageId::new(
            reader.read_u64::<LittleEndian>().map_err(ImgdbError::Io)?,
        ));
    }
    for _ in 0..ID_TABLE_PADDING {
        reader.read_u64::<LittleEndian>().map_err(ImgdbError::Io)?;
    }

    reader
        .seek(SeekFrom::Start(first_sig_offset as u64))
        .map_err(ImgdbError::Io)?;

    Ok((
        FileHeader {
            version,
            num_images,
            first_sig_offset,
            bucket_sizes,
        },
        ids,
    ))
}

/// Reads `num_images` consecutive [`Signature`] records starting at the
/// reader's current position (i.e. right after [`load_header`]).
pub fn load_signatures(reader: &mut impl Read, num_images: u64) -> Result<Vec<Signature>> {
    let mut out = Vec::with_capacity(num_images as usize);
    let mut buf = [0u8; imgdb_types::SIGNATURE_BYTES];
    for _ in 0..num_images {
        reader.read_exact(&mut buf).map_err(ImgdbError::Io)?;
        out.push(Signature::from_bytes(&buf)?);
    }
    Ok(out)
}

/// Opens `path` and loads the full header, id table and signature list. The
/// caller (a mode-specific load path in the facade) is responsible for
/// replaying signatures into buckets, registry and sig cache.
pub fn load(path: &Path) -> Result<(FileHeader, Vec<ImageId>, Vec<Signature>)> {
    let mut file = File::open(path).map_err(ImgdbError::Io)?;
    let (header, ids) = load_header(&mut file)?;
    let sigs = load_signatures(&mut file, header.num_images)?;
    Ok((header, ids, sigs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::{NUM_CHANNELS, NUM_COEFS};
    use tempfile::tempdir;

    fn sample_sig(id: u64) -> Signature {
        Signature {
            id: ImageId::new(id),
            width: 16,
            height: 16,
            sig: [[1i16; NUM_COEFS]; NUM_CHANNELS],
            avglf: [0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn round_trips_empty_db() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let sizes = vec![0u64; NUM_BUCKETS];
        save_normal(&path, &sizes, &[], &[]).unwrap();
        let (header, ids, sigs) = load(&path).unwrap();
        assert_eq!(header.num_images, 0);
        assert!(ids.is_empty());
        assert!(sigs.is_empty());
    }

    #[test]
    fn round_trips_with_images() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("some.db");
        let sizes = vec![0u64; NUM_BUCKETS];
        let ids = vec![ImageId::new(1), ImageId::new(2)];
        let sigs = vec![sample_sig(1), sample_sig(2)];
        save_normal(&path, &sizes, &ids, &sigs).unwrap();
        let (header, loaded_ids, loaded_sigs) = load(&path).unwrap();
        assert_eq!(header.num_images, 2);
        assert_eq!(loaded_ids, ids);
        assert_eq!(loaded_sigs, sigs);
    }

    #[test]
    fn rejects_bad_bucket_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.db");
        assert!(save_normal(&path, &[0u64; 3], &[], &[]).is_err());
    }
}
