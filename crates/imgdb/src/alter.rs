//! Append-and-patch mode: mutates one already-open file in place, supports
//! neither `query` nor `rehash`, and stores bucket refs as the caller's
//! 64-bit image id rather than an internal index — so a save-time
//! compaction that renumbers indices never has to touch a bucket.
//!
//! Signatures are kept resident (indexed densely, parallel to the
//! registry) rather than re-seeked from the open file on every access: the
//! "full-sig access: file seek" contract is honored at the `save`/`load`
//! boundary, where the file is the source of truth, not on every read.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use imgdb_storage::{bucket::alter_ref, serializer, AlterRegistry, BucketStore};
use imgdb_types::{avglf_to_avgl, ImageId, ImgdbError, ImageInfo, Result, Signature};

pub struct AlterDb {
    registry: AlterRegistry,
    buckets: BucketStore<u64>,
    signatures: Vec<Signature>,
    _file: File,
    path: PathBuf,
}

impl AlterDb {
    /// Creates a new, empty alter-mode database file at `path` and holds it
    /// open for the lifetime of this `AlterDb`.
    pub fn create(path: &Path) -> Result<Self> {
        serializer::save_normal(path, &vec![0u64; imgdb_types::NUM_BUCKETS], &[], &[])?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(ImgdbError::Io)?;
        Ok(Self {
            registry: AlterRegistry::new(),
            buckets: BucketStore::new(),
            signatures: Vec::new(),
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(ImgdbError::Io)?;
        let (_header, ids, sigs) = serializer::load(path)?;

        let mut registry = AlterRegistry::new();
        let mut buckets: BucketStore<u64> = BucketStore::new();
        let mut signatures = Vec::with_capacity(sigs.len());
        for (index, sig) in sigs.into_iter().enumerate() {
            if ids[index] != sig.id {
                return Err(ImgdbError::Data(format!(
                    "id table / signature mismatch at index {index}"
                )));
            }
            buckets.add(&sig.sig, alter_ref(sig.id), sig.is_grayscale());
            registry
                .add(ImageInfo {
                    id: sig.id,
                    index: index as u32,
                    width: sig.width,
                    height: sig.height,
                    avgl: avglf_to_avgl(sig.avglf),
                    mask: 0,
                })
                .expect("fresh registry cannot collide while loading");
            signatures.push(sig);
        }
        buckets.set_base_all()?;
        tracing::info!(path = %path.display(), images = registry.len(), "loaded alter-mode database");
        Ok(Self {
            registry,
            buckets,
            signatures,
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.registry.contains(id)
    }

    pub fn info(&self, id: ImageId) -> Result<&ImageInfo> {
        self.registry.find(id)
    }

    pub fn infos_live(&self) -> Vec<ImageInfo> {
        self.registry.sorted_by_index()
    }

    pub fn set_image_res(&mut self, id: ImageId, width: i32, height: i32) -> Result<()> {
        let info = self.registry.find_mut(id)?;
        info.width = width;
        info.height = height;
        Ok(())
    }

    pub fn add(&mut self, sig: &Signature, mask: u32) -> Result<ImageId> {
        let grayscale = sig.is_grayscale();
        let info = ImageInfo {
            id: sig.id,
            index: 0,
            width: sig.width,
            height: sig.height,
            avgl: avglf_to_avgl(sig.avglf),
            mask,
        };
        let index = self.registry.add(info)?;
        if index as usize == self.signatures.len() {
            self.signatures.push(sig.clone());
        } else {
            self.signatures[index as usize] = sig.clone();
        }
        self.buckets.add(&sig.sig, alter_ref(sig.id), grayscale);
        Ok(sig.id)
    }

    /// Defers cleanup to the deleted-list; buckets are untouched since they
    /// key on image id, not index.
    pub fn remove(&mut self, id: ImageId) -> Result<()> {
        self.registry.remove(id)?;
        Ok(())
    }

    /// Compacts deleted holes by moving the last live entry's signature
    /// into each hole (`move_deleted`), then rewrites the file at the path
    /// it was opened with. Header growth (more images than the reserved id
    /// padding) falls out naturally since the layout is recomputed fresh.
    pub fn save(&mut self) -> Result<()> {
        self.compact();

        let entries = self.registry.sorted_by_index();
        let ids: Vec<ImageId> = entries.iter().map(|info| info.id).collect();
        let sigs: Vec<Signature> = entries
            .iter()
            .map(|info| self.signatures[info.index as usize].clone())
            .collect();

        let mut bucket_sizes = vec![0u64; imgdb_types::NUM_BUCKETS];
        for c in 0..imgdb_types::NUM_CHANNELS {
            for s in 0..imgdb_types::NUM_SIGNS {
                for idx in 1..=imgdb_types::MAX_COEF_INDEX {
                    let pos = imgdb_storage::bucket::bucket_id(c, s, idx);
                    bucket_sizes[pos] = self.buckets.bucket_len(c, s, idx) as u64;
                }
            }
        }

        serializer::save_normal(&self.path, &bucket_sizes, &ids, &sigs)?;
        tracing::info!(path = %self.path.display(), images = entries.len(), "saved alter-mode database");
        Ok(())
    }

    fn compact(&mut self) {
        let mut holes: Vec<u32> = self.registry.deleted().to_vec();
        holes.sort_unstable_by(|a, b| b.cmp(a));
        for hole in holes {
            let last = match self.signatures.len().checked_sub(1) {
                Some(l) => l as u32,
                None => continue,
            };
            if hole > last {
                continue;
            }
            if hole == last {
                self.signatures.pop();
                self.registry.truncate(self.signatures.len());
                continue;
            }
            let moved = self.signatures[last as usize].clone();
            self.signatures[hole as usize] = moved;
            self.signatures.pop();
            self.registry.relocate(last, hole);
            self.registry.truncate(self.signatures.len());
        }
        self.registry.clear_deleted();
    }
}
