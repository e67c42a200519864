//! Full read/write mode: every capability, at the cost of keeping a
//! `HashMap<ImageId, ImageInfo>` and a signature cache resident.

use std::path::{Path, PathBuf};

use imgdb_query::{do_query, QueryArg, QueryResult};
use imgdb_storage::{serializer, BucketStore, NormalRegistry, SigCache};
use imgdb_types::{avglf_to_avgl, ImageId, ImgdbError, ImageInfo, Result, Signature};

pub struct NormalDb {
    registry: NormalRegistry,
    buckets: BucketStore<u32>,
    cache: SigCache,
    buckets_valid: bool,
    path: Option<PathBuf>,
}

impl NormalDb {
    pub fn new() -> Result<Self> {
        Ok(Self {
            registry: NormalRegistry::new(),
            buckets: BucketStore::new(),
            cache: SigCache::new()?,
            buckets_valid: true,
            path: None,
        })
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.registry.contains(id)
    }

    pub fn info(&self, id: ImageId) -> Result<&ImageInfo> {
        self.registry.find(id)
    }

    pub fn infos_live(&self) -> Vec<ImageInfo> {
        self.registry.iter().cloned().collect()
    }

    pub fn set_image_res(&mut self, id: ImageId, width: i32, height: i32) -> Result<()> {
        let info = self.registry.find_mut(id)?;
        info.width = width;
        info.height = height;
        Ok(())
    }

    /// Adds a signature: reserves the next internal index, writes the full
    /// record to the signature cache, and inserts the index into every
    /// bucket the signature's coefficients select.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::DuplicateId`] if `sig.id` is already registered.
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
        self.cache.write(index, sig)?;
        self.buckets.add(&sig.sig, index, grayscale);
        tracing::debug!(id = %sig.id, index, "added image");
        Ok(sig.id)
    }

    /// Removes `id`'s index from every bucket it was inserted into and
    /// drops its registry entry. Marks buckets invalid: queries are
    /// rejected until [`Self::rehash`] runs.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::InvalidId`] if `id` isn't registered.
    pub fn remove(&mut self, id: ImageId) -> Result<()> {
        let info = self.registry.remove(id)?;
        let sig = self.cache.read(info.index)?;
        self.buckets.remove(&sig.sig, info.index, sig.is_grayscale());
        self.buckets_valid = false;
        tracing::debug!(%id, "removed image, buckets now invalid pending rehash");
        Ok(())
    }

    /// Rebuilds every bucket from the signature cache, renumbering internal
    /// indices densely in registry iteration order. Required after any
    /// `remove` before `query` will succeed again.
    pub fn rehash(&mut self) -> Result<()> {
        let mut entries: Vec<ImageInfo> = self.registry.iter().cloned().collect();
        entries.sort_by_key(|info| info.id.as_u64());

        self.buckets.clear();
        let mut new_cache = SigCache::new()?;
        for (index, info) in entries.iter_mut().enumerate() {
            let sig = self.cache.read(info.index)?;
            info.index = index as u32;
            new_cache.write(index as u32, &sig)?;
            self.buckets.add(&sig.sig, index as u32, sig.is_grayscale());
        }
        self.cache = new_cache;
        self.registry.reset(entries);
        self.buckets_valid = true;
        tracing::info!(images = self.registry.len(), "rehash complete");
        Ok(())
    }

    /// Scores `query` against every registered image.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::Usage`] if a removal happened since the last rehash.
    pub fn query(&mut self, query: &QueryArg) -> Result<Vec<QueryResult>> {
        if !self.buckets_valid {
            return Err(ImgdbError::Usage(
                "buckets are invalid since the last remove; call rehash() first".into(),
            ));
        }
        let infos = self.dense_infos();
        do_query(query, &infos, &mut self.buckets)
    }

    /// Builds a dense, index-ordered `ImageInfo` snapshot for the query
    /// engine (which addresses images by bucket-stored index, not id).
    fn dense_infos(&self) -> Vec<ImageInfo> {
        let mut out = vec![
            ImageInfo {
                id: ImageId::new(0),
                index: 0,
                width: 0,
                height: 0,
                avgl: [0.0; 3],
                mask: 0,
            };
            self.registry.next_index() as usize
        ];
        for info in self.registry.iter() {
            out[info.index as usize] = info.clone();
        }
        out
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        let mut entries: Vec<&ImageInfo> = self.registry.iter().collect();
        entries.sort_by_key(|info| info.index);

        let mut bucket_sizes = vec![0u64; imgdb_types::NUM_BUCKETS];
        for c in 0..imgdb_types::NUM_CHANNELS {
            for s in 0..imgdb_types::NUM_SIGNS {
                for idx in 1..=imgdb_types::MAX_COEF_INDEX {
                    let pos = imgdb_storage::bucket::bucket_id(c, s, idx);
                    bucket_sizes[pos] = self.buckets.bucket_len(c, s, idx) as u64;
                }
            }
        }

        let ids: Vec<ImageId> = entries.iter().map(|info| info.id).collect();
        let mut sigs = Vec::with_capacity(entries.len());
        for info in &entries {
            sigs.push(self.cache.read(info.index)?);
        }

        serializer::save_normal(path, &bucket_sizes, &ids, &sigs)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, ids, sigs) = serializer::load(path)?;
        let mut db = Self::new()?;
        db.path = Some(path.to_path_buf());

        for c in 0..imgdb_types::NUM_CHANNELS {
            for s in 0..imgdb_types::NUM_SIGNS {
                for idx in 1..=imgdb_types::MAX_COEF_INDEX {
                    let pos = imgdb_storage::bucket::bucket_id(c, s, idx);
                    db.buckets.reserve(c, s, idx, header.bucket_sizes[pos] as usize);
                }
            }
        }

        let mut entries = Vec::with_capacity(sigs.len());
        for (index, sig) in sigs.into_iter().enumerate() {
            if ids[index] != sig.id {
                return Err(ImgdbError::Data(format!(
                    "id table / signature mismatch at index {index}: {} != {}",
                    ids[index], sig.id
                )));
            }
            db.cache.write(index as u32, &sig)?;
            db.buckets
                .add(&sig.sig, index as u32, sig.is_grayscale());
            entries.push(ImageInfo {
                id: sig.id,
                index: index as u32,
                width: sig.width,
                height: sig.height,
                avgl: avglf_to_avgl(sig.avglf),
                mask: 0,
            });
        }
        db.registry.reset(entries);
        db.buckets.set_base_all()?;
        db.buckets_valid = true;
        tracing::info!(path = %path.display(), images = db.registry.len(), version = header.version, "loaded normal-mode database");
        Ok(db)
    }
}
