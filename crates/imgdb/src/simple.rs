//! Compact mode: no signature cache, no rehash, `remove` is a sentinel
//! rather than a real deletion. Cheaper to keep resident than normal mode,
//! at the cost of never being able to reclaim a removed image's space.

use std::path::Path;

use imgdb_query::{do_query, QueryArg, QueryResult};
use imgdb_storage::{serializer, BucketStore, SimpleRegistry};
use imgdb_types::{avglf_to_avgl, ImageId, ImgdbError, ImageInfo, Result, Signature};

pub struct SimpleDb {
    registry: SimpleRegistry,
    buckets: BucketStore<u32>,
}

impl SimpleDb {
    pub fn new() -> Self {
        Self {
            registry: SimpleRegistry::new(),
            buckets: BucketStore::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.registry.contains(id)
    }

    pub fn info(&self, id: ImageId) -> Result<&ImageInfo> {
        self.registry.find(id)
    }

    pub fn infos_all(&self) -> &[ImageInfo] {
        self.registry.infos()
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
        self.buckets.add(&sig.sig, index, grayscale);
        Ok(sig.id)
    }

    /// Sets the `avgl[0] == 0.0` liveness sentinel and drops the id
    /// mapping. The `ImageInfo` row and the stale bucket entries it leaves
    /// behind stay; they're filtered out at query time.
    pub fn remove(&mut self, id: ImageId) -> Result<()> {
        self.registry.remove(id)
    }

    pub fn query(&mut self, query: &QueryArg) -> Result<Vec<QueryResult>> {
        do_query(query, self.registry.infos(), &mut self.buckets)
    }

    /// Simple mode can't write its own format; callers build it by loading
    /// a normal-mode save.
    pub fn save(&mut self, _path: &Path) -> Result<()> {
        Err(ImgdbError::Usage(
            "simple-mode databases cannot be saved".into(),
        ))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, ids, sigs) = serializer::load(path)?;
        let mut db = Self::new();

        for (index, sig) in sigs.into_iter().enumerate() {
            if ids[index] != sig.id {
                tracing::warn!(
                    index,
                    expected = %ids[index],
                    actual = %sig.id,
                    "id table / signature mismatch (warning only in simple mode)"
                );
            }
            db.buckets.add(&sig.sig, index as u32, sig.is_grayscale());
            db.registry.push_loaded(ImageInfo {
                id: sig.id,
                index: index as u32,
                width: sig.width,
                height: sig.height,
                avgl: avglf_to_avgl(sig.avglf),
                mask: 0,
            });
        }
        db.buckets.set_base_all()?;
        tracing::info!(path = %path.display(), images = db.registry.len(), version = header.version, "loaded simple-mode database");
        Ok(db)
    }
}

impl Default for SimpleDb {
    fn default() -> Self {
        Self::new()
    }
}
