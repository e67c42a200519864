//! The three `imageId -> internal index` mappings, one per DB mode. Each
//! keeps the metadata needed to answer a query without touching the
//! signature cache: width, height, average luminance, mask.

use std::collections::HashMap;

use imgdb_types::{ImageId, ImgdbError, ImageInfo, Result};

/// Normal mode: full `HashMap<ImageId, ImageInfo>`. Removing an entry drops
/// it outright; the internal index it held is never reused until the next
/// `rehash`, which renumbers everything densely.
#[derive(Default)]
pub struct NormalRegistry {
    by_id: HashMap<ImageId, ImageInfo>,
    next_index: u32,
}

impl NormalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn find(&self, id: ImageId) -> Result<&ImageInfo> {
        self.by_id.get(&id).ok_or(ImgdbError::InvalidId(id))
    }

    pub fn find_mut(&mut self, id: ImageId) -> Result<&mut ImageInfo> {
        self.by_id.get_mut(&id).ok_or(ImgdbError::InvalidId(id))
    }

    /// Allocates the next dense index and inserts `info` under `info.id`.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::DuplicateId`] if `info.id` is already registered.
    pub fn add(&mut self, mut info: ImageInfo) -> Result<u32> {
        if self.contains(info.id) {
            return Err(ImgdbError::DuplicateId(info.id));
        }
        let index = self.next_index;
        self.next_index += 1;
        info.index = index;
        self.by_id.insert(info.id, info);
        Ok(index)
    }

    /// Removes and returns the entry for `id`.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::InvalidId`] if `id` isn't registered.
    pub fn remove(&mut self, id: ImageId) -> Result<ImageInfo> {
        self.by_id.remove(&id).ok_or(ImgdbError::InvalidId(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageInfo> {
        self.by_id.values()
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Replaces the whole registry with `entries`, renumbering indices
    /// `0..entries.len()` in iteration order. Used by `rehash` and `load`.
    pub fn reset(&mut self, entries: Vec<ImageInfo>) {
        self.by_id.clear();
        self.next_index = entries.len() as u32;
        for (index, mut info) in entries.into_iter().enumerate() {
            info.index = index as u32;
            self.by_id.insert(info.id, info);
        }
    }
}

/// Simple mode: `imageId -> index` plus a dense, append-only `Vec<ImageInfo>`.
/// `remove` can't shrink the vector (stale bucket entries would dangle), so
/// it only sets the liveness sentinel `avgl[0] = 0.0` and drops the id
/// mapping.
#[derive(Default)]
pub struct SimpleRegistry {
    by_id: HashMap<ImageId, u32>,
    infos: Vec<ImageInfo>,
}

impl SimpleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn find(&self, id: ImageId) -> Result<&ImageInfo> {
        let index = *self.by_id.get(&id).ok_or(ImgdbError::InvalidId(id))?;
        Ok(&self.infos[index as usize])
    }

    pub fn find_mut(&mut self, id: ImageId) -> Result<&mut ImageInfo> {
        let index = *self.by_id.get(&id).ok_or(ImgdbError::InvalidId(id))?;
        Ok(&mut self.infos[index as usize])
    }

    pub fn add(&mut self, mut info: ImageInfo) -> Result<u32> {
        if self.contains(info.id) {
            return Err(ImgdbError::DuplicateId(info.id));
        }
        let index = self.infos.len() as u32;
        info.index = index;
        self.by_id.insert(info.id, index);
        self.infos.push(info);
        Ok(index)
    }

    /// Sets the sentinel and drops the id mapping; the `ImageInfo` row and
    /// its stale bucket entries stay behind.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::InvalidId`] if `id` isn't registered.
    pub fn remove(&mut self, id: ImageId) -> Result<()> {
        let index = self.by_id.remove(&id).ok_or(ImgdbError::InvalidId(id))?;
        self.infos[index as usize].avgl[0] = 0.0;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn infos(&self) -> &[ImageInfo] {
        &self.infos
    }

    pub fn infos_mut(&mut self) -> &mut [ImageInfo] {
        &mut self.infos
    }

    pub fn push_loaded(&mut self, info: ImageInfo) {
        let index = self.infos.len() as u32;
        let mut info = info;
        info.index = index;
        self.by_id.insert(info.id, index);
        self.infos.push(info);
    }
}

/// Alter mode: `imageId -> index` plus the on-disk id array (represented
/// in-memory as `Vec<ImageId>`, index-addressed). Removal doesn't touch
/// buckets at all; it only marks the index for reclamation at save time.
#[derive(Default)]
pub struct AlterRegistry {
    by_id: HashMap<ImageId, u32>,
    ids: Vec<ImageId>,
    infos: Vec<ImageInfo>,
    deleted: Vec<u32>,
}

impl AlterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn find(&self, id: ImageId) -> Result<&ImageInfo> {
        let index = *self.by_id.get(&id).ok_or(ImgdbError::InvalidId(id))?;
        Ok(&self.infos[index as usize])
    }

    pub fn find_mut(&mut self, id: ImageId) -> Result<&mut ImageInfo> {
        let index = *self.by_id.get(&id).ok_or(ImgdbError::InvalidId(id))?;
        Ok(&mut self.infos[index as usize])
    }

    pub fn add(&mut self, mut info: ImageInfo) -> Result<u32> {
        if self.contains(info.id) {
            return Err(ImgdbError::DuplicateId(info.id));
        }
        let index = if let Some(hole) = self.deleted.pop() {
            hole
        } else {
            self.infos.len() as u32
        };
        info.index = index;
        self.by_id.insert(info.id, index);
        if index as usize == self.infos.len() {
            self.infos.push(info);
            self.ids.push(self.infos[index as usize].id);
        } else {
            self.infos[index as usize] = info;
            self.ids[index as usize] = self.infos[index as usize].id;
        }
        Ok(index)
    }

    /// Defers cleanup: the slot is pushed onto the deleted-list and
    /// reclaimed by `add` or compacted by `save`'s `move_deleted` pass.
    ///
    /// # Errors
    ///
    /// [`ImgdbError::InvalidId`] if `id` isn't registered.
    pub fn remove(&mut self, id: ImageId) -> Result<u32> {
        let index = self.by_id.remove(&id).ok_or(ImgdbError::InvalidId(id))?;
        self.deleted.push(index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn deleted(&self) -> &[u32] {
        &self.deleted
    }

    pub fn ids(&self) -> &[ImageId] {
        &self.ids
    }

    pub fn infos(&self) -> &[ImageInfo] {
        &self.infos
    }

    /// Moves the payload at `from` into hole `into`, used by `move_deleted`
    /// during save-time compaction. Updates both the id map and the id
    /// array; the caller is responsible for relocating the on-disk
    /// signature itself.
    pub fn relocate(&mut self, from: u32, into: u32) {
        let mut info = self.infos[from as usize].clone();
        info.index = into;
        self.by_id.insert(info.id, into);
        self.ids[into as usize] = info.id;
        self.infos[into as usize] = info;
    }

    pub fn clear_deleted(&mut self) {
        self.deleted.clear();
    }

    pub fn truncate(&mut self, new_len: usize) {
        self.infos.truncate(new_len);
        self.ids.truncate(new_len);
    }

    /// A snapshot of live entries ordered by internal index, as needed to
    /// rebuild the on-disk id table and signature section at save time.
    pub fn sorted_by_index(&self) -> Vec<ImageInfo> {
        let mut out: Vec<ImageInfo> = self.infos.clone();
        out.sort_by_key(|info| info.index);
        out
    }
}
