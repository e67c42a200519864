//! The facade: one tagged enum over the three mode implementations, behind
//! a single public interface. The mode is fixed for the database's
//! lifetime; there's no runtime conversion between modes short of
//! save/load through the shared file format.

use std::path::Path;

use imgdb_query::QueryArg;
use imgdb_types::{ImageId, ImgdbError, ImageInfo, Result, Signature};

use crate::alter::AlterDb;
use crate::config::{DbConfig, Mode};
use crate::normal::NormalDb;
use crate::simple::SimpleDb;
use crate::QueryResult;

/// A content-based image similarity database, in one of three modes. See
/// the mode matrix in the crate docs for what each supports.
pub enum DbSpace {
    Normal(NormalDb),
    Simple(SimpleDb),
    Alter(AlterDb),
}

impl DbSpace {
    /// Opens a fresh, empty database per `config`. Alter mode additionally
    /// requires `config`'s path to not already exist (or be overwritable);
    /// use [`DbSpace::load`] to reopen an existing file.
    pub fn create(config: &DbConfig) -> Result<Self> {
        match config.mode() {
            Mode::Normal => Ok(DbSpace::Normal(NormalDb::new()?)),
            Mode::Simple => Ok(DbSpace::Simple(SimpleDb::new())),
            Mode::Alter => {
                let path = config.path.as_ref().ok_or_else(|| {
                    ImgdbError::Param("alter-mode database requires a path".into())
                })?;
                Ok(DbSpace::Alter(AlterDb::create(path)?))
            }
        }
    }

    pub fn load(path: &Path, mode: Mode) -> Result<Self> {
        match mode {
            Mode::Normal => Ok(DbSpace::Normal(NormalDb::load(path)?)),
            Mode::Simple => Ok(DbSpace::Simple(SimpleDb::load(path)?)),
            Mode::Alter => Ok(DbSpace::Alter(AlterDb::load(path)?)),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            DbSpace::Normal(_) => Mode::Normal,
            DbSpace::Simple(_) => Mode::Simple,
            DbSpace::Alter(_) => Mode::Alter,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DbSpace::Normal(db) => db.len(),
            DbSpace::Simple(db) => db.len(),
            DbSpace::Alter(db) => db.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ImageId) -> bool {
        match self {
            DbSpace::Normal(db) => db.contains(id),
            DbSpace::Simple(db) => db.contains(id),
            DbSpace::Alter(db) => db.contains(id),
        }
    }

    pub fn info(&self, id: ImageId) -> Result<&ImageInfo> {
        match self {
            DbSpace::Normal(db) => db.info(id),
            DbSpace::Simple(db) => db.info(id),
            DbSpace::Alter(db) => db.info(id),
        }
    }

    /// Convenience wrapper matching the external `addImageData` contract:
    /// insert an already-computed signature under the given mask tag.
    pub fn add_image_data(&mut self, sig: &Signature, mask: u32) -> Result<ImageId> {
        match self {
            DbSpace::Normal(db) => db.add(sig, mask),
            DbSpace::Simple(db) => db.add(sig, mask),
            DbSpace::Alter(db) => db.add(sig, mask),
        }
    }

    pub fn remove(&mut self, id: ImageId) -> Result<()> {
        match self {
            DbSpace::Normal(db) => db.remove(id),
            DbSpace::Simple(db) => db.remove(id),
            DbSpace::Alter(db) => db.remove(id),
        }
    }

    pub fn query(&mut self, query: &QueryArg) -> Result<Vec<QueryResult>> {
        match self {
            DbSpace::Normal(db) => db.query(query),
            DbSpace::Simple(db) => db.query(query),
            DbSpace::Alter(_) => Err(ImgdbError::Usage(
                "alter-mode databases do not support query".into(),
            )),
        }
    }

    pub fn rehash(&mut self) -> Result<()> {
        match self {
            DbSpace::Normal(db) => db.rehash(),
            DbSpace::Simple(_) => Err(ImgdbError::Usage(
                "simple-mode databases do not support rehash".into(),
            )),
            DbSpace::Alter(_) => Err(ImgdbError::Usage(
                "alter-mode databases do not support rehash".into(),
            )),
        }
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        match self {
            DbSpace::Normal(db) => db.save(path),
            DbSpace::Simple(db) => db.save(path),
            DbSpace::Alter(db) => {
                if path != db_path(db) {
                    return Err(ImgdbError::Param(
                        "alter-mode save path must match the path the database was opened with"
                            .into(),
                    ));
                }
                db.save()
            }
        }
    }
}

fn db_path(db: &AlterDb) -> &Path {
    db.path()
}

impl DbSpace {
    /// Lists every live image id. Simple mode's sentinel-removed entries
    /// (`avgl[0] == 0.0`) are excluded, matching the live-check query uses.
    pub fn image_id_list(&self) -> Vec<ImageId> {
        self.image_info_list().into_iter().map(|info| info.id).collect()
    }

    pub fn image_info_list(&self) -> Vec<ImageInfo> {
        match self {
            DbSpace::Normal(db) => db.infos_live(),
            DbSpace::Simple(db) => db
                .infos_all()
                .iter()
                .filter(|info| info.is_live())
                .cloned()
                .collect(),
            DbSpace::Alter(db) => db.infos_live(),
        }
    }

    pub fn is_image_grayscale(&self, id: ImageId) -> Result<bool> {
        Ok(self.info(id)?.is_grayscale())
    }

    /// Updates stored width/height metadata without touching the signature
    /// or its bucket membership (dimensions play no role in scoring).
    pub fn set_image_res(&mut self, id: ImageId, width: i32, height: i32) -> Result<()> {
        match self {
            DbSpace::Normal(db) => db.set_image_res(id, width, height),
            DbSpace::Simple(db) => db.set_image_res(id, width, height),
            DbSpace::Alter(db) => db.set_image_res(id, width, height),
        }
    }
}
