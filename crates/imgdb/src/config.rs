//! Builder for DB construction options.

use std::path::PathBuf;

/// The three on-disk/in-memory trade-offs a `DbSpace` can be opened in. See
/// the mode matrix in the module-level docs for what each one can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Simple,
    Alter,
}

impl Mode {
    /// Parses a mode name the way the original CLI/config accepted it.
    /// `"readonly"` and `"imgdata"` are recognized but map onto `Simple`:
    /// this implementation doesn't distinguish them from plain simple mode.
    ///
    /// # Errors
    ///
    /// [`imgdb_types::ImgdbError::Param`] if `name` isn't a known mode.
    pub fn from_name(name: &str) -> imgdb_types::Result<Self> {
        match name {
            "normal" => Ok(Mode::Normal),
            "simple" | "readonly" | "imgdata" => Ok(Mode::Simple),
            "alter" => Ok(Mode::Alter),
            other => Err(imgdb_types::ImgdbError::Param(format!(
                "unknown mode name {other:?}"
            ))),
        }
    }
}

/// Construction options for a [`crate::DbSpace`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub(crate) mode: Mode,
    pub(crate) path: Option<PathBuf>,
}

impl DbConfig {
    pub fn new(mode: Mode) -> Self {
        Self { mode, path: None }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}
