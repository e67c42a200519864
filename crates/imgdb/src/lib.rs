//! A content-based image similarity database: a perceptual-hash inverted
//! index over Haar wavelet coefficients, with three on-disk-compatible
//! operating modes.
//!
//! [`DbSpace`] is the entry point. Open one with [`DbConfig`] and a [`Mode`],
//! feed it signatures from an external signature builder (see
//! `imgdb_types::Signature`), and query it for similar images.
//!
//! # Mode matrix
//!
//! | Capability | Normal | Simple | Alter |
//! |---|---|---|---|
//! | `add` | yes | yes | yes |
//! | `remove` | yes (rehash later) | soft (sentinel) | yes (hole list) |
//! | `query` | yes | yes | no |
//! | `save` | rewrite file | fails | in-place mutate |
//! | `rehash` | yes | no | no |

mod alter;
mod config;
mod dbspace;
mod normal;
mod simple;
mod supplements;

pub use config::{DbConfig, Mode};
pub use dbspace::DbSpace;
pub use imgdb_query::{QueryArg, QueryResult};
pub use imgdb_types::{ImageId, ImgdbError, ImageInfo, Result, Signature};
pub use supplements::{calc_avgl_diff, calc_sim, get_coeff_stats};
