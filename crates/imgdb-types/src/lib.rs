//! Shared types for the imgdb content-based image similarity index: the
//! error enum, the `Score` representation and weight tables, and the
//! `Signature`/`ImageInfo`/`ImageId` data model.
//!
//! This crate has no I/O and no storage logic; it's the vocabulary the rest
//! of the workspace shares.

mod error;
mod score;
mod signature;

pub use error::{ImgdbError, Result};
pub use score::{
    weight_for, DScore, Score, GRAYSCALE_THRESHOLD, IMG_BIN, SKETCH_LINES, SKETCH_NORMAL, WEIGHTS,
};
pub use signature::{
    avglf_to_avgl, coef_sign_index, ImageId, ImageInfo, Signature, MAX_COEF_INDEX, NUM_BUCKETS,
    NUM_CHANNELS, NUM_COEFS, NUM_PIXELS, NUM_SIGNS, SIGNATURE_BYTES,
};
