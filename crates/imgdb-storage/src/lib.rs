//! Bucket store, signature cache, image registry and binary serializer for
//! imgdb. No scoring logic lives here; see `imgdb-query` for that.

pub mod bucket;
pub mod pagedfile;
pub mod registry;
pub mod serializer;
pub mod sigcache;

pub use bucket::{BucketRef, BucketStore};
pub use pagedfile::{MappedList, PagedList, SharedPageFile};
pub use registry::{AlterRegistry, NormalRegistry, SimpleRegistry};
pub use sigcache::SigCache;
