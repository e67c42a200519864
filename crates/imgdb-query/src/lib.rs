//! Similarity scoring: turns a query signature plus a live [`BucketStore`]
//! and registry snapshot into a ranked list of matches.

mod query;

pub use query::{do_query, QueryArg, QueryResult};
