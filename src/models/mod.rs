//! Data models exchanged with callers of the facade.
//!
//! Buckets and objects are plain snapshots; none of them hold a live
//! reference to the server. `policy` holds the canned bucket policies and
//! the "shared bucket" predicate.

pub mod bucket;
pub mod object;
pub mod policy;

pub use bucket::BucketInfo;
pub use object::{ObjectEntry, StoredFile};
pub use policy::{AccessPolicy, SharedPolicyCheck};
