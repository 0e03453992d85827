pub mod content_type;
pub mod default_bucket;
pub mod object_store;
pub mod paths;

pub use default_bucket::DefaultBucketStore;
pub use object_store::{DEFAULT_URL_EXPIRY, ObjectStore};
