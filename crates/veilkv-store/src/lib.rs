//! veilkv-store: OpenDAL storage abstraction for the physical backend

pub mod blob;
pub mod operator;

pub use blob::BlobStore;
pub use opendal::Operator;
pub use operator::{build_fs_operator, build_memory_operator, build_s3_operator, S3Config};
