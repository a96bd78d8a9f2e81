// store module: object-store client seam plus the backends the CLI can drive
mod local;
mod memory;
mod session;
mod sftp;

use std::io::Read;

use anyhow::{Context, Result};

pub use crate::error::{StoreError, StoreErrorKind};
pub use local::LocalStore;
pub use memory::{MemoryStore, StoreCall};
pub use sftp::SftpStore;

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: Option<u64>,
}

impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: Option<u64>) -> Self {
        Self { key: key.into(), size }
    }
}

/// Lazy listing; items are produced as the backend pages through the bucket.
pub type ObjectListing<'a> = Box<dyn Iterator<Item = Result<ObjectMeta, StoreError>> + 'a>;

/// Byte stream of a single object body.
pub type ObjectStream<'a> = Box<dyn Read + Send + 'a>;

/// Minimal client surface the retrieval engine depends on. Implementations
/// must tolerate concurrent `get_object` calls from many worker threads.
pub trait ObjectStore: Send + Sync {
    /// Enumerate objects under `prefix`. `Ok(None)` means the store reported
    /// no result at all, which the scheduler treats the same as an empty listing.
    fn list_objects(&self, bucket: &str, prefix: &str)
    -> Result<Option<ObjectListing<'_>>, StoreError>;

    /// Open the body of `key` for reading.
    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream<'_>, StoreError>;

    /// Short human label used in logs.
    fn describe(&self) -> String;
}

/// Build a store from a CLI/config spec: `sftp://user@host[:port][/base]`
/// selects the SFTP backend, anything else is a local directory whose
/// subdirectories are buckets.
pub fn open_store(spec: &str) -> Result<Box<dyn ObjectStore>> {
    if let Some(rest) = spec.strip_prefix("sftp://") {
        let target = crate::parse::parse_sftp_target(rest)
            .with_context(|| format!("invalid sftp store spec: {}", spec))?;
        return Ok(Box::new(SftpStore::new(target)));
    }
    let root = std::path::PathBuf::from(spec);
    if !root.is_dir() {
        return Err(anyhow::anyhow!("store root is not a directory: {}", root.display()));
    }
    Ok(Box::new(LocalStore::new(root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store_rejects_missing_local_root() {
        let missing = std::env::temp_dir().join(format!("bf_no_such_root_{}", std::process::id()));
        assert!(open_store(&missing.to_string_lossy()).is_err());
    }

    #[test]
    fn open_store_parses_sftp_spec_without_connecting() {
        let store = open_store("sftp://alice@example.com:2222/srv/buckets").expect("sftp spec");
        assert_eq!(store.describe(), "sftp://alice@example.com:2222/srv/buckets");
    }

    #[test]
    fn open_store_local_root() {
        let store = open_store(&std::env::temp_dir().to_string_lossy()).expect("local root");
        assert!(store.describe().starts_with("local:"));
    }
}
