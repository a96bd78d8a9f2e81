use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{ObjectListing, ObjectMeta, ObjectStore, ObjectStream};
use crate::error::{StoreError, StoreErrorKind};

/// Filesystem-backed store: every subdirectory of `root` is a bucket and keys
/// are `/`-joined paths relative to it.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') || bucket == ".." {
            return Err(StoreError::new(
                StoreErrorKind::Invalid,
                format!("invalid bucket name: '{}'", bucket),
            ));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut p = self.bucket_dir(bucket)?;
        for seg in key.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if seg == ".." {
                return Err(StoreError::new(
                    StoreErrorKind::Invalid,
                    format!("key leaves the bucket: '{}'", key),
                ));
            }
            p.push(seg);
        }
        Ok(p)
    }
}

// Directory that contains every key starting with `prefix`: "a/b/c" -> "a/b", "a/b/" -> "a/b".
fn walk_start(bucket_dir: &Path, prefix: &str) -> PathBuf {
    let dir_part = match prefix.rfind('/') {
        Some(pos) => &prefix[..pos],
        None => "",
    };
    let mut start = bucket_dir.to_path_buf();
    for seg in dir_part.split('/').filter(|s| !s.is_empty()) {
        start.push(seg);
    }
    start
}

fn key_of(bucket_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(bucket_dir).ok()?;
    let segs: Vec<String> =
        rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    if segs.is_empty() { None } else { Some(segs.join("/")) }
}

impl ObjectStore for LocalStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Option<ObjectListing<'_>>, StoreError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        if !bucket_dir.is_dir() {
            return Err(StoreError::not_found(format!("bucket '{}' does not exist", bucket)));
        }
        let start = walk_start(&bucket_dir, prefix);
        if !start.is_dir() {
            tracing::debug!("[bulkfetch][local] nothing under {}", start.display());
            return Ok(Some(Box::new(std::iter::empty())));
        }
        let prefix = prefix.to_string();
        let walk = WalkDir::new(start).sort_by_file_name().into_iter();
        let listing = walk.filter_map(move |entry| match entry {
            Ok(ent) => {
                if !ent.file_type().is_file() {
                    return None;
                }
                let key = key_of(&bucket_dir, ent.path())?;
                if !key.starts_with(&prefix) {
                    return None;
                }
                let size = ent.metadata().ok().map(|m| m.len());
                Some(Ok(ObjectMeta::new(key, size)))
            }
            Err(e) => {
                let err = match e.io_error() {
                    Some(io) => StoreError::from_io(io, "walk bucket"),
                    None => StoreError::transient(format!("walk bucket: {}", e)),
                };
                Some(Err(err))
            }
        });
        Ok(Some(Box::new(listing)))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream<'_>, StoreError> {
        let path = self.object_path(bucket, key)?;
        let md = std::fs::metadata(&path)
            .map_err(|e| StoreError::from_io(&e, &format!("stat {}", key)))?;
        if !md.is_file() {
            return Err(StoreError::not_found(format!("'{}' is not an object", key)));
        }
        let f = std::fs::File::open(&path)
            .map_err(|e| StoreError::from_io(&e, &format!("open {}", key)))?;
        Ok(Box::new(f))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn make_tmp_dir() -> PathBuf {
        let mut base = std::env::temp_dir();
        let uniq = format!(
            "bf_local_store_{}_{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        );
        base.push(uniq);
        std::fs::create_dir_all(&base).expect("create tmp dir");
        base
    }

    fn seed(root: &Path, bucket: &str, key: &str, body: &[u8]) {
        let p = root.join(bucket).join(key);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn keys(store: &LocalStore, bucket: &str, prefix: &str) -> Vec<String> {
        store
            .list_objects(bucket, prefix)
            .expect("list")
            .expect("some listing")
            .map(|r| r.expect("item").key)
            .collect()
    }

    #[test]
    fn walk_start_uses_directory_part_of_prefix() {
        let b = Path::new("/r/b");
        assert_eq!(walk_start(b, ""), PathBuf::from("/r/b"));
        assert_eq!(walk_start(b, "logs"), PathBuf::from("/r/b"));
        assert_eq!(walk_start(b, "a/pre"), PathBuf::from("/r/b/a"));
        assert_eq!(walk_start(b, "a/pre/"), PathBuf::from("/r/b/a/pre"));
    }

    #[test]
    fn lists_keys_under_prefix_in_order() {
        let root = make_tmp_dir();
        seed(&root, "b", "a/prefix/a-file", b"1");
        seed(&root, "b", "a/prefix/subdir/b-file", b"22");
        seed(&root, "b", "a/prefixed.txt", b"333");
        seed(&root, "b", "other/c", b"4");
        let store = LocalStore::new(&root);

        assert_eq!(
            keys(&store, "b", "a/prefix/"),
            vec!["a/prefix/a-file".to_string(), "a/prefix/subdir/b-file".to_string()]
        );
        // plain string prefix semantics, not directory semantics
        assert_eq!(keys(&store, "b", "a/prefix").len(), 3);
        assert_eq!(keys(&store, "b", "").len(), 4);
        assert!(keys(&store, "b", "zzz/").is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn sizes_are_reported() {
        let root = make_tmp_dir();
        seed(&root, "b", "x/y.bin", b"hello");
        let store = LocalStore::new(&root);
        let meta: Vec<ObjectMeta> =
            store.list_objects("b", "x").unwrap().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(meta, vec![ObjectMeta::new("x/y.bin", Some(5))]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_bucket_is_not_found() {
        let root = make_tmp_dir();
        let store = LocalStore::new(&root);
        match store.list_objects("nope", "") {
            Err(e) => assert_eq!(e.kind, StoreErrorKind::NotFound),
            Ok(_) => panic!("expected NotFound"),
        }
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn get_object_reads_body_and_rejects_traversal() {
        let root = make_tmp_dir();
        seed(&root, "b", "d/f.txt", b"body");
        let store = LocalStore::new(&root);
        let mut s = String::new();
        store.get_object("b", "/d/f.txt").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "body");
        match store.get_object("b", "../b/d/f.txt") {
            Err(e) => assert_eq!(e.kind, StoreErrorKind::Invalid),
            Ok(_) => panic!("expected Invalid"),
        }
        match store.get_object("b", "d") {
            Err(e) => assert_eq!(e.kind, StoreErrorKind::NotFound),
            Ok(_) => panic!("directory is not an object"),
        }
        let _ = std::fs::remove_dir_all(&root);
    }
}
