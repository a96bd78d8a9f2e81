use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ObjectListing, ObjectMeta, ObjectStore, ObjectStream};
use crate::error::{StoreError, StoreErrorKind};

/// A call observed by [`MemoryStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List { bucket: String, prefix: String },
    Get { bucket: String, key: String },
}

/// In-memory store with scripted failures and a call log. Keys are listed in
/// sorted order; a leading `/` on a stored key is ignored for prefix matching.
/// Listing an unknown bucket yields `None`.
#[derive(Default)]
pub struct MemoryStore {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    get_faults: Mutex<HashMap<String, VecDeque<StoreErrorKind>>>,
    stream_faults: Mutex<HashMap<String, u32>>,
    listing_fail_after: Option<usize>,
    calls: Mutex<Vec<StoreCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.insert(bucket, key, body);
        self
    }

    pub fn insert(&mut self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.buckets.entry(bucket.to_string()).or_default().insert(key.to_string(), body.into());
    }

    /// Register a bucket with no objects (lists as `Some(empty)`).
    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.buckets.entry(bucket.to_string()).or_default();
        self
    }

    /// The listing yields `n` items, then a transient error (a failed page fetch).
    pub fn fail_listing_after(mut self, n: usize) -> Self {
        self.listing_fail_after = Some(n);
        self
    }

    /// The next `times` `get_object` calls for `key` fail with `kind`.
    pub fn fail_next(&self, key: &str, times: u32, kind: StoreErrorKind) {
        let mut faults = lock(&self.get_faults);
        let q = faults.entry(key.to_string()).or_default();
        for _ in 0..times {
            q.push_back(kind);
        }
    }

    /// The next `times` bodies of `key` break off halfway with a connection reset.
    pub fn fail_stream_next(&self, key: &str, times: u32) {
        *lock(&self.stream_faults).entry(key.to_string()).or_default() += times;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn get_calls(&self, key: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, StoreCall::Get { key: k, .. } if k == key))
            .count()
    }
}

impl ObjectStore for MemoryStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Option<ObjectListing<'_>>, StoreError> {
        lock(&self.calls)
            .push(StoreCall::List { bucket: bucket.to_string(), prefix: prefix.to_string() });
        let Some(objects) = self.buckets.get(bucket) else {
            return Ok(None);
        };
        let matched: Vec<ObjectMeta> = objects
            .iter()
            .filter(|(k, _)| k.trim_start_matches('/').starts_with(prefix))
            .map(|(k, v)| ObjectMeta::new(k.clone(), Some(v.len() as u64)))
            .collect();
        let items: Box<dyn Iterator<Item = Result<ObjectMeta, StoreError>>> =
            match self.listing_fail_after {
                Some(n) => Box::new(
                    matched
                        .into_iter()
                        .take(n)
                        .map(Ok)
                        .chain(std::iter::once(Err(StoreError::transient("page fetch failed")))),
                ),
                None => Box::new(matched.into_iter().map(Ok)),
            };
        Ok(Some(items))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream<'_>, StoreError> {
        lock(&self.calls).push(StoreCall::Get { bucket: bucket.to_string(), key: key.to_string() });
        if let Some(kind) = lock(&self.get_faults).get_mut(key).and_then(|q| q.pop_front()) {
            return Err(StoreError::new(kind, format!("scripted failure for '{}'", key)));
        }
        let body = self
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .ok_or_else(|| StoreError::not_found(format!("{}/{}", bucket, key)))?
            .clone();
        let mut stream_faults = lock(&self.stream_faults);
        if let Some(left) = stream_faults.get_mut(key)
            && *left > 0
        {
            *left -= 1;
            let cut = body.len() / 2;
            return Ok(Box::new(BrokenStream::new(body, cut)));
        }
        Ok(Box::new(io::Cursor::new(body)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// Yields `cut` bytes of `data` then fails every further read with ConnectionReset.
struct BrokenStream {
    data: Vec<u8>,
    pos: usize,
    cut: usize,
}

impl BrokenStream {
    fn new(data: Vec<u8>, cut: usize) -> Self {
        Self { data, pos: 0, cut }
    }
}

impl Read for BrokenStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.cut {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated connection reset",
            ));
        }
        let n = std::cmp::min(buf.len(), self.cut - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bucket_lists_none() {
        let store = MemoryStore::new();
        assert!(store.list_objects("missing", "").unwrap().is_none());
        assert_eq!(
            store.calls(),
            vec![StoreCall::List { bucket: "missing".into(), prefix: "".into() }]
        );
    }

    #[test]
    fn prefix_ignores_leading_separator_on_keys() {
        let store = MemoryStore::new()
            .with_object("b", "/a/prefix/a-file", "x")
            .with_object("b", "/elsewhere", "y");
        let keys: Vec<String> =
            store.list_objects("b", "a/prefix").unwrap().unwrap().map(|m| m.unwrap().key).collect();
        assert_eq!(keys, vec!["/a/prefix/a-file".to_string()]);
    }

    #[test]
    fn scripted_failures_are_consumed_in_order() {
        let store = MemoryStore::new().with_object("b", "k", "v");
        store.fail_next("k", 2, StoreErrorKind::Transient);
        assert!(store.get_object("b", "k").is_err());
        assert!(store.get_object("b", "k").is_err());
        assert!(store.get_object("b", "k").is_ok());
        assert_eq!(store.get_calls("k"), 3);
    }

    #[test]
    fn broken_stream_fails_midway() {
        let store = MemoryStore::new().with_object("b", "k", "0123456789");
        store.fail_stream_next("k", 1);
        let mut out = Vec::new();
        let err = store.get_object("b", "k").unwrap().read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(out, b"01234");
        let mut out2 = Vec::new();
        store.get_object("b", "k").unwrap().read_to_end(&mut out2).unwrap();
        assert_eq!(out2, b"0123456789");
    }

    #[test]
    fn listing_error_after_n_items() {
        let store = MemoryStore::new()
            .with_object("b", "1", "")
            .with_object("b", "2", "")
            .fail_listing_after(1);
        let items: Vec<_> = store.list_objects("b", "").unwrap().unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
