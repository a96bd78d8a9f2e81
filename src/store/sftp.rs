use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::session::{connect_sftp, map_ssh_error, resolve_base};
use super::{ObjectListing, ObjectMeta, ObjectStore, ObjectStream};
use crate::error::{StoreError, StoreErrorKind};
use crate::parse::SftpTarget;

struct Conn {
    // keep the session alive for as long as the channel is in use
    _sess: ssh2::Session,
    sftp: ssh2::Sftp,
}

/// SFTP-backed store: buckets are directories under the target's base
/// directory. Sessions are opened lazily and pooled; a connection that hit a
/// transport error is dropped instead of being handed out again.
pub struct SftpStore {
    target: SftpTarget,
    idle: Mutex<Vec<Conn>>,
    base: OnceLock<String>,
}

impl SftpStore {
    pub fn new(target: SftpTarget) -> Self {
        Self { target, idle: Mutex::new(Vec::new()), base: OnceLock::new() }
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Conn>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self) -> Result<Conn, StoreError> {
        if let Some(conn) = self.idle().pop() {
            return Ok(conn);
        }
        let (sess, sftp) = connect_sftp(&self.target)?;
        tracing::debug!("[bulkfetch][sftp] opened session to {}", self.target.addr());
        Ok(Conn { _sess: sess, sftp })
    }

    fn checkin(&self, conn: Conn) {
        self.idle().push(conn);
    }

    fn base_dir(&self, conn: &Conn) -> Result<String, StoreError> {
        if let Some(b) = self.base.get() {
            return Ok(b.clone());
        }
        let resolved = resolve_base(&conn.sftp, self.target.base.as_deref())?;
        Ok(self.base.get_or_init(|| resolved).clone())
    }

    fn bucket_dir(&self, conn: &Conn, bucket: &str) -> Result<String, StoreError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == ".." {
            return Err(StoreError::new(
                StoreErrorKind::Invalid,
                format!("invalid bucket name: '{}'", bucket),
            ));
        }
        Ok(format!("{}/{}", self.base_dir(conn)?.trim_end_matches('/'), bucket))
    }

    fn object_path(&self, conn: &Conn, bucket: &str, key: &str) -> Result<String, StoreError> {
        let mut p = self.bucket_dir(conn, bucket)?;
        for seg in key.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if seg == ".." {
                return Err(StoreError::new(
                    StoreErrorKind::Invalid,
                    format!("key leaves the bucket: '{}'", key),
                ));
            }
            p.push('/');
            p.push_str(seg);
        }
        Ok(p)
    }
}

impl ObjectStore for SftpStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Option<ObjectListing<'_>>, StoreError> {
        let conn = self.checkout()?;
        let root = match self.bucket_dir(&conn, bucket) {
            Ok(r) => r,
            Err(e) => {
                if !e.is_transient() {
                    self.checkin(conn);
                }
                return Err(e);
            }
        };
        match conn.sftp.stat(Path::new(&root)) {
            Ok(st) if st.is_dir() => {}
            Ok(_) => {
                self.checkin(conn);
                return Err(StoreError::not_found(format!("bucket '{}' is not a directory", bucket)));
            }
            Err(e) => {
                let err = map_ssh_error(&e, &format!("stat bucket {}", bucket));
                if !err.is_transient() {
                    self.checkin(conn);
                }
                return Err(err);
            }
        }
        let mut queue = VecDeque::new();
        queue.push_back((root, String::new()));
        Ok(Some(Box::new(RemoteWalk {
            store: self,
            conn: Some(conn),
            queue,
            pending: VecDeque::new(),
            prefix: prefix.to_string(),
            broken: false,
        })))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream<'_>, StoreError> {
        let conn = self.checkout()?;
        let opened = self
            .object_path(&conn, bucket, key)
            .and_then(|p| conn.sftp.open(Path::new(&p)).map_err(|e| map_ssh_error(&e, key)));
        match opened {
            Ok(file) => Ok(Box::new(PooledFile {
                store: self,
                conn: Some(conn),
                file: Some(file),
                broken: false,
            })),
            Err(e) => {
                // a rejected path leaves the channel usable; transport errors do not
                if !e.is_transient() {
                    self.checkin(conn);
                }
                Err(e)
            }
        }
    }

    fn describe(&self) -> String {
        self.target.to_string()
    }
}

// Breadth-first remote walk, one readdir per directory, pruned by prefix.
struct RemoteWalk<'a> {
    store: &'a SftpStore,
    conn: Option<Conn>,
    queue: VecDeque<(String, String)>,
    pending: VecDeque<ObjectMeta>,
    prefix: String,
    broken: bool,
}

fn may_contain(dir_rel: &str, prefix: &str) -> bool {
    let d = format!("{}/", dir_rel);
    d.starts_with(prefix) || prefix.starts_with(&d)
}

impl Iterator for RemoteWalk<'_> {
    type Item = Result<ObjectMeta, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(meta) = self.pending.pop_front() {
                return Some(Ok(meta));
            }
            if self.broken {
                return None;
            }
            let (cur, rel_prefix) = self.queue.pop_front()?;
            let conn = self.conn.as_ref()?;
            let mut entries = match conn.sftp.readdir(Path::new(&cur)) {
                Ok(entries) => entries,
                Err(e) => {
                    self.broken = true;
                    self.conn = None;
                    return Some(Err(map_ssh_error(&e, &format!("readdir {}", cur))));
                }
            };
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (pathbuf, stat) in entries {
                let Some(name) = pathbuf.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if matches!(name, "." | "..") {
                    continue;
                }
                let full = format!("{}/{}", cur.trim_end_matches('/'), name);
                let rel = if rel_prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", rel_prefix, name)
                };
                if stat.is_file() {
                    if rel.starts_with(&self.prefix) {
                        self.pending.push_back(ObjectMeta::new(rel, stat.size));
                    }
                } else if stat.is_dir() && may_contain(&rel, &self.prefix) {
                    self.queue.push_back((full, rel));
                }
            }
        }
    }
}

impl Drop for RemoteWalk<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.store.checkin(conn);
        }
    }
}

struct PooledFile<'a> {
    store: &'a SftpStore,
    conn: Option<Conn>,
    file: Option<ssh2::File>,
    broken: bool,
}

impl Read for PooledFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        match file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.broken = true;
                Err(e)
            }
        }
    }
}

impl Drop for PooledFile<'_> {
    fn drop(&mut self) {
        drop(self.file.take());
        if let Some(conn) = self.conn.take()
            && !self.broken
        {
            self.store.checkin(conn);
        }
    }
}
