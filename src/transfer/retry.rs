use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use super::keymap::{DestinationPath, map_key_to_path};
use super::materialize::ensure_dir_all;
use super::outcome::{TransferOutcome, TransferReport};
use crate::error::FetchError;
use crate::store::ObjectStore;
use crate::transfer::helpers::display_path;

/// How many times one object may be attempted, and how long to wait between
/// attempts. The budget is per object; nothing is pooled across tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 100;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, backoff_ms: DEFAULT_BACKOFF_MS }
    }
}

impl RetryPolicy {
    /// A zero budget is raised to one attempt.
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff_ms }
    }

    /// Linear backoff: the wait after attempt `n` is `backoff_ms * n`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Result of a single attempt, classified by the attempt itself so the retry
/// driver never has to inspect error types.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Transient(FetchError),
    Permanent(FetchError),
}

impl<T> Attempt<T> {
    pub fn classify(res: Result<T, FetchError>) -> Self {
        match res {
            Ok(v) => Attempt::Done(v),
            Err(e) if e.is_transient() => Attempt::Transient(e),
            Err(e) => Attempt::Permanent(e),
        }
    }
}

/// Drive `attempt(attempt_no, remaining)` until it is `Done`, `Permanent`, or
/// the budget is spent. `remaining` counts the current attempt.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, ctx: &str, mut attempt: F) -> (TransferOutcome, Option<T>)
where
    F: FnMut(u32, u32) -> Attempt<T>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt_no = 1;
    loop {
        match attempt(attempt_no, max - attempt_no + 1) {
            Attempt::Done(v) => {
                let outcome = if attempt_no == 1 {
                    TransferOutcome::Success
                } else {
                    TransferOutcome::SucceededAfterRetry { attempts: attempt_no }
                };
                return (outcome, Some(v));
            }
            Attempt::Permanent(e) => {
                tracing::debug!("[bulkfetch][retry] {} attempt {} permanent: {}", ctx, attempt_no, e);
                return (TransferOutcome::Failed { attempts: attempt_no, last_error: e }, None);
            }
            Attempt::Transient(e) => {
                if attempt_no >= max {
                    tracing::debug!("[bulkfetch][retry] {} budget of {} spent: {}", ctx, max, e);
                    return (TransferOutcome::Failed { attempts: attempt_no, last_error: e }, None);
                }
                let wait = policy.backoff_after(attempt_no);
                tracing::debug!(
                    "[bulkfetch][retry] {} attempt {}/{} failed: {}; retrying in {:?}",
                    ctx,
                    attempt_no,
                    max,
                    e,
                    wait
                );
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                attempt_no += 1;
            }
        }
    }
}

/// One object to fetch. Bucket and destination root are shared read-only by
/// every task of a batch.
#[derive(Debug, Clone)]
pub struct TransferTask<'a> {
    pub bucket: &'a str,
    pub key: String,
    pub destination_root: &'a Path,
}

/// Fetch one object into its mapped destination, retrying transient failures
/// within `policy`. Never returns an error: every failure ends up in the report.
pub fn fetch_object(
    store: &dyn ObjectStore,
    task: &TransferTask<'_>,
    policy: &RetryPolicy,
    buf: &mut [u8],
) -> TransferReport {
    let dest = match map_key_to_path(task.destination_root, &task.key) {
        Ok(d) => d,
        Err(e) => {
            // rejected before any attempt was made
            return TransferReport {
                key: task.key.clone(),
                destination: None,
                bytes: 0,
                outcome: TransferOutcome::Failed { attempts: 0, last_error: FetchError::KeyPath(e) },
            };
        }
    };
    let ctx = format!("{}/{}", task.bucket, task.key);
    let (outcome, bytes) = run_with_retry(policy, &ctx, |_, _| {
        Attempt::classify(attempt_once(store, task, &dest, buf))
    });
    TransferReport {
        key: task.key.clone(),
        destination: Some(dest.file),
        bytes: bytes.unwrap_or(0),
        outcome,
    }
}

// One fetch-and-write. The destination is reopened with truncation every time,
// so a partial body from an earlier attempt is overwritten, never appended to.
fn attempt_once(
    store: &dyn ObjectStore,
    task: &TransferTask<'_>,
    dest: &DestinationPath,
    buf: &mut [u8],
) -> Result<u64, FetchError> {
    ensure_dir_all(&dest.dir).map_err(FetchError::CreateDir)?;
    let mut remote = store.get_object(task.bucket, &task.key).map_err(FetchError::Store)?;
    let mut local_f = File::create(&dest.file).map_err(|e| FetchError::local_open(&dest.file, &e))?;
    let n = copy_stream(&mut remote, &mut local_f, buf, &dest.file)?;
    local_f.flush().map_err(|e| FetchError::local_write(&dest.file, &e))?;
    tracing::trace!("[bulkfetch][retry] wrote {} bytes to {}", n, display_path(&dest.file));
    Ok(n)
}

/// Stream `reader` into `writer` through `buf`. Read failures are reported as
/// `Stream` (transient), write failures as `LocalWrite`.
pub(crate) fn copy_stream<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    path: &Path,
) -> Result<u64, FetchError> {
    let mut total: u64 = 0;
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                writer.write_all(&buf[..n]).map_err(|e| FetchError::local_write(path, &e))?;
                total += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::Stream(e.to_string())),
        }
    }
}
