// transfer module: prefix enumeration, fan-out and per-object transfer
pub mod filter;
mod helpers;
pub mod keymap;
pub mod materialize;
pub mod outcome;
pub mod retry;
mod workers;

pub(crate) use helpers::display_path;
pub use helpers::{normalize_path, normalize_prefix};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::Builder;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded, unbounded};
use indicatif::ProgressBar;

use self::filter::KeyFilter;
use self::outcome::BatchSummary;
use self::retry::{RetryPolicy, TransferTask};
use self::workers::aggregate_reports;
use self::workers::download::{DownloadWorkersCtx, run_download_workers};
use crate::error::{FetchError, StoreError};
use crate::store::{ObjectMeta, ObjectStore};

/// Upper bound on worker threads regardless of the requested concurrency.
pub const MAX_WORKERS: usize = 32;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_BUF_SIZE: usize = 1024 * 1024;
/// Largest per-worker copy buffer; bigger requests are clamped down.
pub const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub bucket: String,
    pub prefix: String,
    pub destination_root: PathBuf,
}

impl FetchRequest {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        destination_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            destination_root: destination_root.into(),
        }
    }
}

/// How to fetch: pool size, retry budget, key selection and console output.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub filter: KeyFilter,
    /// Cap on dispatched objects, counted after filtering.
    pub limit: Option<usize>,
    pub buf_size: usize,
    pub show_progress: bool,
    /// Print a `Writing file:` line per stored object.
    pub echo_objects: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            filter: KeyFilter::default(),
            limit: None,
            buf_size: DEFAULT_BUF_SIZE,
            show_progress: false,
            echo_objects: false,
            cancel: None,
        }
    }
}

/// Clamp a requested copy buffer size into `1..=MAX_BUF_SIZE`.
pub fn calc_buf_size(buf_size: usize) -> usize {
    buf_size.clamp(1, MAX_BUF_SIZE)
}

/// Clamp a requested worker count into `1..=MAX_WORKERS`.
pub fn calc_workers(concurrency: usize) -> usize {
    concurrency.clamp(1, MAX_WORKERS)
}

// Why dispatching stopped.
enum DispatchEnd {
    Exhausted,
    Cancelled,
    ListingFailed(StoreError),
    PoolClosed,
}

/// Download every object under `request.prefix` into `request.destination_root`.
///
/// Overview:
/// - the prefix loses its leading `/` and is listed exactly once;
/// - listed keys pass through `options.filter` then `options.limit`, in
///   listing order, and go to a bounded queue drained by a pool of named
///   worker threads;
/// - each worker maps, materializes and fetches one object at a time with
///   per-object retries, and reports the outcome to a single aggregator thread.
///
/// Per-object failures only show up in the returned summary. The call itself
/// fails when listing fails (up front or midway, after in-flight transfers
/// have drained), when the worker pool cannot be started, or when a worker
/// dies so that some dispatched object never got an outcome.
pub fn download_prefix(
    store: &dyn ObjectStore,
    request: &FetchRequest,
    options: &FetchOptions,
) -> Result<BatchSummary> {
    let prefix = normalize_prefix(&request.prefix);
    tracing::debug!(
        "[bulkfetch][enumerate] listing {}/{} on {}",
        request.bucket,
        prefix,
        store.describe()
    );
    let listing = store
        .list_objects(&request.bucket, &prefix)
        .map_err(FetchError::Enumeration)
        .with_context(|| format!("cannot list {}/{}", request.bucket, prefix))?;
    let Some(listing) = listing else {
        tracing::info!("[bulkfetch][enumerate] no listing for {}/{}", request.bucket, prefix);
        return Ok(BatchSummary::default());
    };
    let mut listing = listing.peekable();
    if listing.peek().is_none() {
        tracing::info!("[bulkfetch][enumerate] {}/{} is empty", request.bucket, prefix);
        return Ok(BatchSummary::default());
    }

    let workers = calc_workers(options.concurrency);
    let buf_size = calc_buf_size(options.buf_size);
    let cancel = options.cancel.clone().unwrap_or_default();
    let pb = crate::util::init_progress(options.show_progress);
    let (task_tx, task_rx) = bounded::<TransferTask<'_>>(workers * 4);
    let (report_tx, report_rx) = unbounded();
    tracing::debug!(
        "[bulkfetch][enumerate] workers={} backoff={}ms attempts={} buf={}",
        workers,
        options.retry.backoff_ms,
        options.retry.max_attempts,
        buf_size
    );

    let scoped: Result<(BatchSummary, DispatchEnd, usize, usize), FetchError> = std::thread::scope(|s| {
        let agg_pb = pb.clone();
        let echo = options.echo_objects;
        let aggregator = Builder::new()
            .name("bulkfetch-aggregate".to_string())
            .spawn_scoped(s, move || aggregate_reports(report_rx, &agg_pb, echo))
            .map_err(|e| FetchError::WorkerSpawn(e.to_string()))?;

        let (handles, spawn_err) = run_download_workers(
            s,
            DownloadWorkersCtx {
                workers,
                store,
                task_rx,
                report_tx,
                retry: options.retry,
                buf_size,
            },
        );
        if let Some(e) = spawn_err {
            // returning drops the task sender, which lets spawned workers exit
            return Err(e);
        }

        let (end, dispatched) = dispatch(&mut listing, request, options, &cancel, &task_tx, &pb);
        drop(task_tx);
        let mut panicked = 0;
        for h in handles {
            match h.join() {
                Ok(m) => tracing::trace!("[bulkfetch][enumerate] worker joined: {:?}", m),
                Err(_) => {
                    tracing::error!("[bulkfetch][enumerate] a worker thread panicked");
                    panicked += 1;
                }
            }
        }
        let summary = aggregator
            .join()
            .map_err(|_| FetchError::WorkerPanicked("aggregator thread panicked".to_string()))?;
        Ok((summary, end, dispatched, panicked))
    });
    pb.finish_and_clear();

    let (mut summary, end, dispatched, panicked) = scoped?;
    let lost = (dispatched as u64).saturating_sub(summary.total());
    if panicked > 0 || lost > 0 {
        tracing::error!(
            "[bulkfetch][enumerate] {} worker(s) panicked, {} of {} dispatched object(s) without outcome",
            panicked,
            lost,
            dispatched
        );
        return Err(anyhow::Error::new(FetchError::WorkerPanicked(format!(
            "{} worker(s) panicked, {} object(s) left without an outcome",
            panicked, lost
        )))
        .context(format!("download of {}/{} aborted", request.bucket, prefix)));
    }
    match end {
        DispatchEnd::Exhausted => {}
        DispatchEnd::PoolClosed => {
            return Err(anyhow::Error::new(FetchError::WorkerPanicked(
                "worker pool closed before the listing was exhausted".to_string(),
            ))
            .context(format!("download of {}/{} aborted", request.bucket, prefix)));
        }
        DispatchEnd::Cancelled => {
            tracing::warn!(
                "[bulkfetch][enumerate] cancelled after {} object(s)",
                summary.total()
            );
            summary.cancelled = true;
        }
        DispatchEnd::ListingFailed(e) => {
            tracing::warn!(
                "[bulkfetch][enumerate] listing of {}/{} broke off: {} ({} ok, {} retried, {} failed before stop)",
                request.bucket,
                prefix,
                e,
                summary.succeeded,
                summary.retried,
                summary.failed
            );
            return Err(anyhow::Error::new(FetchError::Enumeration(e))
                .context(format!("listing of {}/{} failed midway", request.bucket, prefix)));
        }
    }
    tracing::info!(
        "[bulkfetch][enumerate] {} into {}: {} ok, {} retried, {} failed",
        prefix,
        display_path(&request.destination_root),
        summary.succeeded,
        summary.retried,
        summary.failed
    );
    Ok(summary)
}

// Feed filtered, capped listing items to the workers. Blocks on the bounded
// queue when every worker is busy. Returns why it stopped and how many tasks
// were handed over.
fn dispatch<'a, I>(
    listing: &mut I,
    request: &'a FetchRequest,
    options: &FetchOptions,
    cancel: &AtomicBool,
    task_tx: &Sender<TransferTask<'a>>,
    pb: &ProgressBar,
) -> (DispatchEnd, usize)
where
    I: Iterator<Item = Result<ObjectMeta, StoreError>>,
{
    let mut dispatched: usize = 0;
    loop {
        if options.limit.is_some_and(|l| dispatched >= l) {
            tracing::debug!("[bulkfetch][enumerate] limit of {} reached", dispatched);
            return (DispatchEnd::Exhausted, dispatched);
        }
        if cancel.load(Ordering::SeqCst) {
            return (DispatchEnd::Cancelled, dispatched);
        }
        let meta = match listing.next() {
            None => return (DispatchEnd::Exhausted, dispatched),
            Some(Err(e)) => return (DispatchEnd::ListingFailed(e), dispatched),
            Some(Ok(m)) => m,
        };
        if !options.filter.accepts(&meta.key) {
            tracing::trace!("[bulkfetch][enumerate] skipping {}", meta.key);
            continue;
        }
        let task = TransferTask {
            bucket: &request.bucket,
            key: meta.key,
            destination_root: &request.destination_root,
        };
        pb.inc_length(1);
        if task_tx.send(task).is_err() {
            // every worker is gone; nothing left to hand work to
            tracing::error!("[bulkfetch][enumerate] worker pool closed early");
            return (DispatchEnd::PoolClosed, dispatched);
        }
        dispatched += 1;
    }
}
