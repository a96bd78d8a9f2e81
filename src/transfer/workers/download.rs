use std::thread::{Builder, Scope, ScopedJoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use super::WorkerMetrics;
use crate::error::FetchError;
use crate::store::ObjectStore;
use crate::transfer::outcome::TransferReport;
use crate::transfer::retry::{RetryPolicy, TransferTask, fetch_object};

pub(crate) struct DownloadWorkersCtx<'env> {
    pub(crate) workers: usize,
    pub(crate) store: &'env dyn ObjectStore,
    pub(crate) task_rx: Receiver<TransferTask<'env>>,
    pub(crate) report_tx: Sender<TransferReport>,
    pub(crate) retry: RetryPolicy,
    pub(crate) buf_size: usize,
}

/// Spawn `ctx.workers` named threads inside `scope`. Each pulls one task at a
/// time until the task channel closes, and sends exactly one report per task.
///
/// If a thread cannot be spawned the handles created so far are returned with
/// the error; the caller must close the task channel and join them.
pub(crate) fn run_download_workers<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    ctx: DownloadWorkersCtx<'env>,
) -> (Vec<ScopedJoinHandle<'scope, WorkerMetrics>>, Option<FetchError>) {
    let DownloadWorkersCtx { workers, store, task_rx, report_tx, retry, buf_size } = ctx;
    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let task_rx = task_rx.clone();
        let report_tx = report_tx.clone();
        let spawned = Builder::new().name(format!("bulkfetch-worker-{}", worker_id)).spawn_scoped(
            scope,
            move || {
                let mut buf = vec![0u8; buf_size.max(1)];
                let mut metrics = WorkerMetrics::default();
                let worker_start = Instant::now();
                while let Ok(task) = task_rx.recv() {
                    tracing::debug!(
                        "[bulkfetch][download] worker_id={} received key {}",
                        worker_id,
                        task.key
                    );
                    let report = fetch_object(store, &task, &retry, &mut buf);
                    metrics.objects += 1;
                    metrics.bytes += report.bytes;
                    if !report.outcome.is_success() {
                        metrics.failed += 1;
                    }
                    if report_tx.send(report).is_err() {
                        tracing::error!(
                            "[bulkfetch][download] worker_id={} aggregator gone, stopping",
                            worker_id
                        );
                        break;
                    }
                }
                metrics.elapsed = worker_start.elapsed();
                let secs = metrics.elapsed.as_secs_f64();
                if secs > 0.0 {
                    tracing::debug!(
                        "[bulkfetch][download] worker_id={} done: {} objects, {} failed, {:.2} MB/s",
                        worker_id,
                        metrics.objects,
                        metrics.failed,
                        metrics.bytes as f64 / 1024.0 / 1024.0 / secs
                    );
                }
                metrics
            },
        );
        match spawned {
            Ok(h) => handles.push(h),
            Err(e) => {
                tracing::error!("[bulkfetch][download] cannot spawn worker {}: {}", worker_id, e);
                return (handles, Some(FetchError::WorkerSpawn(e.to_string())));
            }
        }
    }
    (handles, None)
}
