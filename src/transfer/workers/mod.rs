pub(crate) mod download;

use std::time::Duration;

use crossbeam_channel::Receiver;
use indicatif::ProgressBar;

use super::outcome::{BatchSummary, TransferOutcome, TransferReport};
use crate::transfer::helpers::display_path;

#[derive(Clone, Default, Debug)]
pub(crate) struct WorkerMetrics {
    pub(crate) objects: u64,
    pub(crate) failed: u64,
    pub(crate) bytes: u64,
    pub(crate) elapsed: Duration,
}

/// Drain worker reports until every sender is gone. This is the only place
/// that prints per-object lines, so lines from concurrent transfers never
/// interleave.
pub(crate) fn aggregate_reports(
    report_rx: Receiver<TransferReport>,
    pb: &ProgressBar,
    echo_objects: bool,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for report in report_rx.iter() {
        let attempts = report.outcome.attempts();
        match &report.outcome {
            TransferOutcome::Failed { last_error, .. } => {
                tracing::warn!(
                    "[bulkfetch][aggregate] {} failed after {} attempt(s): {}",
                    report.key,
                    attempts,
                    last_error
                );
            }
            TransferOutcome::SucceededAfterRetry { .. } => {
                tracing::info!(
                    "[bulkfetch][aggregate] {} succeeded after {} attempts",
                    report.key,
                    attempts
                );
            }
            TransferOutcome::Success => {}
        }
        if echo_objects
            && report.outcome.is_success()
            && let Some(dest) = &report.destination
        {
            let line = format!("Writing file: {}", display_path(dest));
            pb.suspend(|| println!("{}", line));
        }
        summary.record(&report);
        pb.inc(1);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, StoreError};
    use crossbeam_channel::unbounded;

    #[test]
    fn aggregates_every_report() {
        let (tx, rx) = unbounded();
        let pb = ProgressBar::hidden();
        pb.set_length(3);
        for (key, outcome) in [
            ("a", TransferOutcome::Success),
            ("b", TransferOutcome::SucceededAfterRetry { attempts: 2 }),
            (
                "c",
                TransferOutcome::Failed {
                    attempts: 1,
                    last_error: FetchError::Store(StoreError::not_found("c")),
                },
            ),
        ] {
            tx.send(TransferReport { key: key.into(), destination: None, bytes: 4, outcome })
                .unwrap();
        }
        drop(tx);
        let s = aggregate_reports(rx, &pb, false);
        assert_eq!((s.succeeded, s.retried, s.failed, s.bytes), (1, 1, 1, 8));
        assert_eq!(s.failed_keys(), vec!["c"]);
        assert_eq!(pb.position(), 3);
    }
}
