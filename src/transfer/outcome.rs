use std::path::PathBuf;

use serde::Serialize;

use crate::error::FetchError;

/// Final result of one object's transfer.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Success,
    SucceededAfterRetry { attempts: u32 },
    Failed { attempts: u32, last_error: FetchError },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TransferOutcome::Success => 1,
            TransferOutcome::SucceededAfterRetry { attempts }
            | TransferOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Message a worker sends to the aggregator once a task is finished.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub key: String,
    pub destination: Option<PathBuf>,
    pub bytes: u64,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedObject {
    pub key: String,
    pub attempts: u32,
    pub error: String,
    pub transient: bool,
}

/// Terminal counts of a batch. `record` is order-independent, so outcomes can
/// arrive in any completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
    pub bytes: u64,
    pub failures: Vec<FailedObject>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn record(&mut self, report: &TransferReport) {
        match &report.outcome {
            TransferOutcome::Success => {
                self.succeeded += 1;
                self.bytes += report.bytes;
            }
            TransferOutcome::SucceededAfterRetry { .. } => {
                self.retried += 1;
                self.bytes += report.bytes;
            }
            TransferOutcome::Failed { attempts, last_error } => {
                self.failed += 1;
                self.failures.push(FailedObject {
                    key: report.key.clone(),
                    attempts: *attempts,
                    error: last_error.to_string(),
                    transient: last_error.is_transient(),
                });
            }
        }
    }

    /// Objects that ended up on disk, retried or not.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.retried
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.retried + self.failed
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.failures.iter().map(|f| f.key.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn report(key: &str, outcome: TransferOutcome, bytes: u64) -> TransferReport {
        TransferReport { key: key.to_string(), destination: None, bytes, outcome }
    }

    fn failed(attempts: u32) -> TransferOutcome {
        TransferOutcome::Failed {
            attempts,
            last_error: FetchError::Store(StoreError::transient("reset")),
        }
    }

    #[test]
    fn record_counts_each_class() {
        let mut s = BatchSummary::default();
        s.record(&report("a", TransferOutcome::Success, 10));
        s.record(&report("b", TransferOutcome::SucceededAfterRetry { attempts: 3 }, 5));
        s.record(&report("c", failed(3), 0));
        assert_eq!((s.succeeded, s.retried, s.failed), (1, 1, 1));
        assert_eq!(s.bytes, 15);
        assert_eq!(s.completed(), 2);
        assert_eq!(s.total(), 3);
        assert_eq!(s.failures[0].attempts, 3);
        assert!(s.failures[0].transient);
    }

    #[test]
    fn order_does_not_matter() {
        let reports = vec![
            report("x", failed(1), 0),
            report("y", TransferOutcome::Success, 1),
            report("z", TransferOutcome::SucceededAfterRetry { attempts: 2 }, 2),
        ];
        let mut fwd = BatchSummary::default();
        reports.iter().for_each(|r| fwd.record(r));
        let mut rev = BatchSummary::default();
        reports.iter().rev().for_each(|r| rev.record(r));
        assert_eq!((fwd.succeeded, fwd.retried, fwd.failed, fwd.bytes), (1, 1, 1, 3));
        assert_eq!((rev.succeeded, rev.retried, rev.failed, rev.bytes), (1, 1, 1, 3));
        assert_eq!(fwd.failed_keys(), rev.failed_keys());
    }

    #[test]
    fn attempts_per_outcome() {
        assert_eq!(TransferOutcome::Success.attempts(), 1);
        assert_eq!(TransferOutcome::SucceededAfterRetry { attempts: 2 }.attempts(), 2);
        assert_eq!(failed(3).attempts(), 3);
        assert!(!failed(1).is_success());
    }
}
