use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use cli_table::format::Justify;
use cli_table::{Cell, CellStruct, Style, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::transfer::outcome::{BatchSummary, FailedObject};

pub const FAILURES_FILE_NAME: &str = "failures.jsonl";

/// Try to enable ANSI escape sequence support on Windows consoles.
#[cfg(windows)]
pub fn ansi_enabled() -> bool {
    enable_ansi_support::enable_ansi_support().is_ok()
}

// Other platforms' terminals handle ANSI already.
#[cfg(not(windows))]
pub fn ansi_enabled() -> bool {
    true
}

/// Convert a byte count into a human readable string using IEC units (KiB/MiB/GiB).
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Object-count progress bar. Its length starts at zero and grows as objects
/// are dispatched; a hidden bar is returned when output is unwanted.
pub fn init_progress(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    match ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} objects ({eta})",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("[bulkfetch][util] progress template rejected: {}", e),
    }
    pb
}

/// Render the failed objects as a table, sorted by key.
pub fn failures_table(failures: &[FailedObject]) -> std::io::Result<String> {
    let title = vec![
        "Key".cell().bold(true),
        "Attempts".cell().bold(true),
        "Transient".cell().bold(true),
        "Last Error".cell().bold(true),
    ];
    let mut sorted: Vec<&FailedObject> = failures.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    let rows: Vec<Vec<CellStruct>> = sorted
        .into_iter()
        .map(|f| {
            vec![
                f.key.as_str().cell(),
                f.attempts.cell().justify(Justify::Right),
                (if f.transient { "yes" } else { "no" }).cell().justify(Justify::Right),
                f.error.as_str().cell(),
            ]
        })
        .collect();
    Ok(rows.table().title(title).display()?.to_string())
}

/// Human summary printed after a batch.
pub fn print_summary(summary: &BatchSummary, elapsed_secs: f64) {
    let color = ansi_enabled();
    let ok = format!("{} succeeded", summary.succeeded);
    let retried = format!("{} after retry", summary.retried);
    let failed = format!("{} failed", summary.failed);
    if color {
        println!("{}, {}, {}", ok.green(), retried.yellow(), failed.red());
    } else {
        println!("{}, {}, {}", ok, retried, failed);
    }
    if elapsed_secs > 0.0 {
        let mb = summary.bytes as f64 / 1024.0 / 1024.0;
        println!(
            "Average rate: {:.2} MB/s ({} in {:.2}s)",
            mb / elapsed_secs,
            human_bytes(summary.bytes),
            elapsed_secs
        );
    }
    if summary.cancelled {
        println!("Cancelled before the listing was exhausted");
    }
    if !summary.failures.is_empty() {
        match failures_table(&summary.failures) {
            Ok(t) => println!("{}", t),
            Err(e) => tracing::warn!("[bulkfetch][util] cannot render failures table: {}", e),
        }
    }
}

/// Append one JSON object per failed object to `<dir>/failures.jsonl`.
/// Returns the file path when something was written.
pub fn write_failures_jsonl(
    dir: Option<&Path>,
    bucket: &str,
    failures: &[FailedObject],
) -> Option<PathBuf> {
    if failures.is_empty() {
        return None;
    }
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => crate::logging::default_log_dir()?,
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!("[bulkfetch][util] cannot create {}: {}", dir.display(), e);
        return None;
    }
    let path = dir.join(FAILURES_FILE_NAME);
    let mut f = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("[bulkfetch][util] cannot open {}: {}", path.display(), e);
            return None;
        }
    };
    let ts = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    for fo in failures {
        let obj = serde_json::json!({
            "ts": ts,
            "bucket": bucket,
            "key": fo.key,
            "attempts": fo.attempts,
            "transient": fo.transient,
            "error": fo.error,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(f, "{}", line);
        }
    }
    Some(path)
}

/// Single-line machine summary for `--json`.
pub fn summary_json(
    summary: &BatchSummary,
    elapsed_ms: u128,
    failures_path: Option<&Path>,
) -> serde_json::Value {
    serde_json::json!({
        "succeeded": summary.succeeded,
        "retried": summary.retried,
        "failed": summary.failed,
        "bytes": summary.bytes,
        "cancelled": summary.cancelled,
        "elapsed_ms": elapsed_ms as u64,
        "failures": summary.failures,
        "failures_path": failures_path.map(|p| p.to_string_lossy().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tmp_dir() -> PathBuf {
        let mut base = std::env::temp_dir();
        let uniq = format!(
            "bf_util_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        );
        base.push(uniq);
        std::fs::create_dir(&base).expect("create temp dir");
        base
    }

    fn failure(key: &str) -> FailedObject {
        FailedObject { key: key.into(), attempts: 3, error: "reset".into(), transient: true }
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MiB");
    }

    #[test]
    fn failures_are_appended_as_json_lines() {
        let dir = make_tmp_dir();
        let p = write_failures_jsonl(Some(dir.as_path()), "b", &[failure("x"), failure("y")]).unwrap();
        write_failures_jsonl(Some(dir.as_path()), "b", &[failure("z")]).unwrap();
        let content = std::fs::read_to_string(&p).unwrap();
        let lines: Vec<serde_json::Value> =
            content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "x");
        assert_eq!(lines[2]["bucket"], "b");
        assert_eq!(lines[2]["attempts"], 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nothing_written_without_failures() {
        let dir = make_tmp_dir();
        assert!(write_failures_jsonl(Some(dir.as_path()), "b", &[]).is_none());
        assert!(!dir.join(FAILURES_FILE_NAME).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn table_lists_keys_sorted() {
        let t = failures_table(&[failure("b/2"), failure("a/1")]).unwrap();
        let a = t.find("a/1").unwrap();
        let b = t.find("b/2").unwrap();
        assert!(a < b);
    }

    #[test]
    fn json_summary_fields() {
        let s = BatchSummary { succeeded: 2, failures: vec![failure("k")], failed: 1, ..Default::default() };
        let v = summary_json(&s, 42, None);
        assert_eq!(v["succeeded"], 2);
        assert_eq!(v["failed"], 1);
        assert_eq!(v["elapsed_ms"], 42);
        assert_eq!(v["failures"][0]["key"], "k");
        assert!(v["failures_path"].is_null());
    }
}
