use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::Config;
use crate::transfer::FetchOptions;
use crate::transfer::filter::KeyFilter;
use crate::transfer::retry::RetryPolicy;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(help = "Bucket to read from")]
    pub bucket: String,
    #[clap(help = "Key prefix to download (a leading '/' is ignored)")]
    pub prefix: String,
    #[clap(help = "Local directory the key tree is recreated under")]
    pub destination: PathBuf,

    #[clap(long, help = "Local directory or sftp://user@host[:port][/base] (default: config, then '.')")]
    pub store: Option<String>,
    #[clap(long = "config", help = "Config file (default ~/.bulkfetch/config.json)")]
    pub config: Option<PathBuf>,

    #[clap(short = 'c', long = "concurrency", help = "Number of concurrent workers (default 8, max 32)")]
    pub concurrency: Option<usize>,
    #[clap(short = 'r', long = "retries", help = "Total attempts per object (default 3)")]
    pub retries: Option<u32>,
    #[clap(long = "backoff-ms", help = "Linear backoff base between attempts (default 100)")]
    pub backoff_ms: Option<u64>,
    #[clap(long = "buf-kib", help = "Copy buffer size in KiB (default 1024)")]
    pub buf_kib: Option<usize>,

    #[clap(long, help = "Only fetch keys ending with this suffix")]
    pub suffix: Option<String>,
    #[clap(long = "match", value_name = "REGEX", help = "Only fetch keys matching this regex")]
    pub pattern: Option<String>,
    #[clap(long, help = "Stop after this many matching objects")]
    pub limit: Option<usize>,
    #[clap(long = "keep-dir-markers", help = "Also fetch keys ending in '/'")]
    pub keep_dir_markers: bool,

    #[clap(short, long, help = "Print each written file and debug logs to ~/.bulkfetch/logs")]
    pub verbose: bool,
    #[clap(long, help = "Print a single JSON summary line")]
    pub json: bool,
    #[clap(short, long, help = "Suppress progress and the summary")]
    pub quiet: bool,
}

impl Cli {
    /// Overlay the flags that were given onto `cfg`.
    pub fn apply_to(&self, mut cfg: Config) -> Config {
        if let Some(s) = &self.store {
            cfg.store = Some(s.clone());
        }
        if let Some(c) = self.concurrency {
            cfg.concurrency = c;
        }
        if let Some(r) = self.retries {
            cfg.max_attempts = r;
        }
        if let Some(b) = self.backoff_ms {
            cfg.backoff_ms = b;
        }
        if let Some(k) = self.buf_kib {
            cfg.buf_size = k.saturating_mul(1024);
        }
        cfg.validated()
    }

    pub fn store_spec(cfg: &Config) -> String {
        cfg.store.clone().unwrap_or_else(|| ".".to_string())
    }

    /// Build transfer options from the merged configuration and the filter flags.
    pub fn fetch_options(&self, cfg: &Config) -> Result<FetchOptions> {
        let mut filter = KeyFilter::default();
        if self.keep_dir_markers {
            filter = filter.keep_dir_markers();
        }
        if let Some(sfx) = &self.suffix {
            filter = filter.with_suffix(sfx.clone());
        }
        if let Some(p) = &self.pattern {
            filter = filter.with_pattern(p)?;
        }
        Ok(FetchOptions {
            concurrency: cfg.concurrency,
            retry: RetryPolicy::new(cfg.max_attempts, cfg.backoff_ms),
            filter,
            limit: self.limit,
            buf_size: cfg.buf_size,
            show_progress: !(self.quiet || self.json),
            echo_objects: self.verbose && !self.json,
            cancel: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "bulkfetch", "-c", "64", "-r", "5", "--buf-kib", "4", "--suffix", ".txt", "b", "/p", "out",
        ]);
        let cfg = cli.apply_to(Config { backoff_ms: 7, ..Config::default() });
        assert_eq!(cfg.concurrency, 32);
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.backoff_ms, 7);
        assert_eq!(cfg.buf_size, 4096);
        assert_eq!(Cli::store_spec(&cfg), ".");
        let opts = cli.fetch_options(&cfg).unwrap();
        assert_eq!(opts.retry, RetryPolicy::new(5, 7));
        assert!(opts.filter.accepts("p/a.txt"));
        assert!(!opts.filter.accepts("p/a.bin"));
        assert!(opts.show_progress);
    }

    #[test]
    fn huge_buffer_flag_is_capped() {
        let cli = Cli::parse_from(["bulkfetch", "--buf-kib", "18446744073709551615", "b", "p", "d"]);
        let cfg = cli.apply_to(Config::default());
        assert_eq!(cfg.buf_size, crate::transfer::MAX_BUF_SIZE);
    }

    #[test]
    fn three_positionals_required() {
        assert!(Cli::try_parse_from(["bulkfetch", "b", "p"]).is_err());
        assert!(Cli::try_parse_from(["bulkfetch", "b", "p", "d", "extra"]).is_err());
    }

    #[test]
    fn bad_regex_is_rejected() {
        let cli = Cli::parse_from(["bulkfetch", "--match", "(", "b", "p", "d"]);
        assert!(cli.fetch_options(&Config::default()).is_err());
    }
}
