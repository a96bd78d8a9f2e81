pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod parse;
pub mod store;
pub mod transfer;
pub mod util;

pub use error::{FetchError, KeyPathError, MkdirError, StoreError, StoreErrorKind};
pub use store::{ObjectStore, open_store};
pub use transfer::outcome::{BatchSummary, TransferOutcome};
pub use transfer::{FetchOptions, FetchRequest, download_prefix};
