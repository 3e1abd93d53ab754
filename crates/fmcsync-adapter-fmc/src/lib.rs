//! fmc rest adapter for fmcsync.

mod fmc;

pub use fmc::{FmcConfig, FmcStore, RetryPolicy};
