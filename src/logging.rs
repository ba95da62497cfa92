//! Log output for the `lh` binary.
//!
//! Logs go to stderr so command results on stdout stay machine-readable.
//! The level defaults to `info` and is overridden by `RUST_LOG`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (e.g. from tests sharing a process) is a no-op.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
