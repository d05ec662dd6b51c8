//! Tracing subscriber setup for the `sift` binary.
//!
//! Filter priority: `SIFT_LOG` env var, then `RUST_LOG`, then the CLI flags
//! (`-v` for debug, `--quiet` for errors only). Logs go to stderr so they
//! never mix with the ranked output on stdout.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub(crate) fn init(verbose: bool, quiet: bool) {
	let level = if verbose {
		Level::DEBUG
	} else if quiet {
		Level::ERROR
	} else {
		Level::WARN
	};

	let filter = std::env::var("SIFT_LOG")
		.ok()
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.or_else(|| EnvFilter::try_from_default_env().ok())
		.unwrap_or_else(|| EnvFilter::new(level.as_str()));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr).without_time().compact())
		.init();
}
