//! Command-line entry point for the sift batch filter.

use std::process::ExitCode;

use anyhow::Result;
use cli::{OutputFormat, parse_cli, print_json, print_plain};
use workflow::{Config, run_filter};

mod cli;
mod trace;
mod workflow;

/// Entry point for the `sift` command-line application.
fn main() -> Result<ExitCode> {
	let args = parse_cli();
	trace::init(args.verbose, args.quiet);

	let config = Config::from_cli(&args)?;
	let outcome = run_filter(config)?;
	tracing::debug!(
		items = outcome.total_items,
		matches = outcome.rows.len(),
		"filter complete"
	);

	match args.output {
		OutputFormat::Plain => print_plain(&outcome),
		OutputFormat::Json => print_json(&outcome)?,
	}

	// Mirror common filter tools: signal "nothing matched" through the exit
	// status so scripts can branch on it.
	if outcome.rows.is_empty() && !outcome.query.is_empty() {
		return Ok(ExitCode::FAILURE);
	}
	Ok(ExitCode::SUCCESS)
}
