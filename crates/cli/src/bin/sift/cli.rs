//! Argument parsing and result printing for the `sift` binary.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::workflow::SearchOutcome;

/// Command-line arguments accepted by the `sift` binary.
#[derive(Parser, Debug)]
#[command(
	name = "sift",
	version,
	about = "Rank lines of input against a fuzzy query"
)]
pub(crate) struct CliArgs {
	#[arg(
		short = 'q',
		long,
		value_name = "QUERY",
		default_value = "",
		help = "Query to rank items against; empty keeps input order"
	)]
	pub(crate) query: String,
	#[arg(value_name = "FILE", help = "Read items from a file instead of stdin")]
	pub(crate) input: Option<PathBuf>,
	#[arg(
		short = 'n',
		long,
		value_name = "NUM",
		help = "Print at most this many matches"
	)]
	pub(crate) limit: Option<usize>,
	#[arg(
		short = 'j',
		long,
		value_name = "NUM",
		help = "Number of scoring threads"
	)]
	pub(crate) threads: Option<usize>,
	#[arg(short = 's', long, help = "Prefix every match with its score")]
	pub(crate) show_scores: bool,
	#[arg(
		short = 'o',
		long,
		value_enum,
		default_value_t = OutputFormat::Plain,
		help = "Choose how to print the result"
	)]
	pub(crate) output: OutputFormat,
	#[arg(short = 'v', long, help = "Enable debug logging on stderr")]
	pub(crate) verbose: bool,
	#[arg(long, help = "Only log errors", conflicts_with = "verbose")]
	pub(crate) quiet: bool,
}

/// Output format for the ranked matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
	/// One matched line per output line.
	Plain,
	/// One JSON object per match.
	Json,
}

pub(crate) fn parse_cli() -> CliArgs {
	CliArgs::parse()
}

/// Print matches as plain lines, optionally prefixed with their score.
pub(crate) fn print_plain(outcome: &SearchOutcome) {
	let stdout = std::io::stdout();
	let mut out = stdout.lock();
	for row in &outcome.rows {
		let result = if outcome.show_scores {
			writeln!(out, "{:.3}\t{}", row.score, row.line)
		} else {
			writeln!(out, "{}", row.line)
		};
		if result.is_err() {
			// Broken pipe from a downstream `head` is normal; stop quietly.
			return;
		}
	}
}

#[derive(Serialize)]
struct JsonRow<'a> {
	line: &'a str,
	score: f32,
	index: u32,
}

/// Print matches as one JSON object per line.
pub(crate) fn print_json(outcome: &SearchOutcome) -> Result<()> {
	let stdout = std::io::stdout();
	let mut out = stdout.lock();
	for row in &outcome.rows {
		let json = serde_json::to_string(&JsonRow {
			line: &row.line,
			score: row.score,
			index: row.index,
		})?;
		if writeln!(out, "{json}").is_err() {
			return Ok(());
		}
	}
	Ok(())
}
