//! Drives one engine pass to completion over a byte stream.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail, ensure};
use sift_core::{Engine, EngineConfig};
use tracing::debug;

use crate::cli::CliArgs;

/// Read chunk size; grows nothing, the scanner copies only partial lines.
const READ_CHUNK: usize = 64 * 1024;

/// How long a batch run may take before it is treated as wedged.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolved configuration for one batch run.
#[derive(Debug)]
pub(crate) struct Config {
	pub(crate) query: String,
	pub(crate) input: Option<PathBuf>,
	pub(crate) limit: Option<usize>,
	pub(crate) show_scores: bool,
	pub(crate) engine: EngineConfig,
}

impl Config {
	/// Build configuration from CLI arguments with sensible defaults.
	pub(crate) fn from_cli(args: &CliArgs) -> Result<Self> {
		if let Some(threads) = args.threads {
			ensure!(threads > 0, "threads must be greater than zero");
		}
		Ok(Config {
			query: args.query.clone(),
			input: args.input.clone(),
			limit: args.limit,
			show_scores: args.show_scores,
			engine: EngineConfig {
				threads: args.threads,
				..EngineConfig::default()
			},
		})
	}
}

/// One printable match.
pub(crate) struct OutcomeRow {
	pub(crate) line: String,
	pub(crate) score: f32,
	pub(crate) index: u32,
}

/// Ranked matches plus the context the printer needs.
pub(crate) struct SearchOutcome {
	pub(crate) rows: Vec<OutcomeRow>,
	pub(crate) query: String,
	pub(crate) show_scores: bool,
	pub(crate) total_items: u64,
}

/// Feed the whole input into an engine, wait for the final snapshot and
/// collect the ranked matches.
pub(crate) fn run_filter(config: Config) -> Result<SearchOutcome> {
	let (mut engine, mut feeder) = Engine::new(config.engine)?;
	engine.start();
	engine.set_query(config.query.clone());

	let mut reader: Box<dyn Read> = match &config.input {
		Some(path) => Box::new(
			File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
		),
		None => Box::new(io::stdin().lock()),
	};

	let mut buf = vec![0u8; READ_CHUNK];
	loop {
		let n = reader.read(&mut buf).context("failed to read input")?;
		if n == 0 {
			break;
		}
		if feeder.scan_feed(&buf[..n]).context("failed to stage items")? > 0 {
			feeder.commit();
		}
	}
	if feeder.scan_end().context("failed to stage items")? {
		feeder.commit();
	}
	// Make the final committed size visible even when the input produced no
	// trailing item (or no items at all).
	feeder.commit();
	debug!(items = engine.items_len(), "input exhausted");

	wait_settled(&mut engine)?;

	let shown = config.limit.unwrap_or(usize::MAX).min(engine.results_len());
	let mut rows = Vec::with_capacity(shown);
	for i in 0..shown {
		let Some(row) = engine.result_at(i) else {
			break;
		};
		rows.push(OutcomeRow {
			line: String::from_utf8_lossy(row.line).into_owned(),
			score: row.score,
			index: row.index,
		});
	}
	let total_items = engine.items_len();
	engine.stop();

	Ok(SearchOutcome {
		rows,
		query: config.query,
		show_scores: config.show_scores,
		total_items,
	})
}

/// Poll until the snapshot reflects the final item set and query.
fn wait_settled(engine: &mut Engine) -> Result<()> {
	let deadline = Instant::now() + SETTLE_TIMEOUT;
	loop {
		engine.load_results();
		if !engine.processing() {
			return Ok(());
		}
		if Instant::now() >= deadline {
			bail!("matching did not settle within {SETTLE_TIMEOUT:?}");
		}
		thread::sleep(Duration::from_micros(500));
	}
}
