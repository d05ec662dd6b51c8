//! sift-core: a concurrent fuzzy matching engine for interactive finders.
//!
//! The engine ingests an unbounded stream of byte-string items while the
//! query changes underneath it, ranks the committed items against the
//! current query on a pool of scoring workers, and publishes immutable
//! result snapshots a single-threaded reader polls without blocking. Stale
//! work is cancelled cooperatively and superseded rather than awaited, so
//! the visible ranking stays fresh even with millions of items in flight.
//!
//! ```no_run
//! use sift_core::{Engine, EngineConfig};
//!
//! let (mut engine, mut feeder) = Engine::new(EngineConfig::default())?;
//! engine.start();
//!
//! feeder.push(b"src/main.rs")?;
//! feeder.push(b"README.md")?;
//! feeder.commit();
//! engine.set_query("rm");
//!
//! // Poll `engine.notify_handle()`, then:
//! if engine.load_results() {
//! 	for i in 0..engine.results_len() {
//! 		let row = engine.result_at(i).unwrap();
//! 		println!("{} {}", row.score, String::from_utf8_lossy(row.line));
//! 	}
//! }
//! engine.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod scan;
pub mod score;

mod events;
mod items;
mod merge;
mod pool;
mod results;
mod tx;
mod wake;

pub use config::EngineConfig;
pub use engine::{Engine, ItemFeeder, ResultRow};
pub use error::{EngineError, PushError};
pub use results::{Match, Results};
pub use scan::LineScanner;
pub use score::{Scorer, match_positions};
