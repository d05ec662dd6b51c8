//! Engine tuning knobs with conservative defaults.

use std::thread;

/// Upper bound on the default worker count; more scoring threads than this
/// rarely help an interactive finder and mostly add merge overhead.
const DEFAULT_WORKER_CAP: usize = 8;

/// Default number of items a worker scores between two cancel-flag checks.
const DEFAULT_CANCEL_CHECK: u32 = 512;

/// Configuration accepted by [`Engine::new`](crate::Engine::new).
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
	/// Number of scoring worker threads. `None` selects
	/// `min(available_parallelism, 8)`.
	pub threads: Option<usize>,
	/// Items a worker scores between two cancel-flag checks. `None` selects
	/// 512; smaller values abandon stale passes sooner at some scoring
	/// overhead.
	pub cancel_check: Option<u32>,
}

impl EngineConfig {
	/// Resolve the worker thread count this configuration asks for.
	#[must_use]
	pub fn worker_threads(&self) -> usize {
		match self.threads {
			Some(threads) => threads.max(1),
			None => thread::available_parallelism()
				.map(|n| n.get())
				.unwrap_or(1)
				.min(DEFAULT_WORKER_CAP),
		}
	}

	/// Resolve the cancel-check interval this configuration asks for.
	#[must_use]
	pub fn cancel_check_interval(&self) -> u32 {
		self.cancel_check.unwrap_or(DEFAULT_CANCEL_CHECK).max(1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_thread_count_is_respected() {
		let config = EngineConfig {
			threads: Some(3),
			..EngineConfig::default()
		};
		assert_eq!(config.worker_threads(), 3);
	}

	#[test]
	fn zero_threads_is_clamped_to_one() {
		let config = EngineConfig {
			threads: Some(0),
			..EngineConfig::default()
		};
		assert_eq!(config.worker_threads(), 1);
	}

	#[test]
	fn default_stays_within_the_cap() {
		let config = EngineConfig::default();
		let threads = config.worker_threads();
		assert!(threads >= 1);
		assert!(threads <= DEFAULT_WORKER_CAP);
	}

	#[test]
	fn cancel_check_defaults_to_a_few_hundred_items() {
		assert_eq!(EngineConfig::default().cancel_check_interval(), 512);
	}

	#[test]
	fn cancel_check_is_overridable_but_never_zero() {
		let config = EngineConfig {
			cancel_check: Some(64),
			..EngineConfig::default()
		};
		assert_eq!(config.cancel_check_interval(), 64);

		let config = EngineConfig {
			cancel_check: Some(0),
			..EngineConfig::default()
		};
		assert_eq!(config.cancel_check_interval(), 1);
	}
}
