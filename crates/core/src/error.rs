use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Errors reported while appending items to the store.
///
/// A failed push leaves the store exactly as it was: the staged size does not
/// advance and previously committed items are unaffected.
#[derive(Debug, Error)]
pub enum PushError {
	/// The item is longer than a single arena chunk can hold.
	#[error("item of {len} bytes exceeds the {max} byte limit")]
	ItemTooLong { len: usize, max: usize },

	/// The 32-bit item index space is exhausted.
	#[error("item store is full ({max} items)")]
	TooManyItems { max: u32 },

	/// The chunk directory is exhausted; the arena cannot grow further.
	#[error("item arena is out of address space")]
	ArenaFull,

	/// The allocator refused to grow the arena.
	#[error("failed to allocate item storage")]
	OutOfMemory,
}

impl From<TryReserveError> for PushError {
	fn from(_: TryReserveError) -> Self {
		PushError::OutOfMemory
	}
}

/// Errors reported while constructing an engine.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The wake-up notifier could not be created.
	#[error("failed to create wake-up notifier")]
	Notify(#[source] io::Error),
}
