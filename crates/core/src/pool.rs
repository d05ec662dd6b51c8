//! Fixed pool of scoring workers.
//!
//! Workers park on a per-worker condition variable between passes. A pass
//! hands every worker a contiguous shard of the committed index range; each
//! worker scores its shard into a private scratch vector, sorts it and
//! publishes it to its output slot. The worker that brings the outstanding
//! counter to zero posts a pass-done event so the coordinator can merge.
//!
//! Cancellation is cooperative: workers re-check the pass's cancel flag at
//! the pass's check interval (a few hundred items, see
//! [`EngineConfig::cancel_check_interval`](crate::EngineConfig::cancel_check_interval))
//! and abandon the shard without sorting or publishing when it is set.
//! Scratch vectors survive across passes, so steady-state scoring does not
//! allocate.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::engine::Core;
use crate::events::Events;
use crate::results::{Match, rank_cmp};
use crate::score::{SCORE_MIN, Scorer};

/// Shared state of one scoring pass.
pub(crate) struct Pass {
	/// Committed size the pass covers; shards partition `0..items_tick`.
	pub(crate) items_tick: u64,
	/// Query version the pass scores against.
	pub(crate) query_tick: u64,
	pub(crate) query: String,
	/// Items a worker scores between two cancel-flag checks. Always at
	/// least one.
	check_interval: u32,
	cancelled: AtomicBool,
	outstanding: AtomicUsize,
}

impl Pass {
	pub(crate) fn new(
		items_tick: u64,
		query: String,
		query_tick: u64,
		workers: usize,
		check_interval: u32,
	) -> Self {
		Pass {
			items_tick,
			query_tick,
			query,
			check_interval: check_interval.max(1),
			cancelled: AtomicBool::new(false),
			outstanding: AtomicUsize::new(workers),
		}
	}

	/// Mark the pass stale. Workers notice at their next check and the pass
	/// retires without publishing.
	pub(crate) fn cancel(&self) {
		self.cancelled.store(true, Ordering::Release);
	}

	pub(crate) fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}

	pub(crate) fn is_retired(&self) -> bool {
		self.outstanding.load(Ordering::Acquire) == 0
	}
}

enum Job {
	Run { pass: Arc<Pass>, start: u32, end: u32 },
	Shutdown,
}

struct Slot {
	job: Mutex<Option<Job>>,
	cv: Condvar,
	output: Mutex<Vec<Match>>,
}

/// Handles to the worker threads, owned by the coordinator.
pub(crate) struct WorkerPool {
	slots: Vec<Arc<Slot>>,
	handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	pub(crate) fn spawn(count: usize, core: &Arc<Core>) -> Self {
		let count = count.max(1);
		let mut slots = Vec::with_capacity(count);
		let mut handles = Vec::with_capacity(count);
		for idx in 0..count {
			let slot = Arc::new(Slot {
				job: Mutex::new(None),
				cv: Condvar::new(),
				output: Mutex::new(Vec::new()),
			});
			let worker_core = Arc::clone(core);
			let worker_slot = Arc::clone(&slot);
			let handle = thread::Builder::new()
				.name(format!("sift-worker-{idx}"))
				.spawn(move || worker_loop(idx, &worker_core, &worker_slot))
				.expect("failed to spawn scoring worker");
			slots.push(slot);
			handles.push(handle);
		}
		debug!(workers = count, "scoring pool started");
		WorkerPool { slots, handles }
	}

	pub(crate) fn len(&self) -> usize {
		self.slots.len()
	}

	/// Fan a pass out to every worker as roughly equal contiguous shards.
	pub(crate) fn dispatch(&self, pass: &Arc<Pass>) {
		debug_assert!(pass.items_tick <= u64::from(u32::MAX));
		let total = pass.items_tick;
		let count = self.slots.len() as u64;
		for (idx, slot) in self.slots.iter().enumerate() {
			let start = (total * idx as u64 / count) as u32;
			let end = (total * (idx as u64 + 1) / count) as u32;
			let mut job = slot.job.lock().unwrap_or_else(PoisonError::into_inner);
			*job = Some(Job::Run {
				pass: Arc::clone(pass),
				start,
				end,
			});
			drop(job);
			slot.cv.notify_one();
		}
	}

	/// Borrow every worker's published shard at once.
	///
	/// Only meaningful after the pass retired; the workers are parked then,
	/// so the locks are uncontended.
	pub(crate) fn with_outputs<R>(&self, f: impl FnOnce(&[&[Match]]) -> R) -> R {
		let guards: Vec<_> = self
			.slots
			.iter()
			.map(|slot| slot.output.lock().unwrap_or_else(PoisonError::into_inner))
			.collect();
		let shards: Vec<&[Match]> = guards.iter().map(|guard| guard.as_slice()).collect();
		f(&shards)
	}

	/// Ask every worker to exit and join them.
	pub(crate) fn shutdown(mut self) {
		for slot in &self.slots {
			let mut job = slot.job.lock().unwrap_or_else(PoisonError::into_inner);
			*job = Some(Job::Shutdown);
			drop(job);
			slot.cv.notify_one();
		}
		for handle in self.handles.drain(..) {
			let _ = handle.join();
		}
		debug!("scoring pool stopped");
	}
}

fn worker_loop(idx: usize, core: &Arc<Core>, slot: &Slot) {
	let mut scorer = Scorer::new();
	loop {
		match next_job(slot) {
			Job::Shutdown => break,
			Job::Run { pass, start, end } => {
				let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
					run_shard(core, slot, &pass, start, end, &mut scorer);
				}));
				if outcome.is_err() {
					pass.cancel();
					core.note_worker_failure();
					warn!(worker = idx, "scoring worker panicked; pass abandoned");
				}
				if pass.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
					core.events.post(Events::PASS_DONE);
				}
			}
		}
	}
}

fn next_job(slot: &Slot) -> Job {
	let mut job = slot.job.lock().unwrap_or_else(PoisonError::into_inner);
	loop {
		if let Some(job) = job.take() {
			return job;
		}
		job = slot.cv.wait(job).unwrap_or_else(PoisonError::into_inner);
	}
}

fn run_shard(core: &Core, slot: &Slot, pass: &Pass, start: u32, end: u32, scorer: &mut Scorer) {
	let mut scratch =
		std::mem::take(&mut *slot.output.lock().unwrap_or_else(PoisonError::into_inner));
	scratch.clear();

	let query = pass.query.as_bytes();
	let mut until_check = pass.check_interval;
	let mut cancelled = false;
	let mut index = start;
	for item in core.items.range(start, end) {
		until_check -= 1;
		if until_check == 0 {
			if pass.is_cancelled() {
				cancelled = true;
				break;
			}
			until_check = pass.check_interval;
		}
		let score = scorer.score(query, item);
		if score > SCORE_MIN {
			scratch.push(Match { index, score });
		}
		index += 1;
	}

	if cancelled || pass.is_cancelled() {
		scratch.clear();
	} else {
		scratch.sort_unstable_by(rank_cmp);
	}
	*slot.output.lock().unwrap_or_else(PoisonError::into_inner) = scratch;
}
