//! Engine lifecycle, coordinator event loop and the producer/reader surfaces.
//!
//! [`Engine::new`] returns the engine together with its single [`ItemFeeder`]
//! so the one-producer discipline is enforced by ownership: the feeder moves
//! to whatever thread streams items in, while the engine stays with the
//! reader that polls results and edits the query. A dedicated coordinator
//! thread reacts to commit/query events, fans scoring passes out to the
//! worker pool, cancels work the moment it goes stale and publishes merged
//! snapshots through the wake-up notifier.

use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, PushError};
use crate::events::Events;
use crate::items::ItemList;
use crate::merge::merge_shards;
use crate::pool::{Pass, WorkerPool};
use crate::results::{Match, Results};
use crate::scan::LineScanner;
use crate::tx::TxValue;
use crate::wake::Notify;

/// State shared by the engine surfaces, the coordinator and the workers.
pub(crate) struct Core {
	pub(crate) items: ItemList,
	pub(crate) query: TxValue<String>,
	pub(crate) results: TxValue<Results>,
	pub(crate) events: Events,
	pub(crate) wake: Notify,
	worker_failures: AtomicU64,
}

impl Core {
	pub(crate) fn note_worker_failure(&self) {
		self.worker_failures.fetch_add(1, Ordering::Relaxed);
	}
}

/// One row of the reader-visible snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ResultRow<'a> {
	/// The matched item's bytes.
	pub line: &'a [u8],
	/// Score the snapshot's query gave the item.
	pub score: f32,
	/// Stable index the item was pushed at.
	pub index: u32,
}

/// The matching engine.
///
/// Owned by the reader thread; the query and reader surfaces live here while
/// item ingestion goes through the [`ItemFeeder`] handed out at construction.
/// Multiple engines may coexist; nothing is process-global.
pub struct Engine {
	core: Arc<Core>,
	config: EngineConfig,
	coordinator: Option<JoinHandle<()>>,
	read: Box<Results>,
	query_buf: Box<String>,
}

impl Engine {
	/// Create an engine and its producer handle.
	pub fn new(config: EngineConfig) -> Result<(Engine, ItemFeeder), EngineError> {
		let core = Arc::new(Core {
			items: ItemList::new(),
			query: TxValue::new(),
			results: TxValue::new(),
			events: Events::new(),
			wake: Notify::new().map_err(EngineError::Notify)?,
			worker_failures: AtomicU64::new(0),
		});
		let feeder = ItemFeeder {
			core: Arc::clone(&core),
			scanner: LineScanner::new(),
		};
		let engine = Engine {
			core,
			config,
			coordinator: None,
			read: Box::default(),
			query_buf: Box::default(),
		};
		Ok((engine, feeder))
	}

	/// Start the coordinator and worker threads. Idempotent.
	pub fn start(&mut self) {
		if self.coordinator.is_some() {
			return;
		}
		let core = Arc::clone(&self.core);
		let workers = self.config.worker_threads();
		let cancel_check = self.config.cancel_check_interval();
		let handle = thread::Builder::new()
			.name("sift-coordinator".into())
			.spawn(move || Coordinator::new(core, workers, cancel_check).run())
			.expect("failed to spawn coordinator thread");
		self.coordinator = Some(handle);
	}

	/// Stop and join all engine threads. Idempotent; fires one final wake-up
	/// so a reader blocked on [`notify_handle`](Self::notify_handle) returns.
	pub fn stop(&mut self) {
		if let Some(handle) = self.coordinator.take() {
			self.core.events.post(Events::STOP);
			let _ = handle.join();
		}
	}

	/// Replace the current query. Cheap; the coordinator cancels and restarts
	/// any in-flight pass on its own schedule.
	pub fn set_query(&mut self, query: impl Into<String>) {
		*self.query_buf = query.into();
		self.core.query.publish(&mut self.query_buf);
		self.core.events.post(Events::QUERY);
	}

	/// Pollable descriptor that becomes readable when new results exist.
	#[must_use]
	pub fn notify_handle(&self) -> BorrowedFd<'_> {
		self.core.wake.as_fd()
	}

	/// Swap in the latest published snapshot, draining the wake-up.
	///
	/// Returns whether the visible snapshot changed. Non-blocking.
	pub fn load_results(&mut self) -> bool {
		self.core.wake.drain();
		self.core.results.load(&mut self.read).is_some()
	}

	#[must_use]
	pub fn results_len(&self) -> usize {
		self.read.matches.len()
	}

	/// Row `i` of the visible snapshot.
	#[must_use]
	pub fn result_at(&self, i: usize) -> Option<ResultRow<'_>> {
		let entry = self.read.matches.get(i)?;
		Some(ResultRow {
			line: self.core.items.at(entry.index),
			score: entry.score,
			index: entry.index,
		})
	}

	/// Whether the visible snapshot lags the live item store or query.
	#[must_use]
	pub fn processing(&self) -> bool {
		self.read.items_tick != self.core.items.size()
			|| self.read.query_tick != self.core.query.write_tick()
	}

	/// Committed item count.
	#[must_use]
	pub fn items_len(&self) -> u64 {
		self.core.items.size()
	}

	/// Committed item `index`, if it exists yet.
	#[must_use]
	pub fn item_at(&self, index: u32) -> Option<&[u8]> {
		(u64::from(index) < self.core.items.size()).then(|| self.core.items.at(index))
	}

	/// Query string the visible snapshot was ranked against; pair it with
	/// [`match_positions`](crate::score::match_positions) for highlighting.
	#[must_use]
	pub fn snapshot_query(&self) -> &str {
		&self.read.query
	}

	/// Committed size the visible snapshot covers.
	#[must_use]
	pub fn snapshot_items_tick(&self) -> u64 {
		self.read.items_tick
	}

	/// Query version the visible snapshot was ranked against.
	#[must_use]
	pub fn snapshot_query_tick(&self) -> u64 {
		self.read.query_tick
	}
}

impl Drop for Engine {
	fn drop(&mut self) {
		self.stop();
	}
}

/// The producer surface: pushes items, commits them, and optionally scans
/// raw byte chunks into line items.
///
/// Exactly one feeder exists per engine and it is deliberately not `Clone`;
/// move it to the thread that produces items.
pub struct ItemFeeder {
	core: Arc<Core>,
	scanner: LineScanner,
}

impl ItemFeeder {
	/// Append one item to the staging area. Not visible to readers until
	/// [`commit`](Self::commit).
	pub fn push(&mut self, bytes: &[u8]) -> Result<(), PushError> {
		// SAFETY: this feeder is the engine's only producer handle and push
		// requires `&mut self`, so producer calls are serialised.
		unsafe { self.core.items.push(bytes) }
	}

	/// Publish all staged items and wake the coordinator.
	pub fn commit(&mut self) {
		// SAFETY: as in `push`.
		unsafe { self.core.items.commit() };
		self.core.events.post(Events::COMMIT);
	}

	/// Feed raw bytes through the line scanner, pushing each complete line
	/// as one item. Returns the number of items produced.
	pub fn scan_feed(&mut self, chunk: &[u8]) -> Result<u32, PushError> {
		let ItemFeeder { core, scanner } = self;
		// SAFETY: as in `push`.
		scanner.feed(chunk, &mut |line| unsafe { core.items.push(line) })
	}

	/// Flush a trailing unterminated line as one final item. Returns whether
	/// an item was produced.
	pub fn scan_end(&mut self) -> Result<bool, PushError> {
		let ItemFeeder { core, scanner } = self;
		// SAFETY: as in `push`.
		scanner.finalize(&mut |line| unsafe { core.items.push(line) })
	}

	/// Staged item count, including items not yet committed.
	#[must_use]
	pub fn len(&self) -> u64 {
		// SAFETY: producer-only read; aliasing with `push`/`commit` is ruled
		// out by their `&mut self` receivers.
		unsafe { self.core.items.staged_len() }
	}

	/// Item count published by the most recent [`commit`](Self::commit).
	#[must_use]
	pub fn committed_len(&self) -> u64 {
		self.core.items.last_commit_size()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// The dedicated event-loop thread.
struct Coordinator {
	core: Arc<Core>,
	pool: WorkerPool,
	write: Box<Results>,
	query: Box<String>,
	query_tick: u64,
	cancel_check: u32,
	in_flight: Option<Arc<Pass>>,
	/// `(items_tick, query_tick)` of the most recent publish.
	published: (u64, u64),
}

impl Coordinator {
	fn new(core: Arc<Core>, workers: usize, cancel_check: u32) -> Self {
		let pool = WorkerPool::spawn(workers, &core);
		Coordinator {
			core,
			pool,
			write: Box::default(),
			query: Box::default(),
			query_tick: 0,
			cancel_check,
			in_flight: None,
			published: (0, 0),
		}
	}

	fn run(mut self) {
		debug!("coordinator running");
		loop {
			let bits = self.core.events.wait();
			if bits & Events::STOP != 0 {
				break;
			}
			if bits & Events::QUERY != 0
				&& let Some(tick) = self.core.query.load(&mut self.query)
			{
				self.query_tick = tick;
				trace!(tick, query = %self.query, "query updated");
			}
			if bits & Events::PASS_DONE != 0 {
				self.retire();
			}
			self.reconcile();
		}

		if let Some(pass) = self.in_flight.take() {
			pass.cancel();
		}
		self.pool.shutdown();
		// One last wake-up so a reader blocked on the notify handle gets out
		// of its poll and can observe the shutdown.
		self.core.wake.fire();
		debug!("coordinator stopped");
	}

	/// Compare the live `(items, query)` state against the in-flight pass or
	/// the last publish and either cancel stale work or start the next pass.
	fn reconcile(&mut self) {
		let items_tick = self.core.items.size();
		if let Some(pass) = &self.in_flight {
			let stale = self.query_tick > pass.query_tick || items_tick > pass.items_tick;
			if stale && !pass.is_cancelled() {
				debug!(
					items = pass.items_tick,
					query_tick = pass.query_tick,
					"cancelling stale pass"
				);
				pass.cancel();
			}
			return;
		}

		if (items_tick, self.query_tick) == self.published {
			return;
		}
		if self.query.is_empty() {
			self.publish_identity(items_tick);
		} else if items_tick > 0 {
			self.start_pass(items_tick);
		} else {
			// Nothing to score yet. Publish the empty result set for this
			// query version so the reader does not look in-flight forever;
			// the first commit starts a real pass.
			self.publish_empty();
		}
	}

	fn start_pass(&mut self, items_tick: u64) {
		let pass = Arc::new(Pass::new(
			items_tick,
			(*self.query).clone(),
			self.query_tick,
			self.pool.len(),
			self.cancel_check,
		));
		debug!(items = items_tick, query_tick = self.query_tick, "pass started");
		self.pool.dispatch(&pass);
		self.in_flight = Some(pass);
	}

	/// Handle a finished pass: merge and publish it, or drop it if it was
	/// cancelled.
	fn retire(&mut self) {
		let Some(pass) = self.in_flight.take() else {
			return;
		};
		debug_assert!(pass.is_retired());
		if pass.is_cancelled() {
			trace!("cancelled pass retired");
			return;
		}

		let write = &mut self.write;
		let pool = &self.pool;
		let merged = pool.with_outputs(|shards| merge_shards(shards, &mut write.matches));
		if merged.is_err() {
			self.core.note_worker_failure();
			warn!("snapshot allocation failed; pass dropped");
			return;
		}
		write.items_tick = pass.items_tick;
		write.query_tick = pass.query_tick;
		write.query.clone_from(&pass.query);
		self.publish(pass.items_tick, pass.query_tick);
	}

	/// Empty-query shortcut: all items in input order, score zero, no
	/// workers involved.
	fn publish_identity(&mut self, items_tick: u64) {
		let write = &mut self.write;
		write.matches.clear();
		if write.matches.try_reserve(items_tick as usize).is_err() {
			self.core.note_worker_failure();
			warn!("snapshot allocation failed; identity ranking dropped");
			return;
		}
		write
			.matches
			.extend((0..items_tick as u32).map(|index| Match { index, score: 0.0 }));
		write.items_tick = items_tick;
		write.query_tick = self.query_tick;
		write.query.clear();
		self.publish(items_tick, self.query_tick);
	}

	/// Empty snapshot for a query that has no committed items to run over.
	fn publish_empty(&mut self) {
		let write = &mut self.write;
		write.matches.clear();
		write.items_tick = 0;
		write.query_tick = self.query_tick;
		write.query.clone_from(&self.query);
		self.publish(0, self.query_tick);
	}

	fn publish(&mut self, items_tick: u64, query_tick: u64) {
		let results = self.write.matches.len();
		self.core.results.publish(&mut self.write);
		self.core.wake.fire();
		self.published = (items_tick, query_tick);
		debug!(items = items_tick, query_tick, results, "snapshot published");
	}
}
