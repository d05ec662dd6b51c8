//! Event set the coordinator thread sleeps on.
//!
//! Posters OR bits into an atomic mask; the waiter swaps the mask out and
//! handles every bit it received in one go. Posting takes the park mutex for
//! an empty critical section so a post between the waiter's re-check and its
//! sleep cannot be lost.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

pub(crate) struct Events {
	flags: AtomicU32,
	lock: Mutex<()>,
	cv: Condvar,
}

impl Events {
	/// The producer committed more items.
	pub(crate) const COMMIT: u32 = 1 << 0;
	/// A new query was published.
	pub(crate) const QUERY: u32 = 1 << 1;
	/// Shutdown was requested.
	pub(crate) const STOP: u32 = 1 << 2;
	/// The last worker of the in-flight pass retired it.
	pub(crate) const PASS_DONE: u32 = 1 << 3;

	pub(crate) fn new() -> Self {
		Events {
			flags: AtomicU32::new(0),
			lock: Mutex::new(()),
			cv: Condvar::new(),
		}
	}

	/// Post one or more event bits and wake the waiter.
	pub(crate) fn post(&self, bits: u32) {
		self.flags.fetch_or(bits, Ordering::AcqRel);
		drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
		self.cv.notify_one();
	}

	/// Block until at least one event is pending, then take them all.
	pub(crate) fn wait(&self) -> u32 {
		loop {
			let bits = self.flags.swap(0, Ordering::AcqRel);
			if bits != 0 {
				return bits;
			}
			let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
			if self.flags.load(Ordering::Acquire) == 0 {
				drop(self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn posted_bits_accumulate_until_taken() {
		let events = Events::new();
		events.post(Events::COMMIT);
		events.post(Events::QUERY);
		assert_eq!(events.wait(), Events::COMMIT | Events::QUERY);
	}

	#[test]
	fn wait_takes_the_bits_exactly_once() {
		let events = Events::new();
		events.post(Events::STOP);
		assert_eq!(events.wait(), Events::STOP);
		events.post(Events::COMMIT);
		assert_eq!(events.wait(), Events::COMMIT);
	}

	#[test]
	fn a_sleeping_waiter_is_woken_by_a_post() {
		let events = Arc::new(Events::new());
		let poster = Arc::clone(&events);
		let handle = thread::spawn(move || {
			thread::sleep(Duration::from_millis(20));
			poster.post(Events::QUERY);
		});
		assert_eq!(events.wait(), Events::QUERY);
		handle.join().unwrap();
	}
}
