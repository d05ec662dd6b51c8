//! Versioned single-writer/single-reader value hand-off.
//!
//! A [`TxValue`] is the middle slot of a three-buffer swap chain: the writer
//! owns a buffer it fills at leisure, [`publish`](TxValue::publish) swaps it
//! into the slot under a short lock, and the reader swaps the slot with its
//! own buffer in [`load`](TxValue::load) when the slot holds something it has
//! not seen yet. Neither side ever blocks on the other, the critical section
//! is a pointer swap, and buffers rotate instead of being reallocated.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

struct Slot<T> {
	value: Box<T>,
	fresh: bool,
	tick: u64,
}

/// Shared slot carrying the latest published value plus its write tick.
pub(crate) struct TxValue<T> {
	slot: Mutex<Slot<T>>,
	tick: AtomicU64,
}

impl<T: Default> TxValue<T> {
	pub(crate) fn new() -> Self {
		TxValue {
			slot: Mutex::new(Slot {
				value: Box::new(T::default()),
				fresh: false,
				tick: 0,
			}),
			tick: AtomicU64::new(0),
		}
	}
}

impl<T> TxValue<T> {
	/// Swap the writer's buffer into the slot and return the new write tick.
	///
	/// The buffer handed back to the writer is the previous slot occupant and
	/// may be reused for the next publish.
	pub(crate) fn publish(&self, value: &mut Box<T>) -> u64 {
		let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
		mem::swap(&mut slot.value, value);
		slot.fresh = true;
		slot.tick += 1;
		let tick = slot.tick;
		self.tick.store(tick, Ordering::Release);
		tick
	}

	/// Swap the slot into the reader's buffer if it holds an unseen value.
	///
	/// Returns the write tick of the value on success, `None` when nothing
	/// new was published since the last load.
	pub(crate) fn load(&self, into: &mut Box<T>) -> Option<u64> {
		let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
		if !slot.fresh {
			return None;
		}
		mem::swap(&mut slot.value, into);
		slot.fresh = false;
		Some(slot.tick)
	}

	/// Tick of the most recent publish.
	pub(crate) fn write_tick(&self) -> u64 {
		self.tick.load(Ordering::Acquire)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_returns_nothing_until_published() {
		let tx: TxValue<String> = TxValue::new();
		let mut read = Box::new(String::new());
		assert_eq!(tx.load(&mut read), None);
		assert_eq!(tx.write_tick(), 0);
	}

	#[test]
	fn publish_then_load_hands_over_the_value() {
		let tx: TxValue<String> = TxValue::new();
		let mut write = Box::new(String::from("hello"));
		assert_eq!(tx.publish(&mut write), 1);

		let mut read = Box::new(String::new());
		assert_eq!(tx.load(&mut read), Some(1));
		assert_eq!(read.as_str(), "hello");
		// A second load sees nothing new.
		assert_eq!(tx.load(&mut read), None);
	}

	#[test]
	fn later_publish_supersedes_an_unread_one() {
		let tx: TxValue<String> = TxValue::new();
		let mut write = Box::new(String::from("first"));
		tx.publish(&mut write);
		*write = String::from("second");
		tx.publish(&mut write);

		let mut read = Box::new(String::new());
		assert_eq!(tx.load(&mut read), Some(2));
		assert_eq!(read.as_str(), "second");
		assert_eq!(tx.write_tick(), 2);
	}

	#[test]
	fn buffers_rotate_through_the_slot() {
		let tx: TxValue<Vec<u32>> = TxValue::new();
		let mut write = Box::new(vec![1, 2, 3]);
		tx.publish(&mut write);
		// The writer got the previous slot occupant back.
		assert!(write.is_empty());

		let mut read = Box::new(Vec::new());
		tx.load(&mut read).unwrap();
		assert_eq!(*read, vec![1, 2, 3]);
	}
}
