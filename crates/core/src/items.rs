//! Append-only item storage shared between the producer and the scoring
//! threads.
//!
//! Items are packed into a sequence of geometrically growing chunks. A chunk
//! is never reallocated or moved once handed out, so readers keep stable
//! pointers into it forever. The producer stages items with [`ItemList::push`]
//! and makes them visible with [`ItemList::commit`]; readers observe only the
//! committed prefix through an acquire load of the committed size.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};

use crate::error::PushError;

/// Byte capacity of the first chunk.
const FIRST_CHUNK_BYTES: usize = 64 * 1024;

/// Item capacity of the first chunk.
const FIRST_CHUNK_ENTRIES: usize = 1024;

/// Chunk byte capacities double up to this bound, which also caps a single
/// item. Keeping chunks at or below 1 GiB keeps in-chunk offsets inside u32.
const MAX_CHUNK_BYTES: usize = 1 << 30;

/// Fixed size of the chunk directory. Byte capacities double from 64 KiB to
/// 1 GiB and entry capacities double without bound, so the directory is
/// exhausted long after the 32-bit item index space.
const MAX_CHUNKS: usize = 64;

/// Largest single item accepted by [`ItemList::push`].
pub const MAX_ITEM_BYTES: usize = MAX_CHUNK_BYTES;

/// Location of one item inside its chunk.
#[derive(Clone, Copy)]
struct Span {
	offset: u32,
	len: u32,
}

/// One storage chunk: concatenated item bytes plus an `(offset, len)` entry
/// per item. Capacities are fixed at allocation.
struct Chunk {
	/// Global index of the first item stored in this chunk.
	first_item: u32,
	/// Number of items in this chunk once it is sealed; `u32::MAX` while the
	/// chunk is still the producer's write target.
	sealed: AtomicU32,
	bytes: Box<[UnsafeCell<MaybeUninit<u8>>]>,
	entries: Box<[UnsafeCell<MaybeUninit<Span>>]>,
}

impl Chunk {
	fn alloc(first_item: u32, bytes_cap: usize, entry_cap: usize) -> Result<Box<Chunk>, PushError> {
		let mut bytes: Vec<UnsafeCell<MaybeUninit<u8>>> = Vec::new();
		bytes.try_reserve_exact(bytes_cap)?;
		// SAFETY: `MaybeUninit` contents require no initialisation and the
		// capacity was just reserved.
		unsafe { bytes.set_len(bytes_cap) };

		let mut entries: Vec<UnsafeCell<MaybeUninit<Span>>> = Vec::new();
		entries.try_reserve_exact(entry_cap)?;
		// SAFETY: as above.
		unsafe { entries.set_len(entry_cap) };

		Ok(Box::new(Chunk {
			first_item,
			sealed: AtomicU32::new(u32::MAX),
			bytes: bytes.into_boxed_slice(),
			entries: entries.into_boxed_slice(),
		}))
	}

	/// Read item `rel` of this chunk.
	///
	/// # Safety
	///
	/// The item must have been committed: its entry and bytes were fully
	/// written before a release store of the committed size that the calling
	/// thread has since acquired.
	unsafe fn item(&self, rel: u32) -> &[u8] {
		// SAFETY: per the contract above the entry was initialised before the
		// commit this reader acquired, and is never rewritten.
		let span = unsafe { (*self.entries[rel as usize].get()).assume_init() };
		let data = UnsafeCell::raw_get(self.bytes.as_ptr()).cast::<u8>().cast_const();
		// SAFETY: the spanned bytes were written before the same commit and
		// the chunk allocation is never moved or freed while readers exist.
		unsafe { slice::from_raw_parts(data.add(span.offset as usize), span.len as usize) }
	}
}

// SAFETY: all cross-thread access to chunk contents is gated by the committed
// size protocol documented on `ItemList`.
unsafe impl Sync for Chunk {}
unsafe impl Send for Chunk {}

/// Producer-side bookkeeping. Only the single producer touches this.
struct Staging {
	total_items: u64,
	chunk_count: usize,
	len_bytes: usize,
	len_items: usize,
}

/// Append-only list of immutable byte strings with a staging/committed
/// boundary.
///
/// Writes (`push`, `commit`) belong to one producer thread; any thread may
/// read items below the committed size concurrently and without locks.
pub(crate) struct ItemList {
	chunks: [AtomicPtr<Chunk>; MAX_CHUNKS],
	committed: AtomicU64,
	last_commit: AtomicU64,
	staging: UnsafeCell<Staging>,
}

// SAFETY: `staging` is only accessed by the single producer (enforced by the
// `unsafe fn` contracts below); everything else is atomics or data published
// through the release/acquire pair on `committed`.
unsafe impl Sync for ItemList {}
unsafe impl Send for ItemList {}

impl ItemList {
	pub(crate) fn new() -> Self {
		ItemList {
			chunks: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
			committed: AtomicU64::new(0),
			last_commit: AtomicU64::new(0),
			staging: UnsafeCell::new(Staging {
				total_items: 0,
				chunk_count: 0,
				len_bytes: 0,
				len_items: 0,
			}),
		}
	}

	/// Append one item to the staging area.
	///
	/// On error nothing is staged and the store is unchanged.
	///
	/// # Safety
	///
	/// Must only be called from the single producer thread; concurrent calls
	/// to `push`, `commit` or `staged_len` are undefined behaviour.
	pub(crate) unsafe fn push(&self, bytes: &[u8]) -> Result<(), PushError> {
		if bytes.len() > MAX_ITEM_BYTES {
			return Err(PushError::ItemTooLong {
				len: bytes.len(),
				max: MAX_ITEM_BYTES,
			});
		}
		// SAFETY: single producer per the function contract.
		let staging = unsafe { &mut *self.staging.get() };
		if staging.total_items == u64::from(u32::MAX) {
			return Err(PushError::TooManyItems { max: u32::MAX });
		}

		let chunk = self.writable_chunk(staging, bytes.len())?;
		// SAFETY: the chunk region written here is past every committed item
		// and no reader touches it until the next commit publishes it.
		unsafe {
			let dst = UnsafeCell::raw_get(chunk.bytes.as_ptr().add(staging.len_bytes)).cast::<u8>();
			ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
			UnsafeCell::raw_get(chunk.entries.as_ptr().add(staging.len_items)).write(MaybeUninit::new(Span {
				offset: staging.len_bytes as u32,
				len: bytes.len() as u32,
			}));
		}
		staging.len_bytes += bytes.len();
		staging.len_items += 1;
		staging.total_items += 1;
		Ok(())
	}

	/// Return the current chunk if the item fits, otherwise seal it and
	/// allocate a larger one.
	fn writable_chunk(&self, staging: &mut Staging, len: usize) -> Result<&Chunk, PushError> {
		if staging.chunk_count > 0 {
			let current = self.chunks[staging.chunk_count - 1].load(Ordering::Relaxed);
			// SAFETY: the producer stored this pointer; chunks are never freed
			// before the list itself drops.
			let current = unsafe { &*current };
			if staging.len_bytes + len <= current.bytes.len()
				&& staging.len_items < current.entries.len()
			{
				return Ok(current);
			}
		}

		if staging.chunk_count == MAX_CHUNKS {
			return Err(PushError::ArenaFull);
		}

		let (bytes_cap, entry_cap) = match staging.chunk_count {
			0 => (FIRST_CHUNK_BYTES.max(len), FIRST_CHUNK_ENTRIES),
			count => {
				let prev = self.chunks[count - 1].load(Ordering::Relaxed);
				// SAFETY: as above.
				let prev = unsafe { &*prev };
				(
					(prev.bytes.len() * 2).min(MAX_CHUNK_BYTES).max(len),
					prev.entries.len() * 2,
				)
			}
		};

		let chunk = Chunk::alloc(staging.total_items as u32, bytes_cap, entry_cap)?;
		if staging.chunk_count > 0 {
			let prev = self.chunks[staging.chunk_count - 1].load(Ordering::Relaxed);
			// SAFETY: as above.
			unsafe { &*prev }
				.sealed
				.store(staging.len_items as u32, Ordering::Relaxed);
		}
		let ptr = Box::into_raw(chunk);
		// Release pairs with the acquire loads in `chunk_ref`: a reader that
		// sees the pointer sees the chunk header too.
		self.chunks[staging.chunk_count].store(ptr, Ordering::Release);
		staging.chunk_count += 1;
		staging.len_bytes = 0;
		staging.len_items = 0;
		// SAFETY: just stored; only this thread mutates the directory.
		Ok(unsafe { &*ptr })
	}

	/// Publish the staging size as the committed size.
	///
	/// The release store pairs with the acquire load in [`size`](Self::size):
	/// every byte and entry staged before this call is visible to a reader
	/// that observes the new size.
	///
	/// # Safety
	///
	/// Must only be called from the single producer thread.
	pub(crate) unsafe fn commit(&self) {
		// SAFETY: single producer per the function contract.
		let staged = unsafe { &*self.staging.get() }.total_items;
		self.committed.store(staged, Ordering::Release);
		self.last_commit.store(staged, Ordering::Relaxed);
	}

	/// Committed size, visible to any thread.
	pub(crate) fn size(&self) -> u64 {
		self.committed.load(Ordering::Acquire)
	}

	/// The size published by the most recent commit, without an ordering
	/// guarantee on item contents. Only useful for progress displays.
	pub(crate) fn last_commit_size(&self) -> u64 {
		self.last_commit.load(Ordering::Relaxed)
	}

	/// Staged size as seen by the producer.
	///
	/// # Safety
	///
	/// Must only be called from the single producer thread.
	pub(crate) unsafe fn staged_len(&self) -> u64 {
		// SAFETY: single producer per the function contract.
		unsafe { &*self.staging.get() }.total_items
	}

	fn chunk_ref(&self, idx: usize) -> Option<&Chunk> {
		if idx >= MAX_CHUNKS {
			return None;
		}
		let ptr = self.chunks[idx].load(Ordering::Acquire);
		if ptr.is_null() {
			return None;
		}
		// SAFETY: non-null directory entries point at live chunks for the
		// lifetime of the list.
		Some(unsafe { &*ptr })
	}

	/// Item `i`, which must be below the committed size the caller read.
	pub(crate) fn at(&self, i: u32) -> &[u8] {
		debug_assert!(u64::from(i) < self.size());
		let mut idx = 0;
		loop {
			let Some(chunk) = self.chunk_ref(idx) else {
				// Unreachable for committed indices; yield an empty item
				// rather than faulting if the contract is broken.
				return &[];
			};
			let rel = i - chunk.first_item;
			if rel < chunk.sealed.load(Ordering::Relaxed) {
				// SAFETY: `i` is committed per the caller contract.
				return unsafe { chunk.item(rel) };
			}
			idx += 1;
		}
	}

	/// Sequential cursor over the committed index range `start..end`.
	pub(crate) fn range(&self, start: u32, end: u32) -> ItemRange<'_> {
		debug_assert!(u64::from(end) <= self.size());
		ItemRange {
			list: self,
			chunk: None,
			chunk_idx: 0,
			next: start,
			end,
		}
	}
}

impl Drop for ItemList {
	fn drop(&mut self) {
		let count = self.staging.get_mut().chunk_count;
		for idx in 0..count {
			let ptr = *self.chunks[idx].get_mut();
			// SAFETY: the pointer came from `Box::into_raw` in
			// `writable_chunk` and is dropped exactly once here.
			drop(unsafe { Box::from_raw(ptr) });
		}
	}
}

/// Cheap forward cursor that avoids re-locating the chunk for every item.
pub(crate) struct ItemRange<'a> {
	list: &'a ItemList,
	chunk: Option<&'a Chunk>,
	chunk_idx: usize,
	next: u32,
	end: u32,
}

impl<'a> Iterator for ItemRange<'a> {
	type Item = &'a [u8];

	fn next(&mut self) -> Option<&'a [u8]> {
		if self.next >= self.end {
			return None;
		}
		loop {
			if let Some(chunk) = self.chunk {
				if self.next >= chunk.first_item {
					let rel = self.next - chunk.first_item;
					if rel < chunk.sealed.load(Ordering::Relaxed) {
						self.next += 1;
						// SAFETY: `next < end <= committed`.
						return Some(unsafe { chunk.item(rel) });
					}
				}
				self.chunk_idx += 1;
			}
			self.chunk = self.list.chunk_ref(self.chunk_idx);
			self.chunk?;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn push(list: &ItemList, bytes: &[u8]) {
		// SAFETY: tests drive the list from a single thread.
		unsafe { list.push(bytes) }.expect("push");
	}

	fn commit(list: &ItemList) {
		// SAFETY: as above.
		unsafe { list.commit() };
	}

	#[test]
	fn committed_items_are_readable() {
		let list = ItemList::new();
		push(&list, b"alpha");
		push(&list, b"beta");
		commit(&list);

		assert_eq!(list.size(), 2);
		assert_eq!(list.at(0), b"alpha");
		assert_eq!(list.at(1), b"beta");
	}

	#[test]
	fn staged_items_stay_invisible_until_commit() {
		let list = ItemList::new();
		push(&list, b"hidden");
		assert_eq!(list.size(), 0);
		// SAFETY: single-threaded test.
		assert_eq!(unsafe { list.staged_len() }, 1);

		commit(&list);
		assert_eq!(list.size(), 1);
		assert_eq!(list.last_commit_size(), 1);
	}

	#[test]
	fn growth_spans_multiple_chunks() {
		let list = ItemList::new();
		let total = FIRST_CHUNK_ENTRIES * 3;
		for i in 0..total {
			push(&list, format!("item-{i}").as_bytes());
		}
		commit(&list);

		assert_eq!(list.size(), total as u64);
		assert_eq!(list.at(0), b"item-0");
		assert_eq!(
			list.at(total as u32 - 1),
			format!("item-{}", total - 1).as_bytes()
		);
	}

	#[test]
	fn large_items_force_a_fresh_chunk() {
		let list = ItemList::new();
		let big = vec![b'x'; FIRST_CHUNK_BYTES - 8];
		push(&list, &big);
		push(&list, b"after-the-big-one");
		commit(&list);

		assert_eq!(list.at(0).len(), big.len());
		assert_eq!(list.at(1), b"after-the-big-one");
	}

	#[test]
	fn cursor_walks_chunk_boundaries() {
		let list = ItemList::new();
		let total = FIRST_CHUNK_ENTRIES + 100;
		for i in 0..total {
			push(&list, format!("{i}").as_bytes());
		}
		commit(&list);

		let collected: Vec<Vec<u8>> = list
			.range(0, total as u32)
			.map(|item| item.to_vec())
			.collect();
		assert_eq!(collected.len(), total);
		assert_eq!(collected[0], b"0");
		assert_eq!(collected[FIRST_CHUNK_ENTRIES], FIRST_CHUNK_ENTRIES.to_string().as_bytes());
	}

	#[test]
	fn empty_items_round_trip() {
		let list = ItemList::new();
		push(&list, b"");
		push(&list, b"tail");
		commit(&list);

		assert_eq!(list.at(0), b"");
		assert_eq!(list.at(1), b"tail");
	}
}
