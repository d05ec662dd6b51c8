//! Stateful splitter turning arbitrary byte chunks into line items.
//!
//! Complete lines inside a chunk are emitted without copying; only a partial
//! trailing line is buffered until the next chunk (or [`finalize`]) completes
//! it. A `\r` directly before the `\n` is stripped, so CRLF input produces
//! the same items as LF input.
//!
//! [`finalize`]: LineScanner::finalize

/// Splits a byte stream on `\n` and feeds each line to a push callback.
#[derive(Default)]
pub struct LineScanner {
	pending: Vec<u8>,
}

impl LineScanner {
	#[must_use]
	pub fn new() -> Self {
		LineScanner::default()
	}

	/// Feed a chunk of bytes, emitting every line it completes.
	///
	/// Returns the number of items emitted. A push error is returned as-is;
	/// lines emitted before the error stay emitted and the unconsumed tail of
	/// the chunk is dropped.
	pub fn feed<E>(
		&mut self,
		mut chunk: &[u8],
		push: &mut dyn FnMut(&[u8]) -> Result<(), E>,
	) -> Result<u32, E> {
		let mut emitted = 0;
		while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
			let (line, rest) = chunk.split_at(pos);
			chunk = &rest[1..];
			if self.pending.is_empty() {
				push(trim_cr(line))?;
			} else {
				self.pending.extend_from_slice(line);
				push(trim_cr(&self.pending))?;
				self.pending.clear();
			}
			emitted += 1;
		}
		if !chunk.is_empty() {
			self.pending.extend_from_slice(chunk);
		}
		Ok(emitted)
	}

	/// Flush any buffered unterminated bytes as one final item.
	///
	/// Returns whether an item was emitted.
	pub fn finalize<E>(&mut self, push: &mut dyn FnMut(&[u8]) -> Result<(), E>) -> Result<bool, E> {
		if self.pending.is_empty() {
			return Ok(false);
		}
		push(&self.pending)?;
		self.pending.clear();
		Ok(true)
	}
}

fn trim_cr(line: &[u8]) -> &[u8] {
	line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::Infallible;

	fn collect(chunks: &[&[u8]], finalize: bool) -> (Vec<Vec<u8>>, u32, bool) {
		let mut scanner = LineScanner::new();
		let mut items: Vec<Vec<u8>> = Vec::new();
		let mut emitted = 0;
		{
			let mut push = |line: &[u8]| -> Result<(), Infallible> {
				items.push(line.to_vec());
				Ok(())
			};
			for chunk in chunks {
				emitted += scanner.feed(chunk, &mut push).unwrap();
			}
			if finalize {
				let flushed = scanner.finalize(&mut push).unwrap();
				return (items, emitted, flushed);
			}
		}
		(items, emitted, false)
	}

	#[test]
	fn splits_complete_lines() {
		let (items, emitted, _) = collect(&[b"one\ntwo\nthree\n"], false);
		assert_eq!(emitted, 3);
		assert_eq!(items, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
	}

	#[test]
	fn joins_lines_split_across_chunks() {
		let (items, emitted, _) = collect(&[b"hel", b"lo\nwor", b"ld\n"], false);
		assert_eq!(emitted, 2);
		assert_eq!(items, vec![b"hello".to_vec(), b"world".to_vec()]);
	}

	#[test]
	fn strips_carriage_returns_before_newlines() {
		let (items, _, _) = collect(&[b"dos\r\nunix\n"], false);
		assert_eq!(items, vec![b"dos".to_vec(), b"unix".to_vec()]);
	}

	#[test]
	fn strips_carriage_return_split_across_chunks() {
		let (items, _, _) = collect(&[b"dos\r", b"\nnext\n"], false);
		assert_eq!(items, vec![b"dos".to_vec(), b"next".to_vec()]);
	}

	#[test]
	fn finalize_flushes_the_unterminated_tail() {
		let (items, emitted, flushed) = collect(&[b"done\npart"], true);
		assert_eq!(emitted, 1);
		assert!(flushed);
		assert_eq!(items, vec![b"done".to_vec(), b"part".to_vec()]);
	}

	#[test]
	fn finalize_with_nothing_pending_emits_nothing() {
		let (items, _, flushed) = collect(&[b"line\n"], true);
		assert!(!flushed);
		assert_eq!(items.len(), 1);
	}

	#[test]
	fn empty_lines_are_items_too() {
		let (items, emitted, _) = collect(&[b"a\n\nb\n"], false);
		assert_eq!(emitted, 3);
		assert_eq!(items, vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
	}

	#[test]
	fn push_errors_propagate() {
		let mut scanner = LineScanner::new();
		let mut calls = 0;
		let mut push = |_: &[u8]| -> Result<(), &'static str> {
			calls += 1;
			if calls == 2 { Err("full") } else { Ok(()) }
		};
		let err = scanner.feed(b"a\nb\nc\n", &mut push);
		assert_eq!(err, Err("full"));
	}
}
