//! Edge-triggered wake-up notifier behind a pollable file descriptor.
//!
//! [`Notify::fire`] makes the descriptor readable; the reader drains it with
//! an 8-byte counter read as part of loading results. Firing is idempotent
//! between drains, so a burst of publishes costs the reader one wake-up.
//! Linux uses an `eventfd`; other unix targets fall back to a non-blocking
//! self-pipe with the same observable behaviour.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

#[cfg(target_os = "linux")]
pub(crate) struct Notify {
	fd: OwnedFd,
}

#[cfg(target_os = "linux")]
impl Notify {
	pub(crate) fn new() -> io::Result<Self> {
		// SAFETY: plain syscall; the returned descriptor is owned here.
		let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}
		// SAFETY: `fd` is a freshly created, unowned descriptor.
		Ok(Notify { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
	}

	/// Make the next poll of the descriptor ready.
	pub(crate) fn fire(&self) {
		let one: u64 = 1;
		// SAFETY: writes 8 bytes from a valid local. EAGAIN means the counter
		// is saturated, in which case the reader is already pending.
		unsafe {
			libc::write(self.fd.as_raw_fd(), (&raw const one).cast(), 8);
		}
	}

	/// Consume a pending wake-up. Returns whether one was pending.
	pub(crate) fn drain(&self) -> bool {
		let mut counter: u64 = 0;
		// SAFETY: reads 8 bytes into a valid local.
		let n = unsafe { libc::read(self.fd.as_raw_fd(), (&raw mut counter).cast(), 8) };
		n == 8
	}
}

#[cfg(target_os = "linux")]
impl AsFd for Notify {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) struct Notify {
	read: OwnedFd,
	write: OwnedFd,
}

#[cfg(all(unix, not(target_os = "linux")))]
impl Notify {
	pub(crate) fn new() -> io::Result<Self> {
		let mut fds = [0 as libc::c_int; 2];
		// SAFETY: plain syscall writing into a valid two-element array.
		if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
			return Err(io::Error::last_os_error());
		}
		// SAFETY: both descriptors were just created and are owned below.
		let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
		for fd in [&read, &write] {
			// SAFETY: fcntl on descriptors owned above.
			unsafe {
				libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, libc::O_NONBLOCK);
				libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC);
			}
		}
		Ok(Notify { read, write })
	}

	pub(crate) fn fire(&self) {
		let one: u64 = 1;
		// SAFETY: writes 8 bytes from a valid local; EAGAIN on a full pipe
		// means the reader is already pending.
		unsafe {
			libc::write(self.write.as_raw_fd(), (&raw const one).cast(), 8);
		}
	}

	pub(crate) fn drain(&self) -> bool {
		let mut any = false;
		let mut counter: u64 = 0;
		loop {
			// SAFETY: reads at most 8 bytes into a valid local.
			let n = unsafe { libc::read(self.read.as_raw_fd(), (&raw mut counter).cast(), 8) };
			if n > 0 {
				any = true;
			} else {
				return any;
			}
		}
	}
}

#[cfg(all(unix, not(target_os = "linux")))]
impl AsFd for Notify {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.read.as_fd()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drain_without_fire_reports_nothing() {
		let notify = Notify::new().unwrap();
		assert!(!notify.drain());
	}

	#[test]
	fn fire_makes_one_drain_ready() {
		let notify = Notify::new().unwrap();
		notify.fire();
		assert!(notify.drain());
		assert!(!notify.drain());
	}

	#[test]
	fn repeated_fires_collapse_into_one_wake() {
		let notify = Notify::new().unwrap();
		notify.fire();
		notify.fire();
		notify.fire();
		assert!(notify.drain());
		assert!(!notify.drain());
	}

	#[test]
	fn descriptor_polls_readable_after_fire() {
		let notify = Notify::new().unwrap();
		notify.fire();
		let mut pfd = libc::pollfd {
			fd: notify.as_fd().as_raw_fd(),
			events: libc::POLLIN,
			revents: 0,
		};
		// SAFETY: polls one valid descriptor with a zero timeout.
		let ready = unsafe { libc::poll(&mut pfd, 1, 0) };
		assert_eq!(ready, 1);
		assert!(pfd.revents & libc::POLLIN != 0);
	}
}
