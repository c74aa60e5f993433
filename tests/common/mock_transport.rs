use serial_monitor::Transport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// In-memory transport that records everything written to it.
///
/// Tests play the device by pushing bytes with [`MockTransport::emit()`].
#[derive(Default)]
pub struct MockTransport {
	open: AtomicBool,
	pub fail_open: AtomicBool,
	pub fail_writes: AtomicBool,
	/// Milliseconds every `read_line()` blocks, ignoring its timeout.
	pub stall_reads_ms: AtomicU64,
	incoming: Mutex<VecDeque<u8>>,
	read_errors: Mutex<VecDeque<&'static str>>,
	written: Mutex<Vec<u8>>,
	pub open_calls: AtomicUsize,
	pub read_calls: AtomicUsize,
	pub write_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap()
}

impl MockTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make the device send some bytes.
	pub fn emit(&self, data: &[u8]) {
		lock(&self.incoming).extend(data);
	}

	/// Make the next poll of the pending byte count fail.
	pub fn fail_next_poll(&self, message: &'static str) {
		lock(&self.read_errors).push_back(message);
	}

	/// Everything written to the device so far.
	pub fn written(&self) -> Vec<u8> {
		lock(&self.written).clone()
	}

	pub fn pending(&self) -> usize {
		lock(&self.incoming).len()
	}
}

impl Transport for MockTransport {
	type Error = &'static str;

	fn open(&self) -> Result<(), Self::Error> {
		self.open_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_open.load(Ordering::SeqCst) {
			return Err("no such device");
		}
		self.open.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn close(&self) {
		self.open.store(false, Ordering::SeqCst);
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	fn bytes_available(&self) -> Result<usize, Self::Error> {
		if let Some(message) = lock(&self.read_errors).pop_front() {
			return Err(message);
		}
		Ok(lock(&self.incoming).len())
	}

	fn read_line(&self, _timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
		self.read_calls.fetch_add(1, Ordering::SeqCst);
		let stall = self.stall_reads_ms.load(Ordering::SeqCst);
		if stall > 0 {
			std::thread::sleep(Duration::from_millis(stall));
		}
		let mut incoming = lock(&self.incoming);
		if incoming.is_empty() {
			return Ok(None);
		}
		let len = match incoming.iter().position(|&byte| byte == b'\n') {
			Some(index) => index + 1,
			None => incoming.len(),
		};
		Ok(Some(incoming.drain(..len).collect()))
	}

	fn write(&self, data: &[u8]) -> Result<usize, Self::Error> {
		self.write_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err("write failed");
		}
		lock(&self.written).extend_from_slice(data);
		Ok(data.len())
	}
}
