//! Trait implementation using the `serial2` crate.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Read timeout configured on the port itself.
///
/// Longer reads are split in slices of this length,
/// so that [`SerialTransport::bytes_available()`] never blocks for long.
const READ_SLICE: Duration = Duration::from_millis(10);

/// [`Transport`](crate::Transport) for a serial port opened with [`serial2`].
///
/// The port is opened by [`Transport::open()`](crate::Transport::open) and released again by [`Transport::close()`](crate::Transport::close).
/// It can be opened and closed any number of times.
pub struct SerialTransport {
	path: PathBuf,
	baud_rate: u32,
	port: RwLock<Option<Arc<::serial2::SerialPort>>>,
	/// Bytes received from the port that have not been returned as a line yet.
	pending: Mutex<Vec<u8>>,
}

impl SerialTransport {
	/// Create a transport for the serial port at the given path.
	///
	/// The port is not opened yet.
	pub fn new(path: impl Into<PathBuf>, baud_rate: u32) -> Self {
		Self {
			path: path.into(),
			baud_rate,
			port: RwLock::new(None),
			pending: Mutex::new(Vec::new()),
		}
	}

	/// The path of the serial port.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The baud rate used when opening the port.
	pub fn baud_rate(&self) -> u32 {
		self.baud_rate
	}

	fn port(&self) -> std::io::Result<Arc<::serial2::SerialPort>> {
		self.port
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
			.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "serial port is closed"))
	}

	fn pending(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
		self.pending.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// Read one slice from the port into the pending buffer.
///
/// A read timeout is not an error: it simply means nothing was received.
fn fill(port: &::serial2::SerialPort, pending: &mut Vec<u8>) -> std::io::Result<usize> {
	let mut buffer = [0; 256];
	match port.read(&mut buffer) {
		Ok(count) => {
			pending.extend_from_slice(&buffer[..count]);
			Ok(count)
		},
		Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
		Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
		Err(e) => Err(e),
	}
}

/// Remove the first complete line from the buffer, including its newline.
fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
	let end = pending.iter().position(|&byte| byte == b'\n')?;
	Some(pending.drain(..=end).collect())
}

/// Remove whatever is left in the buffer, if anything.
fn take_partial(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
	if pending.is_empty() {
		None
	} else {
		Some(std::mem::take(pending))
	}
}

/// List the serial ports available on the system.
pub fn available_ports() -> std::io::Result<Vec<String>> {
	Ok(::serial2::SerialPort::available_ports()?
		.into_iter()
		.map(|path| path.display().to_string())
		.collect())
}

impl crate::Transport for SerialTransport {
	type Error = std::io::Error;

	fn open(&self) -> Result<(), Self::Error> {
		let mut port = self.port.write().unwrap_or_else(PoisonError::into_inner);
		if port.is_some() {
			return Ok(());
		}
		let mut serial_port = ::serial2::SerialPort::open(&self.path, self.baud_rate)?;
		serial_port.set_read_timeout(READ_SLICE)?;
		self.pending().clear();
		*port = Some(Arc::new(serial_port));
		Ok(())
	}

	fn close(&self) {
		// A read in progress keeps its own reference, the port is released when it returns.
		self.port.write().unwrap_or_else(PoisonError::into_inner).take();
	}

	fn is_open(&self) -> bool {
		self.port.read().unwrap_or_else(PoisonError::into_inner).is_some()
	}

	fn bytes_available(&self) -> Result<usize, Self::Error> {
		let port = self.port()?;
		let mut pending = self.pending();
		if pending.is_empty() {
			fill(&port, &mut pending)?;
		}
		Ok(pending.len())
	}

	fn read_line(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
		let port = self.port()?;
		let deadline = Instant::now() + timeout;
		let mut pending = self.pending();
		loop {
			if let Some(line) = take_line(&mut pending) {
				return Ok(Some(line));
			}
			if Instant::now() >= deadline {
				return Ok(take_partial(&mut pending));
			}
			fill(&port, &mut pending)?;
		}
	}

	fn write(&self, data: &[u8]) -> Result<usize, Self::Error> {
		let port = self.port()?;
		port.write_all(data)?;
		Ok(data.len())
	}
}

impl std::fmt::Debug for SerialTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SerialTransport")
			.field("path", &self.path)
			.field("baud_rate", &self.baud_rate)
			.field("open", &crate::Transport::is_open(self))
			.finish_non_exhaustive()
	}
}
