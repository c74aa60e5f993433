use std::time::Duration;

/// An error reported by the transport while talking to the device.
#[derive(Debug)]
pub enum TransportError<E> {
	/// Opening the device failed.
	Open(E),
	/// Querying the number of pending bytes failed.
	BytesAvailable(E),
	/// Reading a line failed.
	Read(E),
	/// Writing to the device failed.
	Write(E),
}

/// A received line is not valid UTF-8.
///
/// The line is dropped, but the raw bytes are kept for diagnostics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DecodeError {
	/// The raw bytes of the line, without line terminator.
	pub bytes: Vec<u8>,
	/// The length of the longest valid UTF-8 prefix.
	pub valid_up_to: usize,
}

/// A command was written while the connection is closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NotConnectedError;

/// The line reader did not acknowledge a stop request in time.
///
/// The reader thread has been abandoned, but the transport was closed regardless.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ShutdownTimeoutError {
	pub timeout: Duration,
}

/// An error that can occur while connecting.
#[derive(Debug)]
pub enum ConnectError<E> {
	/// The transport could not be opened.
	Transport(TransportError<E>),
	/// The reader thread could not be spawned.
	SpawnReader(std::io::Error),
	/// A reader abandoned by an earlier disconnect is still running.
	ReaderStillActive(ShutdownTimeoutError),
}

/// An error that can occur while writing a command.
#[derive(Debug)]
pub enum WriteCommandError<E> {
	NotConnected(NotConnectedError),
	Transport(TransportError<E>),
}

/// An error that can occur during a single poll of the line reader.
#[derive(Debug)]
pub enum PollError<E> {
	Transport(TransportError<E>),
	Decode(DecodeError),
}

impl<E> TransportError<E> {
	/// Get the error reported by the transport.
	pub fn inner(&self) -> &E {
		match self {
			Self::Open(e) => e,
			Self::BytesAvailable(e) => e,
			Self::Read(e) => e,
			Self::Write(e) => e,
		}
	}

	/// Consume the error to get the error reported by the transport.
	pub fn into_inner(self) -> E {
		match self {
			Self::Open(e) => e,
			Self::BytesAvailable(e) => e,
			Self::Read(e) => e,
			Self::Write(e) => e,
		}
	}
}

impl DecodeError {
	/// Check that a line is valid UTF-8.
	pub fn check(bytes: Vec<u8>) -> Result<String, Self> {
		String::from_utf8(bytes).map_err(|e| Self {
			valid_up_to: e.utf8_error().valid_up_to(),
			bytes: e.into_bytes(),
		})
	}

	/// Decode the line anyway, replacing invalid sequences with U+FFFD.
	pub fn lossy(&self) -> String {
		String::from_utf8_lossy(&self.bytes).into_owned()
	}
}

impl<E> ConnectError<E> {
	/// Check if the error is caused by the transport.
	pub fn is_transport_error(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

impl<E> WriteCommandError<E> {
	/// Check if the command was refused because the connection is closed.
	pub fn is_not_connected(&self) -> bool {
		matches!(self, Self::NotConnected(_))
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TransportError<E> {}
impl std::error::Error for DecodeError {}
impl std::error::Error for NotConnectedError {}
impl std::error::Error for ShutdownTimeoutError {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ConnectError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for WriteCommandError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for PollError<E> {}

impl<E> From<TransportError<E>> for ConnectError<E> {
	fn from(other: TransportError<E>) -> Self {
		Self::Transport(other)
	}
}

impl<E> From<ShutdownTimeoutError> for ConnectError<E> {
	fn from(other: ShutdownTimeoutError) -> Self {
		Self::ReaderStillActive(other)
	}
}

impl<E> From<NotConnectedError> for WriteCommandError<E> {
	fn from(other: NotConnectedError) -> Self {
		Self::NotConnected(other)
	}
}

impl<E> From<TransportError<E>> for WriteCommandError<E> {
	fn from(other: TransportError<E>) -> Self {
		Self::Transport(other)
	}
}

impl<E> From<TransportError<E>> for PollError<E> {
	fn from(other: TransportError<E>) -> Self {
		Self::Transport(other)
	}
}

impl<E> From<DecodeError> for PollError<E> {
	fn from(other: DecodeError) -> Self {
		Self::Decode(other)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for TransportError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Open(e) => write!(f, "failed to open serial port: {}", e),
			Self::BytesAvailable(e) => write!(f, "failed to query pending bytes: {}", e),
			Self::Read(e) => write!(f, "failed to read from serial port: {}", e),
			Self::Write(e) => write!(f, "failed to write to serial port: {}", e),
		}
	}
}

impl std::fmt::Display for DecodeError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(
			f,
			"received line is not valid UTF-8 after {} bytes: {:02X?}",
			self.valid_up_to, self.bytes
		)
	}
}

impl std::fmt::Display for NotConnectedError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "not connected")
	}
}

impl std::fmt::Display for ShutdownTimeoutError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "line reader did not stop within {:?}", self.timeout)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for ConnectError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Transport(e) => write!(f, "{}", e),
			Self::SpawnReader(e) => write!(f, "failed to spawn reader thread: {}", e),
			Self::ReaderStillActive(e) => write!(f, "previous {}", e),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for WriteCommandError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::NotConnected(e) => write!(f, "can not write command: {}", e),
			Self::Transport(e) => write!(f, "{}", e),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for PollError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Transport(e) => write!(f, "{}", e),
			Self::Decode(e) => write!(f, "{}", e),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::{assert, let_assert};

	#[test]
	fn decode_reports_valid_prefix() {
		let_assert!(Err(e) = DecodeError::check(b"ok\xFF\xFE".to_vec()));
		assert!(e.valid_up_to == 2);
		assert!(e.bytes == b"ok\xFF\xFE");
		assert!(e.lossy() == "ok\u{FFFD}\u{FFFD}");
	}

	#[test]
	fn decode_accepts_utf8() {
		let_assert!(Ok(text) = DecodeError::check("T:21.5 /0.0 °C".as_bytes().to_vec()));
		assert!(text == "T:21.5 /0.0 °C");
	}

	#[test]
	fn messages_name_the_failed_operation() {
		let error = TransportError::Write("device unplugged");
		assert!(error.to_string() == "failed to write to serial port: device unplugged");
		let error = WriteCommandError::<&str>::from(NotConnectedError);
		assert!(error.to_string() == "can not write command: not connected");
		assert!(error.is_not_connected());
		let error = ConnectError::<&str>::from(ShutdownTimeoutError { timeout: Duration::from_secs(1) });
		assert!(error.to_string() == "previous line reader did not stop within 1s");
	}
}
