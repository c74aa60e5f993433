//! [`Transport`] trait to support different serial port implementations.

use core::time::Duration;

#[cfg(feature = "serial2")]
pub mod serial2;

/// Transports give access to the serial link of a device.
///
/// A transport is shared between the line reader thread and the threads writing commands,
/// so all functions take `&self`.
/// Reading and writing are independent directions and must be safe to interleave without additional locking.
pub trait Transport: Send + Sync {
	/// The error type returned by the transport.
	type Error: core::fmt::Debug + core::fmt::Display + Send + 'static;

	/// Open the device.
	///
	/// Opening a transport that is already open is a no-op.
	fn open(&self) -> Result<(), Self::Error>;

	/// Close the device.
	///
	/// Closing a transport that is already closed is a no-op.
	fn close(&self);

	/// Check if the device is open.
	fn is_open(&self) -> bool;

	/// Get the number of received bytes that can be read without blocking.
	fn bytes_available(&self) -> Result<usize, Self::Error>;

	/// Read one line, including the line terminator.
	///
	/// Returns `Ok(None)` if nothing was received before the timeout expired.
	/// If only a partial line was received before the timeout, the partial line is returned.
	/// Implementations must never block for (much) longer than the timeout.
	fn read_line(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error>;

	/// Write the data to the device, returning the number of bytes written.
	fn write(&self, data: &[u8]) -> Result<usize, Self::Error>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
	type Error = T::Error;

	fn open(&self) -> Result<(), Self::Error> {
		T::open(self)
	}

	fn close(&self) {
		T::close(self)
	}

	fn is_open(&self) -> bool {
		T::is_open(self)
	}

	fn bytes_available(&self) -> Result<usize, Self::Error> {
		T::bytes_available(self)
	}

	fn read_line(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
		T::read_line(self, timeout)
	}

	fn write(&self, data: &[u8]) -> Result<usize, Self::Error> {
		T::write(self, data)
	}
}
