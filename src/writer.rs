use crate::{Logger, NotConnectedError, Transport, TransportError, WriteCommandError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Writes commands to the device.
///
/// A command writer is a cheap handle that can be cloned and moved to other threads,
/// for example to send a periodic keep-alive command.
/// Writes go straight to the transport: there is no queue, and no lock shared with the line reader.
pub struct CommandWriter<T> {
	transport: Arc<T>,
	connected: Arc<AtomicBool>,
	terminator: Arc<str>,
	logger: Logger,
}

impl<T> Clone for CommandWriter<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			connected: self.connected.clone(),
			terminator: self.terminator.clone(),
			logger: self.logger.clone(),
		}
	}
}

impl<T> std::fmt::Debug for CommandWriter<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommandWriter")
			.field("connected", &self.connected.load(Ordering::Acquire))
			.field("terminator", &self.terminator)
			.finish_non_exhaustive()
	}
}

impl<T: Transport> CommandWriter<T> {
	pub(crate) fn new(transport: Arc<T>, connected: Arc<AtomicBool>, terminator: &str, logger: Logger) -> Self {
		Self {
			transport,
			connected,
			terminator: terminator.into(),
			logger,
		}
	}

	/// Check if commands can currently be written.
	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire) && self.transport.is_open()
	}

	/// Write a command followed by the line terminator.
	///
	/// Returns the number of bytes written, including the terminator.
	pub fn write_command(&self, command: &str) -> Result<usize, WriteCommandError<T::Error>> {
		if !self.is_connected() {
			warn!(target: self.logger.target(), "Not writing command {:?}: not connected", command);
			return Err(NotConnectedError.into());
		}
		let mut line = String::with_capacity(command.len() + self.terminator.len());
		line.push_str(command);
		line.push_str(&self.terminator);
		debug!(target: self.logger.target(), "Writing command {:?}", command);
		match self.transport.write(line.as_bytes()) {
			Ok(count) => Ok(count),
			Err(e) => {
				let e = TransportError::Write(e);
				warn!(target: self.logger.target(), "{}", e);
				Err(e.into())
			},
		}
	}
}
