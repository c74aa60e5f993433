//! Lifecycle of the serial connection and its line reader.

use crate::reader::{self, JoinOutcome, LineReader, ReaderControl, ReaderHandle, ReaderState};
use crate::{
	Clock, CommandWriter, ConnectError, Logger, MonitorConfig, NotConnectedError, ShutdownTimeoutError, Sink,
	SystemClock, Transport, TransportError, WriteCommandError,
};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The state of a connection.
///
/// `Connecting` and `Disconnecting` are only observed while [`ConnectionManager::connect()`]
/// or [`ConnectionManager::disconnect()`] is in progress on another thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
	Disconnecting,
}

impl ConnectionState {
	fn to_raw(self) -> u8 {
		match self {
			Self::Disconnected => 0,
			Self::Connecting => 1,
			Self::Connected => 2,
			Self::Disconnecting => 3,
		}
	}

	fn from_raw(raw: u8) -> Self {
		match raw {
			1 => Self::Connecting,
			2 => Self::Connected,
			3 => Self::Disconnecting,
			_ => Self::Disconnected,
		}
	}
}

impl std::fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Disconnected => write!(f, "disconnected"),
			Self::Connecting => write!(f, "connecting"),
			Self::Connected => write!(f, "connected"),
			Self::Disconnecting => write!(f, "disconnecting"),
		}
	}
}

/// Reader threads owned by the manager.
#[derive(Debug, Default)]
struct Lifecycle {
	/// The reader of the current connection.
	reader: Option<ReaderHandle>,

	/// A reader that did not stop in time during the last disconnect.
	abandoned: Option<ReaderHandle>,
}

/// Manages the connection to a device and the thread reading lines from it.
///
/// The manager owns the transport.
/// While connected, a single background thread polls the transport for lines and delivers them to the sink.
/// Commands can be written at any time while connected, from any thread.
///
/// All functions take `&self`: lifecycle changes are serialized internally,
/// so the manager can be shared between threads with an [`Arc`].
///
/// Dropping the manager disconnects it.
pub struct ConnectionManager<T: Transport> {
	transport: Arc<T>,
	sink: Arc<dyn Sink>,
	clock: Arc<dyn Clock>,
	config: MonitorConfig,
	logger: Logger,
	reader_logger: Logger,
	writer: CommandWriter<T>,
	connected: Arc<AtomicBool>,
	state: AtomicU8,
	lifecycle: Mutex<Lifecycle>,
	active_readers: Arc<AtomicUsize>,
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("state", &self.state())
			.field("reader_state", &self.reader_state())
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "serial2")]
impl ConnectionManager<crate::SerialTransport> {
	/// Create a manager for the serial port at the given path.
	///
	/// The baud rate is taken from the configuration.
	/// The port is not opened until [`Self::connect()`] is called.
	pub fn for_port(path: impl Into<std::path::PathBuf>, sink: impl Sink + 'static, config: MonitorConfig) -> Self {
		let transport = crate::SerialTransport::new(path, config.baud_rate);
		Self::new(transport, sink, config)
	}
}

impl<T: Transport + 'static> ConnectionManager<T> {
	/// Create a manager for a transport.
	///
	/// The transport is not opened until [`Self::connect()`] is called.
	pub fn new(transport: T, sink: impl Sink + 'static, config: MonitorConfig) -> Self {
		Self::with_shared(Arc::new(transport), Arc::new(sink), config)
	}

	/// Create a manager for a transport and sink that are shared with other code.
	pub fn with_shared(transport: Arc<T>, sink: Arc<dyn Sink>, config: MonitorConfig) -> Self {
		let logger = Logger::default();
		let connected = Arc::new(AtomicBool::new(false));
		let writer = CommandWriter::new(
			transport.clone(),
			connected.clone(),
			&config.line_terminator,
			logger.child("writer"),
		);
		Self {
			transport,
			sink,
			clock: Arc::new(SystemClock::new()),
			config,
			logger: logger.child("manager"),
			reader_logger: logger.child("reader"),
			writer,
			connected,
			state: AtomicU8::new(ConnectionState::Disconnected.to_raw()),
			lifecycle: Mutex::new(Lifecycle::default()),
			active_readers: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Use a different clock to timestamp received lines.
	pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
		self.clock = Arc::new(clock);
		self
	}

	/// Use a different logger.
	///
	/// The manager, reader and writer log with child targets of this logger.
	pub fn with_logger(mut self, logger: Logger) -> Self {
		self.writer = CommandWriter::new(
			self.transport.clone(),
			self.connected.clone(),
			&self.config.line_terminator,
			logger.child("writer"),
		);
		self.logger = logger.child("manager");
		self.reader_logger = logger.child("reader");
		self
	}

	/// Open the transport and start the line reader.
	///
	/// Does nothing if already connected.
	/// If the transport was closed behind the back of the manager, the connection is re-established.
	///
	/// Failures are not retried.
	pub fn connect(&self) -> Result<(), ConnectError<T::Error>> {
		let target = self.logger.target();
		let mut lifecycle = self.lock_lifecycle();

		if self.stored_state() == ConnectionState::Connected {
			if self.transport.is_open() {
				debug!(target: target, "Already connected");
				return Ok(());
			}
			warn!(target: target, "Serial port was closed unexpectedly, reconnecting");
			let _ = self.shutdown(&mut lifecycle);
		}

		self.reap_abandoned(&mut lifecycle)?;
		self.set_state(ConnectionState::Connecting);

		debug!(target: target, "Opening serial port");
		if let Err(e) = self.transport.open() {
			let e = TransportError::Open(e);
			warn!(target: target, "{}", e);
			self.set_state(ConnectionState::Disconnected);
			return Err(e.into());
		}
		if !self.config.settle_time.is_zero() {
			std::thread::sleep(self.config.settle_time);
		}

		let line_reader = LineReader {
			transport: self.transport.clone(),
			sink: self.sink.clone(),
			clock: self.clock.clone(),
			control: Arc::new(ReaderControl::new(ReaderState::Running)),
			read_timeout: self.config.read_timeout,
			poll_interval: self.config.poll_interval,
			logger: self.reader_logger.clone(),
		};
		match reader::spawn(line_reader, self.active_readers.clone()) {
			Ok(handle) => lifecycle.reader = Some(handle),
			Err(e) => {
				error!(target: target, "Failed to spawn line reader: {}", e);
				self.transport.close();
				self.set_state(ConnectionState::Disconnected);
				return Err(ConnectError::SpawnReader(e));
			},
		}

		self.connected.store(true, Ordering::Release);
		self.set_state(ConnectionState::Connected);
		info!(target: target, "Connected, ready to receive");
		Ok(())
	}

	/// Connect when disconnected, disconnect when connected.
	///
	/// Returns the new state of the connection.
	/// A shutdown timeout during the disconnect is logged but not returned, the connection is closed regardless.
	pub fn toggle(&self) -> Result<ConnectionState, ConnectError<T::Error>> {
		if self.is_open() {
			let _ = self.disconnect();
		} else {
			self.connect()?;
		}
		Ok(self.state())
	}
}

impl<T: Transport> ConnectionManager<T> {
	/// Stop the line reader and close the transport.
	///
	/// Does nothing if already disconnected.
	///
	/// The reader is given [`MonitorConfig::shutdown_timeout`] to stop.
	/// If it does not stop in time it is abandoned and an error is returned,
	/// but the transport is closed regardless.
	pub fn disconnect(&self) -> Result<(), ShutdownTimeoutError> {
		let mut lifecycle = self.lock_lifecycle();
		if self.stored_state() == ConnectionState::Disconnected {
			debug!(target: self.logger.target(), "Already disconnected");
			return Ok(());
		}
		self.shutdown(&mut lifecycle)
	}

	/// Pause the line reader without closing the connection.
	///
	/// When this function returns, no more lines are delivered to the sink until [`Self::resume()`] is called.
	/// Pausing a paused reader does nothing.
	///
	/// A line that is being delivered when this is called is allowed to finish,
	/// but pause waits for it at most [`MonitorConfig::shutdown_timeout`].
	/// If the sink is still busy after that, pause returns anyway and that single line is delivered later.
	/// A sink may call this function from [`Sink::deliver()`], in which case the current line is the last one.
	pub fn pause(&self) -> Result<(), NotConnectedError> {
		let target = self.logger.target();
		let (control, from_reader) = self.reader_control()?;
		match control.transition(ReaderState::Running, ReaderState::PauseRequested) {
			ReaderState::Running => {
				if !from_reader && !control.wait_idle(self.config.shutdown_timeout) {
					warn!(
						target: target,
						"Sink did not accept a line within {:?}, pausing without waiting for it",
						self.config.shutdown_timeout
					);
				}
				info!(target: target, "Paused line reader");
				Ok(())
			},
			ReaderState::PauseRequested => Ok(()),
			ReaderState::Stopped => Err(NotConnectedError),
		}
	}

	/// Resume a paused line reader.
	///
	/// Resuming a running reader does nothing.
	pub fn resume(&self) -> Result<(), NotConnectedError> {
		let lifecycle = self.lock_lifecycle();
		let handle = lifecycle.reader.as_ref().ok_or(NotConnectedError)?;
		match handle.control().transition(ReaderState::PauseRequested, ReaderState::Running) {
			ReaderState::PauseRequested => {
				handle.wake();
				info!(target: self.logger.target(), "Resumed line reader");
				Ok(())
			},
			ReaderState::Running => Ok(()),
			ReaderState::Stopped => Err(NotConnectedError),
		}
	}

	/// Write a command followed by the line terminator.
	///
	/// See [`CommandWriter::write_command()`].
	pub fn write_command(&self, command: &str) -> Result<usize, WriteCommandError<T::Error>> {
		self.writer.write_command(command)
	}

	/// Get a command writer that can be used from other threads.
	pub fn writer(&self) -> CommandWriter<T> {
		self.writer.clone()
	}

	/// Check if the connection is open.
	pub fn is_open(&self) -> bool {
		self.connected.load(Ordering::Acquire) && self.transport.is_open()
	}

	/// The state of the connection.
	///
	/// A connection whose transport was closed by something other than the manager is reported as disconnected,
	/// even though its reader is only cleaned up by the next call to [`Self::connect()`] or [`Self::disconnect()`].
	pub fn state(&self) -> ConnectionState {
		match self.stored_state() {
			ConnectionState::Connected if !self.transport.is_open() => ConnectionState::Disconnected,
			state => state,
		}
	}

	/// The state as last set by a lifecycle function.
	fn stored_state(&self) -> ConnectionState {
		ConnectionState::from_raw(self.state.load(Ordering::Acquire))
	}

	/// The state of the line reader of the current connection.
	pub fn reader_state(&self) -> ReaderState {
		self.lock_lifecycle()
			.reader
			.as_ref()
			.map(|handle| handle.control().state())
			.unwrap_or(ReaderState::Stopped)
	}

	/// The number of line reader threads that are still alive.
	///
	/// This is never more than one, except briefly after a disconnect abandoned a reader that did not stop in time.
	pub fn active_readers(&self) -> usize {
		self.active_readers.load(Ordering::SeqCst)
	}

	/// Get a reference to the transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Get the configuration.
	pub fn config(&self) -> &MonitorConfig {
		&self.config
	}

	/// Get the clock used to timestamp received lines.
	pub fn clock(&self) -> &dyn Clock {
		&*self.clock
	}

	/// Time elapsed since the manager was created.
	pub fn runtime(&self) -> Duration {
		self.clock.runtime()
	}

	fn set_state(&self, state: ConnectionState) {
		self.state.store(state.to_raw(), Ordering::Release);
	}

	fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
		self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Get the control block of the current reader, and whether we are running on the reader thread.
	fn reader_control(&self) -> Result<(Arc<ReaderControl>, bool), NotConnectedError> {
		self.lock_lifecycle()
			.reader
			.as_ref()
			.map(|handle| (handle.control().clone(), handle.is_current_thread()))
			.ok_or(NotConnectedError)
	}

	/// Stop the reader, then close the transport.
	fn shutdown(&self, lifecycle: &mut Lifecycle) -> Result<(), ShutdownTimeoutError> {
		let target = self.logger.target();
		self.set_state(ConnectionState::Disconnecting);

		let mut result = Ok(());
		if let Some(handle) = lifecycle.reader.take() {
			debug!(target: target, "Stopping line reader");
			handle.stop();
			match handle.join_timeout(self.config.shutdown_timeout) {
				JoinOutcome::Finished => (),
				JoinOutcome::Panicked => error!(target: target, "Line reader panicked"),
				JoinOutcome::TimedOut(handle) => {
					let e = ShutdownTimeoutError {
						timeout: self.config.shutdown_timeout,
					};
					warn!(target: target, "{}, abandoning it", e);
					lifecycle.abandoned = Some(handle);
					result = Err(e);
				},
			}
		}

		self.connected.store(false, Ordering::Release);
		self.transport.close();
		self.set_state(ConnectionState::Disconnected);
		info!(target: target, "Disconnected");
		result
	}

	/// Wait for a reader abandoned by an earlier disconnect.
	///
	/// Fails if it is still running after the shutdown timeout.
	fn reap_abandoned(&self, lifecycle: &mut Lifecycle) -> Result<(), ShutdownTimeoutError> {
		let target = self.logger.target();
		let handle = match lifecycle.abandoned.take() {
			Some(handle) => handle,
			None => return Ok(()),
		};
		match handle.join_timeout(self.config.shutdown_timeout) {
			JoinOutcome::Finished => {
				debug!(target: target, "Abandoned line reader has stopped");
				Ok(())
			},
			JoinOutcome::Panicked => {
				error!(target: target, "Abandoned line reader panicked");
				Ok(())
			},
			JoinOutcome::TimedOut(handle) => {
				lifecycle.abandoned = Some(handle);
				let e = ShutdownTimeoutError {
					timeout: self.config.shutdown_timeout,
				};
				warn!(target: target, "Not connecting: previous {}", e);
				Err(e)
			},
		}
	}
}

impl<T: Transport> Drop for ConnectionManager<T> {
	fn drop(&mut self) {
		let _ = self.disconnect();
	}
}
