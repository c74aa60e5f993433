//! Background thread that turns received lines into timestamped messages.

use crate::{Clock, DecodeError, Logger, PollError, ReceivedMessage, Sink, Transport, TransportError};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The state of a line reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderState {
	/// The reader is not running, or has been told to stop.
	Stopped,
	/// The reader is polling the transport.
	Running,
	/// The reader is alive but leaves the transport alone until it is resumed.
	PauseRequested,
}

impl ReaderState {
	fn to_raw(self) -> u8 {
		match self {
			Self::Stopped => 0,
			Self::Running => 1,
			Self::PauseRequested => 2,
		}
	}

	fn from_raw(raw: u8) -> Self {
		match raw {
			1 => Self::Running,
			2 => Self::PauseRequested,
			_ => Self::Stopped,
		}
	}
}

impl std::fmt::Display for ReaderState {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Stopped => write!(f, "stopped"),
			Self::Running => write!(f, "running"),
			Self::PauseRequested => write!(f, "paused"),
		}
	}
}

/// State shared between the connection manager and one reader thread.
///
/// Every reader thread gets its own control block,
/// so a reader abandoned by a timed out disconnect can never be revived by a later connect.
#[derive(Debug)]
pub(crate) struct ReaderControl {
	state: AtomicU8,
	/// Set by the reader while it polls the transport and delivers a message.
	polling: Mutex<bool>,
	idle: Condvar,
}

impl ReaderControl {
	pub(crate) fn new(state: ReaderState) -> Self {
		Self {
			state: AtomicU8::new(state.to_raw()),
			polling: Mutex::new(false),
			idle: Condvar::new(),
		}
	}

	pub(crate) fn state(&self) -> ReaderState {
		ReaderState::from_raw(self.state.load(Ordering::Acquire))
	}

	pub(crate) fn set(&self, state: ReaderState) {
		self.state.store(state.to_raw(), Ordering::Release);
	}

	/// Change the state from `from` to `to`.
	///
	/// Returns the state before the call, the change only happened if that equals `from`.
	pub(crate) fn transition(&self, from: ReaderState, to: ReaderState) -> ReaderState {
		match self.state.compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire) {
			Ok(raw) => ReaderState::from_raw(raw),
			Err(raw) => ReaderState::from_raw(raw),
		}
	}

	fn lock_polling(&self) -> MutexGuard<'_, bool> {
		self.polling.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Mark the start of a poll, until the returned guard is dropped.
	fn begin_poll(&self) -> PollGuard<'_> {
		*self.lock_polling() = true;
		PollGuard { control: self }
	}

	/// Wait for a poll in progress to finish, for at most `timeout`.
	///
	/// Returns false if the poll was still in progress when the timeout expired.
	pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
		let polling = self.lock_polling();
		let (_polling, result) = self
			.idle
			.wait_timeout_while(polling, timeout, |polling| *polling)
			.unwrap_or_else(PoisonError::into_inner);
		!result.timed_out()
	}
}

/// Clears the polling flag of a reader, even if the sink panics.
struct PollGuard<'a> {
	control: &'a ReaderControl,
}

impl Drop for PollGuard<'_> {
	fn drop(&mut self) {
		*self.control.lock_polling() = false;
		self.control.idle.notify_all();
	}
}

/// Polls a transport for lines and delivers them to a sink.
pub(crate) struct LineReader<T> {
	pub(crate) transport: Arc<T>,
	pub(crate) sink: Arc<dyn Sink>,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) control: Arc<ReaderControl>,
	pub(crate) read_timeout: Duration,
	pub(crate) poll_interval: Duration,
	pub(crate) logger: Logger,
}

impl<T: Transport> LineReader<T> {
	/// Run the read loop until the reader is stopped or the transport is closed.
	pub(crate) fn run(&self) {
		let target = self.logger.target();
		if !self.transport.is_open() {
			error!(target: target, "Serial port is not open, not starting line reader");
			return;
		}
		debug!(target: target, "Line reader started");

		loop {
			match self.control.state() {
				ReaderState::Stopped => break,
				ReaderState::PauseRequested => {
					thread::park_timeout(self.poll_interval);
					continue;
				},
				ReaderState::Running => (),
			}

			{
				let _polling = self.control.begin_poll();
				// Pause or stop may have been requested before the poll started.
				if self.control.state() != ReaderState::Running {
					continue;
				}
				if !self.transport.is_open() {
					warn!(target: target, "Serial port was closed, stopping line reader");
					break;
				}
				match self.poll_once() {
					Ok(Some(message)) => {
						trace!(target: target, "Read line: {:?}", message.text());
						self.sink.deliver(message);
					},
					Ok(None) => (),
					Err(e) => warn!(target: target, "{}", e),
				}
			}

			thread::park_timeout(self.poll_interval);
		}

		debug!(target: target, "Line reader stopped");
	}

	/// Poll the transport for a single line.
	///
	/// The timestamp of the message is taken before anything is read.
	pub(crate) fn poll_once(&self) -> Result<Option<ReceivedMessage>, PollError<T::Error>> {
		let timestamp = self.clock.now();
		let available = self.transport.bytes_available().map_err(TransportError::BytesAvailable)?;
		if available == 0 {
			return Ok(None);
		}
		let line = match self.transport.read_line(self.read_timeout).map_err(TransportError::Read)? {
			Some(line) => line,
			None => return Ok(None),
		};
		let text = decode_line(line)?;
		Ok(text.map(|text| ReceivedMessage::new(timestamp, text)))
	}
}

/// Decode a received line and strip the line terminator.
///
/// Returns `Ok(None)` for empty lines.
pub(crate) fn decode_line(mut line: Vec<u8>) -> Result<Option<String>, DecodeError> {
	if line.last() == Some(&b'\n') {
		line.pop();
	}
	if line.last() == Some(&b'\r') {
		line.pop();
	}
	if line.is_empty() {
		return Ok(None);
	}
	DecodeError::check(line).map(Some)
}

/// Handle to a running reader thread.
#[derive(Debug)]
pub(crate) struct ReaderHandle {
	control: Arc<ReaderControl>,
	thread: JoinHandle<()>,
	finished: mpsc::Receiver<()>,
}

/// The result of waiting for a reader thread.
#[derive(Debug)]
pub(crate) enum JoinOutcome {
	Finished,
	Panicked,
	TimedOut(ReaderHandle),
}

impl ReaderHandle {
	pub(crate) fn control(&self) -> &Arc<ReaderControl> {
		&self.control
	}

	/// Check if this is called from the reader thread itself, for example by the sink.
	pub(crate) fn is_current_thread(&self) -> bool {
		self.thread.thread().id() == thread::current().id()
	}

	/// Tell the reader to stop, without waiting for it.
	pub(crate) fn stop(&self) {
		self.control.set(ReaderState::Stopped);
		self.wake();
	}

	/// Interrupt the idle wait of the reader, so it notices state changes immediately.
	pub(crate) fn wake(&self) {
		self.thread.thread().unpark();
	}

	/// Wait for the reader thread to exit, for at most `timeout`.
	pub(crate) fn join_timeout(self, timeout: Duration) -> JoinOutcome {
		match self.finished.recv_timeout(timeout) {
			Err(mpsc::RecvTimeoutError::Timeout) => JoinOutcome::TimedOut(self),
			Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => match self.thread.join() {
				Ok(()) => JoinOutcome::Finished,
				Err(_) => JoinOutcome::Panicked,
			},
		}
	}
}

/// Runs when a reader thread exits, even if it panics.
struct ExitGuard {
	control: Arc<ReaderControl>,
	active: Arc<AtomicUsize>,
	finished: mpsc::Sender<()>,
}

impl Drop for ExitGuard {
	fn drop(&mut self) {
		self.control.set(ReaderState::Stopped);
		self.active.fetch_sub(1, Ordering::SeqCst);
		let _ = self.finished.send(());
	}
}

/// Spawn a thread running the line reader.
///
/// `active` counts the reader threads that are alive.
pub(crate) fn spawn<T>(reader: LineReader<T>, active: Arc<AtomicUsize>) -> std::io::Result<ReaderHandle>
where
	T: Transport + 'static,
{
	let (finished_tx, finished) = mpsc::channel();
	let control = reader.control.clone();
	active.fetch_add(1, Ordering::SeqCst);
	let guard = ExitGuard {
		control: control.clone(),
		active,
		finished: finished_tx,
	};
	let thread = thread::Builder::new().name("serial-reader".into()).spawn(move || {
		let _guard = guard;
		reader.run();
	})?;
	Ok(ReaderHandle {
		control,
		thread,
		finished,
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::Timestamp;
	use assert2::{assert, let_assert};
	use chrono::{DateTime, Local};
	use std::collections::VecDeque;
	use std::sync::atomic::{AtomicBool, AtomicU64};

	/// Clock that advances one microsecond on every call.
	struct CountingClock {
		ticks: AtomicU64,
		wall: DateTime<Local>,
	}

	impl CountingClock {
		fn new() -> Self {
			Self {
				ticks: AtomicU64::new(0),
				wall: Local::now(),
			}
		}
	}

	impl Clock for CountingClock {
		fn now(&self) -> Timestamp {
			let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
			Timestamp::new(
				Duration::from_micros(tick),
				self.wall + chrono::Duration::microseconds(tick as i64),
			)
		}
	}

	/// Transport that returns scripted lines and remembers when they were read.
	struct ScriptedTransport {
		open: AtomicBool,
		lines: Mutex<VecDeque<Result<Vec<u8>, &'static str>>>,
		clock: Arc<CountingClock>,
		read_at: Mutex<Vec<Timestamp>>,
	}

	impl ScriptedTransport {
		fn new(clock: Arc<CountingClock>, lines: Vec<Result<Vec<u8>, &'static str>>) -> Self {
			Self {
				open: AtomicBool::new(true),
				lines: Mutex::new(lines.into()),
				clock,
				read_at: Mutex::new(Vec::new()),
			}
		}
	}

	impl Transport for ScriptedTransport {
		type Error = &'static str;

		fn open(&self) -> Result<(), Self::Error> {
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
			Ok(self.lines.lock().unwrap().len())
		}

		fn read_line(&self, _timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
			self.read_at.lock().unwrap().push(self.clock.now());
			match self.lines.lock().unwrap().pop_front() {
				Some(Ok(line)) => Ok(Some(line)),
				Some(Err(e)) => Err(e),
				None => Ok(None),
			}
		}

		fn write(&self, data: &[u8]) -> Result<usize, Self::Error> {
			Ok(data.len())
		}
	}

	fn line(bytes: &[u8]) -> Result<Vec<u8>, &'static str> {
		Ok(bytes.to_vec())
	}

	fn make_reader(transport: &Arc<ScriptedTransport>, sink: Arc<dyn Sink>) -> LineReader<ScriptedTransport> {
		LineReader {
			transport: transport.clone(),
			sink,
			clock: transport.clock.clone(),
			control: Arc::new(ReaderControl::new(ReaderState::Running)),
			read_timeout: Duration::from_millis(20),
			poll_interval: Duration::from_millis(1),
			logger: Logger::new("reader-test"),
		}
	}

	#[test]
	fn decode_strips_line_terminators() {
		assert!(decode_line(b"ok\n".to_vec()) == Ok(Some(String::from("ok"))));
		assert!(decode_line(b"ok\r\n".to_vec()) == Ok(Some(String::from("ok"))));
		assert!(decode_line(b"echo:Home offset:".to_vec()) == Ok(Some(String::from("echo:Home offset:"))));
		assert!(decode_line(b" \n".to_vec()) == Ok(Some(String::from(" "))));
	}

	#[test]
	fn decode_treats_empty_lines_as_nothing() {
		assert!(decode_line(Vec::new()) == Ok(None));
		assert!(decode_line(b"\n".to_vec()) == Ok(None));
		assert!(decode_line(b"\r\n".to_vec()) == Ok(None));
	}

	#[test]
	fn decode_rejects_invalid_utf8() {
		let_assert!(Err(e) = decode_line(b"\xC3\x28\n".to_vec()));
		assert!(e.bytes == b"\xC3\x28");
		assert!(e.valid_up_to == 0);
	}

	#[test]
	fn timestamp_is_taken_before_the_read() {
		let clock = Arc::new(CountingClock::new());
		let transport = Arc::new(ScriptedTransport::new(clock, vec![line(b"ok\n")]));
		let (sender, _receiver) = mpsc::channel();
		let reader = make_reader(&transport, Arc::new(sender));

		let_assert!(Ok(Some(message)) = reader.poll_once());
		let read_at = transport.read_at.lock().unwrap().clone();
		assert!(read_at.len() == 1);
		assert!(message.timestamp() < read_at[0]);
		assert!(message.text() == "ok");
	}

	#[test]
	fn nothing_is_read_without_pending_bytes() {
		let clock = Arc::new(CountingClock::new());
		let transport = Arc::new(ScriptedTransport::new(clock, vec![]));
		let (sender, _receiver) = mpsc::channel();
		let reader = make_reader(&transport, Arc::new(sender));

		let_assert!(Ok(None) = reader.poll_once());
		assert!(transport.read_at.lock().unwrap().is_empty());
	}

	#[test]
	fn read_errors_are_reported() {
		let clock = Arc::new(CountingClock::new());
		let transport = Arc::new(ScriptedTransport::new(clock, vec![Err("framing error"), line(b"ok\n")]));
		let (sender, _receiver) = mpsc::channel();
		let reader = make_reader(&transport, Arc::new(sender));

		let_assert!(Err(PollError::Transport(TransportError::Read("framing error"))) = reader.poll_once());
		let_assert!(Ok(Some(message)) = reader.poll_once());
		assert!(message.text() == "ok");
	}

	#[test]
	fn reader_thread_delivers_lines_until_stopped() {
		let clock = Arc::new(CountingClock::new());
		let transport = Arc::new(ScriptedTransport::new(clock, vec![line(b"ok\n"), line(b"\xFF\n"), line(b"T:21.0\n")]));
		let (sender, receiver) = mpsc::channel();
		let reader = make_reader(&transport, Arc::new(sender));
		let control = reader.control.clone();
		let active = Arc::new(AtomicUsize::new(0));

		let_assert!(Ok(handle) = spawn(reader, active.clone()));
		assert!(active.load(Ordering::SeqCst) == 1);
		let_assert!(Ok(first) = receiver.recv_timeout(Duration::from_secs(2)));
		let_assert!(Ok(second) = receiver.recv_timeout(Duration::from_secs(2)));
		assert!(first.text() == "ok");
		assert!(second.text() == "T:21.0");
		assert!(first.timestamp() <= second.timestamp());

		handle.stop();
		let_assert!(JoinOutcome::Finished = handle.join_timeout(Duration::from_secs(2)));
		assert!(control.state() == ReaderState::Stopped);
		assert!(active.load(Ordering::SeqCst) == 0);
	}

	#[test]
	fn reader_does_not_start_on_closed_transport() {
		let clock = Arc::new(CountingClock::new());
		let transport = Arc::new(ScriptedTransport::new(clock, vec![line(b"ok\n")]));
		transport.close();
		let (sender, receiver) = mpsc::channel();
		let reader = make_reader(&transport, Arc::new(sender));
		let control = reader.control.clone();
		let active = Arc::new(AtomicUsize::new(0));

		let_assert!(Ok(handle) = spawn(reader, active.clone()));
		let_assert!(JoinOutcome::Finished = handle.join_timeout(Duration::from_secs(2)));
		assert!(control.state() == ReaderState::Stopped);
		assert!(active.load(Ordering::SeqCst) == 0);
		assert!(receiver.try_recv().is_err());
		assert!(transport.read_at.lock().unwrap().is_empty());
	}

	#[test]
	fn transition_only_applies_from_expected_state() {
		let control = ReaderControl::new(ReaderState::Running);
		assert!(control.transition(ReaderState::PauseRequested, ReaderState::Running) == ReaderState::Running);
		assert!(control.state() == ReaderState::Running);
		assert!(control.transition(ReaderState::Running, ReaderState::PauseRequested) == ReaderState::Running);
		assert!(control.state() == ReaderState::PauseRequested);
	}

	#[test]
	fn wait_idle_is_bounded() {
		let control = Arc::new(ReaderControl::new(ReaderState::Running));
		assert!(control.wait_idle(Duration::from_millis(1)));

		let polling = control.begin_poll();
		assert!(control.wait_idle(Duration::from_millis(20)) == false);

		let waiter = thread::spawn({
			let control = control.clone();
			move || control.wait_idle(Duration::from_secs(5))
		});
		thread::sleep(Duration::from_millis(20));
		drop(polling);
		assert!(waiter.join().unwrap());
	}
}
