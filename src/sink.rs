//! Consumers of received lines.

use crate::Timestamp;
use std::sync::{mpsc, Arc};

/// A line received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
	timestamp: Timestamp,
	text: String,
}

impl ReceivedMessage {
	/// Create a message from the time the line arrived and the decoded text.
	pub fn new(timestamp: Timestamp, text: impl Into<String>) -> Self {
		Self {
			timestamp,
			text: text.into(),
		}
	}

	/// The time the line arrived, captured before it was read.
	pub fn timestamp(&self) -> Timestamp {
		self.timestamp
	}

	/// The decoded line, without line terminator.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Consume the message to get the decoded line.
	pub fn into_text(self) -> String {
		self.text
	}
}

impl std::fmt::Display for ReceivedMessage {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{} \t {}", self.timestamp, self.text)
	}
}

/// Consumer of received messages.
///
/// The line reader delivers messages synchronously from its own thread,
/// so implementations should return quickly.
/// A sink that blocks delays [`ConnectionManager::pause()`](crate::ConnectionManager::pause)
/// by up to the shutdown timeout, and stops the reader from noticing a disconnect.
pub trait Sink: Send + Sync {
	/// Deliver one message.
	fn deliver(&self, message: ReceivedMessage);
}

/// Messages are discarded once the receiver is dropped.
impl Sink for mpsc::Sender<ReceivedMessage> {
	fn deliver(&self, message: ReceivedMessage) {
		let _ = self.send(message);
	}
}

/// Delivery blocks while the channel is full.
impl Sink for mpsc::SyncSender<ReceivedMessage> {
	fn deliver(&self, message: ReceivedMessage) {
		let _ = self.send(message);
	}
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
	fn deliver(&self, message: ReceivedMessage) {
		S::deliver(self, message)
	}
}

impl<S: Sink + ?Sized> Sink for Box<S> {
	fn deliver(&self, message: ReceivedMessage) {
		S::deliver(self, message)
	}
}

/// [`Sink`] that calls a function for each message.
pub struct FnSink<F>(pub F);

impl<F> Sink for FnSink<F>
where
	F: Fn(ReceivedMessage) + Send + Sync,
{
	fn deliver(&self, message: ReceivedMessage) {
		(self.0)(message)
	}
}

impl<F> std::fmt::Debug for FnSink<F> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str("FnSink(..)")
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{Clock, SystemClock};
	use assert2::{assert, let_assert};
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn channel_sink_forwards_messages() {
		let clock = SystemClock::new();
		let (sender, receiver) = mpsc::channel();
		let sink: Arc<dyn Sink> = Arc::new(sender);
		sink.deliver(ReceivedMessage::new(clock.now(), "ok"));
		let_assert!(Ok(message) = receiver.try_recv());
		assert!(message.text() == "ok");
	}

	#[test]
	fn closed_channel_discards_messages() {
		let clock = SystemClock::new();
		let (sender, receiver) = mpsc::channel();
		drop(receiver);
		sender.deliver(ReceivedMessage::new(clock.now(), "ok"));
	}

	#[test]
	fn fn_sink_calls_function() {
		let clock = SystemClock::new();
		let count = AtomicUsize::new(0);
		let sink = FnSink(|message: ReceivedMessage| {
			assert!(message.text() == "echo:Home offset:");
			count.fetch_add(1, Ordering::Relaxed);
		});
		sink.deliver(ReceivedMessage::new(clock.now(), "echo:Home offset:"));
		sink.deliver(ReceivedMessage::new(clock.now(), "echo:Home offset:"));
		assert!(count.load(Ordering::Relaxed) == 2);
	}

	#[test]
	fn display_separates_timestamp_and_text() {
		let timestamp = SystemClock::new().now();
		let message = ReceivedMessage::new(timestamp, "ok");
		assert!(message.to_string() == format!("{} \t ok", timestamp));
	}
}
