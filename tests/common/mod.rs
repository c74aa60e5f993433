#![allow(dead_code)]

mod mock_transport;

pub use mock_transport::MockTransport;

use serial_monitor::{ConnectionManager, MonitorConfig, ReceivedMessage};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type MockManager = ConnectionManager<MockTransport>;

/// Configuration with short timings, so tests run fast.
pub fn test_config() -> MonitorConfig {
	MonitorConfig::default()
		.with_read_timeout(Duration::from_millis(50))
		.with_poll_interval(Duration::from_millis(5))
		.with_shutdown_timeout(Duration::from_millis(500))
		.with_settle_time(Duration::ZERO)
}

/// Create a manager for a mock transport, delivering messages to a channel.
pub fn setup(config: MonitorConfig) -> (MockManager, mpsc::Receiver<ReceivedMessage>) {
	let (sender, receiver) = mpsc::channel();
	let manager = ConnectionManager::new(MockTransport::new(), sender, config);
	(manager, receiver)
}

/// Like [`setup()`], but the test keeps its own handle to the transport.
pub fn setup_shared(config: MonitorConfig) -> (Arc<MockTransport>, MockManager, mpsc::Receiver<ReceivedMessage>) {
	let (sender, receiver) = mpsc::channel();
	let transport = Arc::new(MockTransport::new());
	let manager = ConnectionManager::with_shared(transport.clone(), Arc::new(sender), config);
	(transport, manager, receiver)
}

/// Receive the text of the next message, waiting at most one second.
pub fn recv_text(receiver: &mpsc::Receiver<ReceivedMessage>) -> Option<String> {
	receiver.recv_timeout(Duration::from_secs(1)).ok().map(ReceivedMessage::into_text)
}

/// Wait until a condition holds, giving up after two seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(2);
	while Instant::now() < deadline {
		if condition() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(2));
	}
	condition()
}
