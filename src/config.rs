//! Connection settings.

use std::time::Duration;

/// Default baud rate of the monitor.
pub const DEFAULT_BAUD_RATE: u32 = 250_000;

/// Default port used when port selection finds nothing.
#[cfg(target_os = "windows")]
pub const DEFAULT_PORT: &str = "COM4";

/// Default port used when port selection finds nothing.
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Settings for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
	/// Baud rate used when opening the serial port.
	pub baud_rate: u32,

	/// Port to use when the port selector does not find a candidate.
	pub default_port: String,

	/// Ports that must never be selected automatically.
	///
	/// A port is excluded if its name contains one of these strings.
	pub port_exclusions: Vec<String>,

	/// Maximum time to wait for the rest of a line once bytes are pending.
	///
	/// This also bounds how long the reader can take to notice a stop request.
	pub read_timeout: Duration,

	/// Time the reader sleeps between two polls of the transport.
	///
	/// Lower values reduce latency at the cost of CPU usage.
	pub poll_interval: Duration,

	/// Maximum time `disconnect()` waits for the reader to stop before abandoning it.
	pub shutdown_timeout: Duration,

	/// Time to wait after opening the port before starting the reader.
	///
	/// Many boards reset when the port is opened.
	pub settle_time: Duration,

	/// Terminator appended to every command.
	pub line_terminator: String,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			baud_rate: DEFAULT_BAUD_RATE,
			default_port: DEFAULT_PORT.into(),
			port_exclusions: Vec::new(),
			read_timeout: Duration::from_millis(400),
			poll_interval: Duration::from_millis(100),
			shutdown_timeout: Duration::from_secs(1),
			settle_time: Duration::from_millis(100),
			line_terminator: "\r\n".into(),
		}
	}
}

impl MonitorConfig {
	/// Set the baud rate.
	pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
		self.baud_rate = baud_rate;
		self
	}

	/// Set the fallback port.
	pub fn with_default_port(mut self, port: impl Into<String>) -> Self {
		self.default_port = port.into();
		self
	}

	/// Add a port exclusion pattern.
	pub fn with_port_exclusion(mut self, pattern: impl Into<String>) -> Self {
		self.port_exclusions.push(pattern.into());
		self
	}

	/// Set the read timeout.
	pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
		self.read_timeout = timeout;
		self
	}

	/// Set the poll interval.
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	/// Set the shutdown timeout.
	pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
		self.shutdown_timeout = timeout;
		self
	}

	/// Set the settle time after opening the port.
	pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
		self.settle_time = settle_time;
		self
	}

	/// Set the command line terminator.
	pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
		self.line_terminator = terminator.into();
		self
	}
}
