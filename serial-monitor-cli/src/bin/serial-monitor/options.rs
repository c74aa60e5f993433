use std::path::PathBuf;
use std::time::Duration;

use serial_monitor::MonitorConfig;

/// Monitor and control line based serial devices, like 3D printers.
///
/// The serial port can be given as a full path or as a part of the name, like "ACM" or "COM4".
/// The first available port that matches and is not excluded is used.
#[derive(clap::Parser)]
#[command(author, version)]
pub struct Options {
	/// Print more messages, can be used multiple times.
	#[arg(long, short, global = true)]
	#[arg(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial port to use.
	#[arg(long, short, global = true)]
	#[arg(default_value = serial_monitor::config::DEFAULT_PORT)]
	pub serial_port: String,

	/// The baud rate of the serial port.
	#[arg(long, short, global = true)]
	#[arg(default_value_t = serial_monitor::config::DEFAULT_BAUD_RATE)]
	pub baud_rate: u32,

	/// Time to wait for the rest of a line once data is pending.
	#[arg(long, global = true, value_name = "MS")]
	#[arg(default_value_t = 400)]
	pub read_timeout_ms: u64,

	/// Time to sleep between two polls of the serial port.
	#[arg(long, global = true, value_name = "MS")]
	#[arg(default_value_t = 100)]
	pub poll_interval_ms: u64,

	/// Time to wait for the line reader to stop when disconnecting.
	#[arg(long, global = true, value_name = "MS")]
	#[arg(default_value_t = 1000)]
	pub shutdown_timeout_ms: u64,

	/// Never select ports whose name contains this pattern, can be used multiple times.
	#[arg(long = "exclude", global = true, value_name = "PATTERN")]
	pub exclusions: Vec<String>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
	/// List the serial ports on this system.
	List,

	/// Print all lines received from the device.
	///
	/// Every line read from standard input is sent to the device as a command.
	/// The monitor disconnects when standard input is closed.
	Monitor {
		/// Command to send periodically, for example "M105".
		#[arg(long, value_name = "COMMAND")]
		keep_alive: Option<String>,

		/// Interval between two keep-alive commands.
		#[arg(long, value_name = "MS")]
		#[arg(default_value_t = 2000)]
		keep_alive_interval_ms: u64,
	},

	/// Send commands to the device and print the response.
	Send {
		/// The commands to send, for example "G28".
		#[arg(required = true)]
		commands: Vec<String>,

		/// Time to listen for lines after sending the last command.
		#[arg(long, value_name = "MS")]
		#[arg(default_value_t = 2000)]
		listen_ms: u64,
	},

	/// Write shell completions to standard output or a file.
	ShellCompletion {
		/// The shell for which to generate completions.
		#[arg(long)]
		shell: clap_complete::Shell,

		/// The file to write the generated completion file to.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
}

impl Options {
	pub fn monitor_config(&self) -> MonitorConfig {
		let mut config = MonitorConfig::default()
			.with_baud_rate(self.baud_rate)
			.with_default_port(self.serial_port.as_str())
			.with_read_timeout(Duration::from_millis(self.read_timeout_ms))
			.with_poll_interval(Duration::from_millis(self.poll_interval_ms))
			.with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms));
		config.port_exclusions = self.exclusions.clone();
		config
	}
}
