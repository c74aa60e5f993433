use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use serial_monitor::port_select::is_excluded;
use serial_monitor::{
	resolve_port, CommandWriter, ConnectionManager, FnSink, MonitorConfig, PortSelector, PreferredPortSelector,
	ReceivedMessage, SerialTransport,
};

mod logging;
mod options;

use options::{Command, Options};

type Monitor = ConnectionManager<SerialTransport>;

fn main() {
	if let Err(()) = do_main(clap::Parser::parse()) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	logging::init(options.verbose);
	let config = options.monitor_config();
	match &options.command {
		Command::List => {
			list_ports(&options.serial_port, &config)?;
		},
		Command::Monitor {
			keep_alive,
			keep_alive_interval_ms,
		} => {
			let monitor = connect(&options.serial_port, config)?;
			let keep_alive = keep_alive.as_ref().map(|command| {
				let interval = Duration::from_millis(*keep_alive_interval_ms);
				log::debug!("Sending {:?} every {:?}", command, interval);
				spawn_keep_alive(monitor.writer(), command.clone(), interval)
			});

			for line in std::io::stdin().lock().lines() {
				let line = line.map_err(|e| log::error!("Failed to read from standard input: {}", e))?;
				let command = line.trim();
				if !command.is_empty() {
					// Failed writes are logged by the writer.
					let _ = monitor.write_command(command);
				}
			}

			if let Some((stop, thread)) = keep_alive {
				drop(stop);
				let _ = thread.join();
			}
			disconnect(&monitor);
		},
		Command::Send { commands, listen_ms } => {
			let monitor = connect(&options.serial_port, config)?;
			for command in commands {
				monitor
					.write_command(command)
					.map_err(|e| log::error!("Command {:?} failed: {}", command, e))?;
			}
			std::thread::sleep(Duration::from_millis(*listen_ms));
			disconnect(&monitor);
		},
		Command::ShellCompletion { shell, output } => {
			write_shell_completion(*shell, output.as_deref())?;
		},
	}

	Ok(())
}

fn available_ports() -> Vec<String> {
	serial_monitor::available_ports().unwrap_or_else(|e| {
		log::warn!("Failed to list serial ports: {}", e);
		Vec::new()
	})
}

fn list_ports(preferred: &str, config: &MonitorConfig) -> Result<(), ()> {
	let ports = serial_monitor::available_ports().map_err(|e| log::error!("Failed to list serial ports: {}", e))?;
	if ports.is_empty() {
		log::info!("No serial ports found");
		return Ok(());
	}

	let selected = PreferredPortSelector::new(preferred).select_port(&ports, &config.port_exclusions);
	for port in &ports {
		if selected.as_deref() == Some(port.as_str()) {
			println!("{} (selected)", port);
		} else if is_excluded(port, &config.port_exclusions) {
			println!("{} (excluded)", port);
		} else {
			println!("{}", port);
		}
	}
	Ok(())
}

fn print_message(message: ReceivedMessage) {
	println!("{}", message);
}

fn connect(preferred: &str, config: MonitorConfig) -> Result<Monitor, ()> {
	let port = resolve_port(&PreferredPortSelector::new(preferred), &available_ports(), &config);
	log::debug!("Using serial port {} with baud rate {}", port, config.baud_rate);

	let monitor = ConnectionManager::for_port(port.as_str(), FnSink(print_message), config);
	monitor
		.connect()
		.map_err(|e| log::error!("Failed to connect to {}: {}", port, e))?;
	Ok(monitor)
}

fn disconnect(monitor: &Monitor) {
	// A reader that fails to stop is reported by the manager.
	let _ = monitor.disconnect();
	log::info!("Runtime: {:.3?}", monitor.runtime());
}

/// Write a command periodically until the returned sender is dropped.
fn spawn_keep_alive(
	writer: CommandWriter<SerialTransport>,
	command: String,
	interval: Duration,
) -> (mpsc::Sender<()>, JoinHandle<()>) {
	let (stop, stopped) = mpsc::channel::<()>();
	let thread = std::thread::spawn(move || {
		while let Err(mpsc::RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
			let _ = writer.write_command(&command);
		}
	});
	(stop, thread)
}

fn write_shell_completion(shell: clap_complete::Shell, path: Option<&Path>) -> Result<(), ()> {
	use clap::CommandFactory;
	use std::io::Write;

	let mut script = Vec::new();
	clap_complete::generate(shell, &mut Options::command(), env!("CARGO_BIN_NAME"), &mut script);

	match path {
		None => std::io::stdout()
			.write_all(&script)
			.map_err(|e| log::error!("Failed to write {} completion to stdout: {}", shell, e)),
		Some(path) => {
			std::fs::write(path, &script).map_err(|e| log::error!("Failed to write {}: {}", path.display(), e))?;
			log::info!("Wrote {} completion to {}", shell, path.display());
			Ok(())
		},
	}
}
