use serial_monitor::{available_ports, resolve_port, ConnectionManager, MonitorConfig, PreferredPortSelector};
use std::sync::mpsc;
use std::time::Duration;

fn main() {
	if do_main().is_err() {
		std::process::exit(1);
	}
}

fn print_usage() {
	eprintln!("usage: home [PORT [BAUD-RATE]]");
}

fn do_main() -> Result<(), ()> {
	let mut args = std::env::args().skip(1);

	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let mut config = MonitorConfig::default();
	let preferred = args.next().unwrap_or_else(|| config.default_port.clone());
	if let Some(baud_rate) = args.next() {
		config.baud_rate = baud_rate.parse().map_err(|_| {
			eprintln!("invalid baud rate: {}", baud_rate);
			print_usage();
		})?;
	}

	let candidates = available_ports().map_err(|e| eprintln!("Failed to list serial ports: {}", e))?;
	let port = resolve_port(&PreferredPortSelector::new(preferred), &candidates, &config);

	let (sender, receiver) = mpsc::channel();
	let printer = ConnectionManager::for_port(port.as_str(), sender, config);
	printer
		.connect()
		.map_err(|e| eprintln!("Failed to connect to {}: {}", port, e))?;
	printer.write_command("G28").map_err(|e| eprintln!("{}", e))?;

	// Homing can take a while, the printer answers "ok" when it is done.
	while let Ok(message) = receiver.recv_timeout(Duration::from_secs(10)) {
		println!("{}", message);
		if message.text() == "ok" {
			break;
		}
	}

	printer.disconnect().map_err(|e| eprintln!("{}", e))?;
	println!("Runtime: {:.3?}", printer.runtime());
	Ok(())
}
