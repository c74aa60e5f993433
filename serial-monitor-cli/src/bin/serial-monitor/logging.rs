//! Log output for the command line tool.
//!
//! Library records carry the component that emitted them in their target, like `serial_monitor::reader`.
//! The component is shown in front of the message, so reader, writer and manager output can be told apart.

use env_logger::fmt::{Color, Formatter};
use std::io::Write;

/// Target prefix of the records emitted by the library.
const LIBRARY_TARGET: &str = "serial_monitor";

pub fn init(verbosity: u8) {
	let log_level = match verbosity {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};

	env_logger::Builder::new()
		.format(format_record)
		.filter_level(log::LevelFilter::Warn)
		.filter_module(LIBRARY_TARGET, log_level)
		.parse_default_env()
		.init();
}

/// The component of a library record, or `None` for records of the tool itself.
fn component(target: &str) -> Option<&str> {
	target
		.strip_prefix(LIBRARY_TARGET)?
		.strip_prefix("::")
		.map(|rest| rest.split("::").next().unwrap_or(rest))
}

fn format_record(buffer: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
	let mut level_style = buffer.style();
	let level = match record.level() {
		log::Level::Error => {
			level_style.set_color(Color::Red).set_bold(true);
			"Error: "
		},
		log::Level::Warn => {
			level_style.set_color(Color::Yellow).set_bold(true);
			"Warning: "
		},
		_ => "",
	};

	match component(record.target()) {
		Some(component) => {
			let mut component_style = buffer.style();
			component_style.set_dimmed(true);
			writeln!(
				buffer,
				"{}{} {}",
				level_style.value(level),
				component_style.value(format!("[{}]", component)),
				record.args()
			)
		},
		None => writeln!(buffer, "{}{}", level_style.value(level), record.args()),
	}
}
