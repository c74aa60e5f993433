//! Connection and read-loop manager for line based serial devices, like 3D printers and other G-code machines.
//!
//! A [`ConnectionManager`] owns a [`Transport`] and, while connected, a single background thread that polls
//! the transport for lines of text.
//! Every received line is timestamped with a [`Clock`] and delivered to a [`Sink`] as a [`ReceivedMessage`].
//! Commands are written with a [`CommandWriter`], which can be cloned and used from any thread.
//!
//! The [`SerialTransport`] adapter talks to a real serial port using the `serial2` crate.
//! Other transports can be used by implementing the [`Transport`] trait.
//!
//! ```no_run
//! # #[cfg(feature = "serial2")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use serial_monitor::{ConnectionManager, MonitorConfig};
//! use std::sync::mpsc;
//!
//! let (sender, receiver) = mpsc::channel();
//! let monitor = ConnectionManager::for_port("/dev/ttyACM0", sender, MonitorConfig::default());
//! monitor.connect()?;
//! monitor.write_command("G28")?;
//! for message in receiver.iter().take(3) {
//! 	println!("{}", message);
//! }
//! monitor.disconnect()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial2"))]
//! # fn main() {}
//! ```

#[macro_use]
mod log;

pub mod clock;
pub mod config;
pub mod error;
pub mod port_select;
pub mod sink;
pub mod transport;

mod manager;
mod reader;
mod writer;

pub use crate::clock::{Clock, SystemClock, Timestamp};
pub use crate::config::MonitorConfig;
pub use crate::error::{
	ConnectError, DecodeError, NotConnectedError, PollError, ShutdownTimeoutError, TransportError, WriteCommandError,
};
pub use crate::log::Logger;
pub use crate::manager::{ConnectionManager, ConnectionState};
pub use crate::port_select::{resolve_port, PortSelector, PreferredPortSelector};
pub use crate::reader::ReaderState;
pub use crate::sink::{FnSink, ReceivedMessage, Sink};
pub use crate::transport::Transport;
pub use crate::writer::CommandWriter;

#[cfg(feature = "serial2")]
pub use crate::transport::serial2::{available_ports, SerialTransport};
