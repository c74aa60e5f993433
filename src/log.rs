//! Logging support.
//!
//! Log records go through the [`log`](https://docs.rs/log) facade when the `log` feature is enabled,
//! and compile to nothing otherwise.
//! Components do not log to a global target: each one is handed a [`Logger`] when it is constructed,
//! and every record it emits uses the target of that logger.

use std::sync::Arc;

/// Logging context handed to each component.
///
/// A logger is nothing more than a log target.
/// Hosts can filter or route the records of each component by target,
/// and tests can give every component a target of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Logger {
	target: Arc<str>,
}

impl Logger {
	/// Create a logger that emits records with the given target.
	pub fn new(target: impl Into<Arc<str>>) -> Self {
		Self { target: target.into() }
	}

	/// The target used for log records.
	pub fn target(&self) -> &str {
		&self.target
	}

	/// Create a logger for a sub-component, using `"{target}::{name}"` as target.
	pub fn child(&self, name: &str) -> Self {
		Self::new(format!("{}::{}", self.target, name))
	}
}

impl Default for Logger {
	fn default() -> Self {
		Self::new(env!("CARGO_CRATE_NAME"))
	}
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! trace {
	($($args:tt)*) => { ::log::trace!($($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! debug {
	($($args:tt)*) => { ::log::debug!($($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! info {
	($($args:tt)*) => { ::log::info!($($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! warn {
	($($args:tt)*) => { ::log::warn!($($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! error {
	($($args:tt)*) => { ::log::error!($($args)*) }
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! trace {
	(target: $target:expr, $($args:tt)*) => {{ let _ = $target; }};
	($($args:tt)*) => {};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! debug {
	(target: $target:expr, $($args:tt)*) => {{ let _ = $target; }};
	($($args:tt)*) => {};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! info {
	(target: $target:expr, $($args:tt)*) => {{ let _ = $target; }};
	($($args:tt)*) => {};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! warn {
	(target: $target:expr, $($args:tt)*) => {{ let _ = $target; }};
	($($args:tt)*) => {};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! error {
	(target: $target:expr, $($args:tt)*) => {{ let _ = $target; }};
	($($args:tt)*) => {};
}
