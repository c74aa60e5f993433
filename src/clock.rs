//! Timestamps for received lines.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// The moment a line was received.
///
/// A timestamp holds both the monotonic time elapsed since the clock was started
/// and the corresponding wall clock time.
/// Timestamps are ordered by their monotonic component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
	elapsed: Duration,
	wall: DateTime<Local>,
}

impl Timestamp {
	/// Create a timestamp from its monotonic offset and wall clock time.
	pub fn new(elapsed: Duration, wall: DateTime<Local>) -> Self {
		Self { elapsed, wall }
	}

	/// The monotonic time elapsed since the clock was started.
	pub fn elapsed(&self) -> Duration {
		self.elapsed
	}

	/// The wall clock time.
	pub fn wall(&self) -> DateTime<Local> {
		self.wall
	}

	/// The wall clock time as microseconds since the Unix epoch.
	pub fn unix_micros(&self) -> i64 {
		self.wall.timestamp_micros()
	}
}

impl std::fmt::Display for Timestamp {
	/// Formats the wall clock time as `HH:MM:SS:ffffff`.
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.wall.format("%H:%M:%S:%6f"))
	}
}

/// Source of timestamps for received lines.
pub trait Clock: Send + Sync {
	/// Get the current time.
	///
	/// Successive calls must never return a smaller timestamp.
	fn now(&self) -> Timestamp;

	/// Time elapsed since the clock was started.
	fn runtime(&self) -> Duration {
		self.now().elapsed()
	}
}

/// Clock based on [`Instant`] and the local wall clock.
///
/// The wall clock time is only sampled once, when the clock is created.
/// Later timestamps add the monotonic elapsed time to it,
/// so adjustments of the system clock can not make timestamps go backwards.
#[derive(Debug, Clone)]
pub struct SystemClock {
	start: Instant,
	started_at: DateTime<Local>,
}

impl SystemClock {
	/// Start a new clock.
	pub fn new() -> Self {
		Self {
			start: Instant::now(),
			started_at: Local::now(),
		}
	}

	/// The wall clock time at which the clock was started.
	pub fn started_at(&self) -> DateTime<Local> {
		self.started_at
	}
}

impl Default for SystemClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		let elapsed = self.start.elapsed();
		let wall = match chrono::Duration::from_std(elapsed) {
			Ok(offset) => self.started_at + offset,
			Err(_) => Local::now(),
		};
		Timestamp::new(elapsed, wall)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;
	use chrono::TimeZone;

	#[test]
	fn system_clock_never_goes_backwards() {
		let clock = SystemClock::new();
		let mut previous = clock.now();
		for _ in 0..1000 {
			let now = clock.now();
			assert!(now >= previous);
			assert!(now.wall() >= previous.wall());
			previous = now;
		}
	}

	#[test]
	fn wall_time_follows_elapsed_time() {
		let clock = SystemClock::new();
		std::thread::sleep(Duration::from_millis(5));
		let now = clock.now();
		assert!(now.elapsed() >= Duration::from_millis(5));
		assert!(now.wall() - clock.started_at() >= chrono::Duration::milliseconds(5));
		assert!(clock.runtime() >= now.elapsed());
	}

	#[test]
	fn display_uses_hours_minutes_seconds_micros() {
		let wall = Local.with_ymd_and_hms(2024, 3, 1, 7, 8, 9).unwrap() + chrono::Duration::microseconds(42);
		let timestamp = Timestamp::new(Duration::ZERO, wall);
		assert!(timestamp.to_string() == "07:08:09:000042");
		assert!(timestamp.unix_micros() == wall.timestamp_micros());
	}
}
