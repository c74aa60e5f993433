//! Choosing the serial port to connect to.

use crate::MonitorConfig;

/// Picks a port from the ports available on the system.
pub trait PortSelector {
	/// Select one of the candidates, ignoring excluded ports.
	///
	/// A candidate is excluded if its name contains one of the exclusion patterns.
	fn select_port(&self, candidates: &[String], exclusions: &[String]) -> Option<String>;
}

/// Selects the first candidate whose name contains the preferred name.
///
/// The preferred name can be a full path like `/dev/ttyACM0` or just a part of it, like `ACM` or `COM4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferredPortSelector {
	preferred: String,
}

impl PreferredPortSelector {
	pub fn new(preferred: impl Into<String>) -> Self {
		Self { preferred: preferred.into() }
	}

	pub fn preferred(&self) -> &str {
		&self.preferred
	}
}

/// Check if a port matches any of the exclusion patterns.
pub fn is_excluded(port: &str, exclusions: &[String]) -> bool {
	exclusions.iter().any(|pattern| !pattern.is_empty() && port.contains(pattern.as_str()))
}

impl PortSelector for PreferredPortSelector {
	fn select_port(&self, candidates: &[String], exclusions: &[String]) -> Option<String> {
		if self.preferred.is_empty() {
			return None;
		}
		candidates
			.iter()
			.filter(|port| !is_excluded(port, exclusions))
			.find(|port| port.contains(self.preferred.as_str()))
			.cloned()
	}
}

/// Choose the port to connect to, falling back to the configured default port.
pub fn resolve_port(selector: &dyn PortSelector, candidates: &[String], config: &MonitorConfig) -> String {
	selector
		.select_port(candidates, &config.port_exclusions)
		.unwrap_or_else(|| config.default_port.clone())
}
