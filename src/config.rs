//! Upstream and simulation configuration

use std::time::Duration;

use crate::error::{Error, Result};

/// Connection settings for the upstream MeOS information server.
#[derive(Debug, Clone)]
pub struct MeosConfig {
    pub hostname: String,
    /// `None` omits the port from the URL entirely.
    pub port: Option<u16>,
    pub poll_interval: Duration,
    pub https: bool,
}

impl Default for MeosConfig {
    fn default() -> Self {
        MeosConfig {
            hostname: "localhost".to_string(),
            port: Some(2009),
            poll_interval: Duration::from_secs(1),
            https: false,
        }
    }
}

impl MeosConfig {
    /// Validate hostname syntax and poll interval bounds.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(Error::Config("hostname cannot be empty".to_string()));
        }
        if !is_valid_hostname(&self.hostname) && self.hostname.parse::<std::net::IpAddr>().is_err()
        {
            return Err(Error::Config(format!(
                "invalid hostname or IP address: {}",
                self.hostname
            )));
        }
        if self.poll_interval < Duration::from_millis(100) {
            return Err(Error::Config(format!(
                "poll interval too small (minimum 100ms): {:?}",
                self.poll_interval
            )));
        }
        if self.poll_interval > Duration::from_secs(3600) {
            return Err(Error::Config(format!(
                "poll interval too large (maximum 1 hour): {:?}",
                self.poll_interval
            )));
        }
        Ok(())
    }

    /// Base URL of the MOP endpoint, without the query string.
    pub fn endpoint(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}/meos", scheme, self.hostname, port),
            None => format!("{}://{}/meos", scheme, self.hostname),
        }
    }
}

/// Timing and roster settings for the simulation generator.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Total cycle duration; the simulation resets when it elapses.
    pub duration: Duration,
    pub phase_start: Duration,
    pub phase_running: Duration,
    pub phase_results: Duration,
    /// Everyone starts together instead of staggered.
    pub mass_start: bool,
    pub num_classes: usize,
    pub runners_per_class: usize,
    pub radio_controls: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            duration: Duration::from_secs(15 * 60),
            phase_start: Duration::from_secs(3 * 60),
            phase_running: Duration::from_secs(7 * 60),
            phase_results: Duration::from_secs(5 * 60),
            mass_start: false,
            num_classes: 3,
            runners_per_class: 20,
            radio_controls: 3,
        }
    }
}

fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.len() > 253 {
        return false;
    }
    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
