use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::tick::TICK_RATE;

/// Configuration rejected by `validate`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} cannot be 0")]
    ZeroPort { name: &'static str },
    #[error("PORT and METRICS_PORT must differ (both {0})")]
    PortClash(u16),
    #[error("TICK_RATE must be 1-240, got {0}")]
    TickRate(u32),
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// WebTransport port
    pub port: u16,
    /// Port for the Prometheus/JSON endpoint
    pub metrics_port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// PEM certificate; `certs/cert.pem` when unset
    pub tls_cert_path: Option<String>,
    /// PEM private key; `certs/key.pem` when unset
    pub tls_key_path: Option<String>,
    /// Fixed seed for session randomness (reproducible runs)
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            metrics_port: 9090,
            tick_rate: TICK_RATE,
            tls_cert_path: None,
            tls_key_path: None,
            rng_seed: None,
        }
    }
}

/// Parse `raw` for `name`, warning and keeping the default on failure
fn parse_or_warn<T: FromStr>(name: &str, raw: &str, accept: impl Fn(&T) -> bool) -> Option<T> {
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} '{}' out of range, using default", name, raw);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back per key
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("BIND_ADDRESS") {
            if let Some(addr) = parse_or_warn("BIND_ADDRESS", &raw, |_: &IpAddr| true) {
                config.bind_address = addr;
            }
        }

        if let Some(raw) = lookup("PORT") {
            if let Some(port) = parse_or_warn("PORT", &raw, |p: &u16| *p > 0) {
                config.port = port;
            }
        }

        if let Some(raw) = lookup("METRICS_PORT") {
            if let Some(port) = parse_or_warn("METRICS_PORT", &raw, |p: &u16| *p > 0) {
                config.metrics_port = port;
            }
        }

        if let Some(raw) = lookup("TICK_RATE") {
            if let Some(rate) = parse_or_warn("TICK_RATE", &raw, |r: &u32| (1..=240).contains(r)) {
                config.tick_rate = rate;
            }
        }

        if let Some(raw) = lookup("SIM_SEED") {
            config.rng_seed = parse_or_warn("SIM_SEED", &raw, |_: &u64| true);
        }

        config.tls_cert_path = lookup("TLS_CERT_PATH").filter(|p| !p.is_empty());
        config.tls_key_path = lookup("TLS_KEY_PATH").filter(|p| !p.is_empty());

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort { name: "PORT" });
        }
        if self.metrics_port == 0 {
            return Err(ConfigError::ZeroPort { name: "METRICS_PORT" });
        }
        if self.port == self.metrics_port {
            return Err(ConfigError::PortClash(self.port));
        }
        if !(1..=240).contains(&self.tick_rate) {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(ConfigError::PartialTls);
        }
        Ok(())
    }

    /// Period between simulation ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}
