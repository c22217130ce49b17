//! Pond Arena Server Library
//!
//! Authoritative server for a four-player pond game over WebTransport.
//!
//! # Features
//!
//! - `metrics_endpoint` - Prometheus/JSON metrics HTTP endpoint (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
