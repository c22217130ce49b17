use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

// Used when TLS_CERT_PATH / TLS_KEY_PATH are unset
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Certificate and key for the WebTransport endpoint
pub struct TlsIdentity {
    pub identity: Identity,
    /// Base64 SHA-256 of the leaf certificate (browser SPKI flag)
    pub cert_hash: String,
}

/// Certificate and key paths from config, or the dev defaults
pub fn resolve_paths(config: &ServerConfig) -> (&str, &str) {
    match (config.tls_cert_path.as_deref(), config.tls_key_path.as_deref()) {
        (Some(cert), Some(key)) => (cert, key),
        _ => (DEV_CERT_FILE, DEV_KEY_FILE),
    }
}

impl TlsIdentity {
    /// Load the PEM pair named by `config`
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        let (cert_path, key_path) = resolve_paths(config);
        if !Path::new(cert_path).exists() || !Path::new(key_path).exists() {
            bail!(
                "TLS certificate not found: expected {} and {}. \
                Set TLS_CERT_PATH and TLS_KEY_PATH or place a dev pair under certs/",
                cert_path,
                key_path
            );
        }

        info!("Loading TLS certificate from {}", cert_path);
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .with_context(|| format!("Failed to load certificate from {} / {}", cert_path, key_path))?;

        let cert_hash = identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| hash_der(cert.der()))
            .unwrap_or_default();

        Ok(Self { identity, cert_hash })
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Base64 SHA-256 of DER bytes
pub fn hash_der(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}
