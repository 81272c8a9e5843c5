//! Resource acquirer, payload half: fetch the shared module once and check
//! that it is a WebAssembly module before anything is spawned.

use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const WASM_MAGIC: &[u8; 4] = b"\0asm";
const WASM_CORE_VERSION: [u8; 4] = [1, 0, 0, 0];

/// Immutable shared module bytes.
///
/// Clones share the same read-only buffer; no context can mutate it.
#[derive(Clone)]
pub struct Payload {
    bytes: Arc<[u8]>,
    digest: Arc<str>,
}

impl Payload {
    /// Validate raw bytes as a core WebAssembly module.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        verify_module(&bytes)?;
        let digest = hex::encode(Sha256::digest(&bytes));
        Ok(Self {
            bytes: bytes.into(),
            digest: digest.into(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// True when both values reference the same fetched buffer.
    pub fn same_source(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.bytes.len())
            .field("digest", &&self.digest[..12])
            .finish()
    }
}

/// Where the payload is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    File(PathBuf),
    Http(String),
}

impl PayloadSource {
    /// `http://` and `https://` locations are fetched over HTTP; anything
    /// else is a file path.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Http(location.to_string())
        } else {
            Self::File(PathBuf::from(location))
        }
    }
}

impl std::fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Http(url) => write!(f, "{}", url),
        }
    }
}

/// Fetch and validate the payload.
pub async fn acquire_payload(source: &PayloadSource) -> Result<Payload> {
    let bytes = match source {
        PayloadSource::File(path) => tokio::fs::read(path)
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", path.display(), e)))?,
        PayloadSource::Http(url) => fetch_http(url).await?,
    };
    debug!("Fetched {} bytes from {}", bytes.len(), source);

    let payload = Payload::from_bytes(bytes)?;
    info!(
        "Payload acquired: {} bytes, sha256={}",
        payload.len(),
        payload.digest()
    );
    Ok(payload)
}

async fn fetch_http(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?
        .error_for_status()
        .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?;
    Ok(body.to_vec())
}

/// Check the core-module header, then run the full validator.
pub fn verify_module(bytes: &[u8]) -> Result<()> {
    if bytes.len() < 8 || &bytes[..4] != WASM_MAGIC {
        return Err(Error::Integrity("missing WebAssembly magic header".into()));
    }
    if bytes[4..8] != WASM_CORE_VERSION {
        return Err(Error::Integrity(format!(
            "unsupported module version {:?}",
            &bytes[4..8]
        )));
    }
    wasmparser::Validator::new()
        .validate_all(bytes)
        .map_err(|e| Error::Integrity(format!("invalid module: {}", e)))?;
    Ok(())
}
