//! Base64 transport helpers shared by the CF client and the secrets walker.
//!
//! Binary payloads cross both APIs as base64 text: secret `file` fields use
//! the standard alphabet, transit-encryption plaintext uses the URL-safe
//! alphabet, and the UAA token endpoint wants a Basic credential header.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

use crate::error::Result;

/// Encode raw bytes for storage under a secret `file` field.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a `file` field back to raw bytes.
///
/// Round-trip fidelity with [`encode`] is a hard invariant; any corruption
/// surfaces as a decode error rather than silently truncated content.
pub fn decode(data: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(data.trim())?)
}

/// Encode plaintext for the transit-encryption API, which expects the
/// URL-safe alphabet.
pub fn encode_url_safe(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Build a `Basic` authorization header value from an OAuth client pair.
///
/// The default CF client is `cf` with an empty secret, which yields the
/// well-known `Basic Y2Y6` header.
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    let pair = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", STANDARD.encode(pair.as_bytes()))
}
