//! Vault HTTP client
//!
//! Path-addressed key/value operations plus the AppRole login and the
//! transit-encryption sub-API. The session token is obtained once at login
//! and is not auto-renewed; an expired token surfaces as an authentication
//! error and the client must be rebuilt.

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cf::http::{build_client, sanitize_for_log};
use crate::codec;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct AuthResponse {
    auth: AuthData,
}

#[derive(Deserialize)]
struct AuthData {
    client_token: String,
}

/// KV response envelope for reads.
#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Map<String, Value>,
}

/// KV response envelope for listings.
#[derive(Deserialize)]
struct ListResponse {
    data: ListKeys,
}

#[derive(Deserialize)]
struct ListKeys {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct TransitResponse {
    data: TransitData,
}

#[derive(Deserialize)]
struct TransitData {
    ciphertext: String,
}

/// Client for a Vault-style secret store.
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl VaultClient {
    /// Create a client with an existing session token.
    pub fn with_token(base_url: &str, token: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Some(token.to_string()),
            http: build_client()?,
        })
    }

    /// Exchange an AppRole credential pair for a session token.
    pub async fn approle_login(base_url: &str, role_id: &str, secret_id: &str) -> Result<Self> {
        let mut client = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            http: build_client()?,
        };

        let url = client.api_url("auth/approle/login");
        tracing::debug!("POST {}", url);
        let response = client
            .http
            .post(&url)
            .json(&serde_json::json!({
                "role_id": role_id,
                "secret_id": secret_id,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!("approle login rejected: {}", status);
            return Err(Error::Authentication { status, body });
        }

        let auth: AuthResponse = serde_json::from_str(&body)?;
        client.token = Some(auth.auth.client_token);
        tracing::info!("vault session established");
        Ok(client)
    }

    /// Discard the session token. Later operations fail with an
    /// authentication error until a new client is built.
    pub fn logout(&mut self) {
        self.token = None;
        tracing::info!("vault session closed");
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn session_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(Error::Authentication {
            status: StatusCode::UNAUTHORIZED,
            body: "no active vault session".to_string(),
        })
    }

    /// Read the fields stored at a path. `None` when the path has no value.
    pub async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>> {
        let url = self.api_url(path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", self.session_token()?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check_status(response).await?;
        let read: ReadResponse = serde_json::from_str(&body)?;
        Ok(Some(read.data))
    }

    /// Write fields to a path, overwriting the value stored there.
    pub async fn write(&self, path: &str, fields: &Value) -> Result<()> {
        let url = self.api_url(path);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("X-Vault-Token", self.session_token()?)
            .json(fields)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// List the direct children of a path. Directory children carry a
    /// trailing slash. `None` when the path is not listable (a leaf, or
    /// nothing stored beneath it).
    pub async fn list(&self, path: &str) -> Result<Option<Vec<String>>> {
        let url = self.api_url(path);
        tracing::debug!("LIST {}", url);

        let response = self
            .http
            .request(Method::from_bytes(b"LIST").unwrap_or(Method::GET), &url)
            .header("X-Vault-Token", self.session_token()?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check_status(response).await?;
        let list: ListResponse = serde_json::from_str(&body)?;
        Ok(Some(list.data.keys))
    }

    /// Delete the value at a path. Deleting an absent path is a no-op.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.api_url(path);
        tracing::debug!("DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .header("X-Vault-Token", self.session_token()?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    /// Encrypt plaintext with a named transit key. One-directional: the
    /// ciphertext comes back, the key never does, and no decrypt is offered
    /// here.
    pub async fn transit_encrypt(
        &self,
        transit_mount: &str,
        key_name: &str,
        plaintext: &[u8],
    ) -> Result<String> {
        let url = self.api_url(&format!(
            "{}/encrypt/{}",
            transit_mount.trim_matches('/'),
            key_name
        ));
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("X-Vault-Token", self.session_token()?)
            .json(&serde_json::json!({
                "plaintext": codec::encode_url_safe(plaintext),
            }))
            .send()
            .await?;

        let body = check_status(response).await?;
        let transit: TransitResponse = serde_json::from_str(&body)?;
        Ok(transit.data.ciphertext)
    }
}

async fn check_status(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        tracing::error!("vault error: {} - {}", status, sanitize_for_log(&body));
        return Err(Error::Resource { status, body });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_joins_once() {
        let client = VaultClient::with_token("http://vault:8200/", "t").unwrap();
        assert_eq!(
            client.api_url("/secret/app/config"),
            "http://vault:8200/v1/secret/app/config"
        );
    }

    #[test]
    fn test_logged_out_client_has_no_session() {
        let mut client = VaultClient::with_token("http://vault:8200", "t").unwrap();
        client.logout();
        assert!(client.session_token().is_err());
    }
}
