//! UAA Authentication
//!
//! Owns the OAuth2 bearer session for the Cloud Foundry API: password-grant
//! login, transparent refresh on expiry, and atomic session updates.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::codec;
use crate::error::{Error, Result};

/// Token expiry margin - treat tokens as expired this much before the server
/// does, so a token never lapses mid-request.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth client the CF CLI registers with UAA; the secret is empty.
pub const DEFAULT_CLIENT_ID: &str = "cf";

/// A bearer session as returned by the UAA token endpoint.
///
/// Mutated only by login/refresh, always replaced as one unit; a partially
/// updated token/refresh/expiry tuple is never observable.
#[derive(Clone)]
struct Session {
    access_token: String,
    refresh_token: String,
    /// Server-reported lifetime minus [`TOKEN_EXPIRY_MARGIN`].
    expires_at: Instant,
}

impl Session {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

enum Renewal {
    Login,
    Refresh(String),
}

/// UAA credentials holder with a cached bearer session.
pub struct UaaCredentials {
    login_url: String,
    username: String,
    password: String,
    client_id: String,
    client_secret: String,
    http: Client,
    session: Mutex<Option<Session>>,
}

impl UaaCredentials {
    /// Create credentials for the standard `cf` OAuth client.
    ///
    /// `login_url` is the UAA base URL including scheme, without a trailing
    /// slash (e.g. `https://login.sys.example.com`).
    pub fn new(login_url: &str, username: &str, password: &str, http: Client) -> Self {
        Self::with_client(
            login_url,
            username,
            password,
            DEFAULT_CLIENT_ID,
            "",
            http,
        )
    }

    /// Create credentials for a non-default OAuth client pair.
    pub fn with_client(
        login_url: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
        http: Client,
    ) -> Self {
        Self {
            login_url: login_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
            session: Mutex::new(None),
        }
    }

    /// Return a currently-valid access token, logging in or refreshing as
    /// needed.
    ///
    /// This is the single synchronization point guarding token state: the
    /// whole check-then-renew sequence runs under one lock, so concurrent
    /// callers never trigger overlapping refreshes. A failed refresh is
    /// surfaced as [`Error::Authentication`] and does not fall back to a
    /// fresh login; the caller must restart the session.
    pub async fn ensure_valid(&self) -> Result<String> {
        let mut guard = self.session.lock().await;

        let renewal = match guard.as_ref() {
            None => Renewal::Login,
            Some(session) if !session.is_valid() => {
                tracing::debug!("access token expired, refreshing");
                Renewal::Refresh(session.refresh_token.clone())
            }
            Some(session) => return Ok(session.access_token.clone()),
        };

        let session = match renewal {
            Renewal::Login => self.login().await?,
            Renewal::Refresh(refresh_token) => self.refresh(&refresh_token).await?,
        };

        let token = session.access_token.clone();
        *guard = Some(session);
        Ok(token)
    }

    /// Drop the session. The next [`ensure_valid`](Self::ensure_valid)
    /// performs a fresh login.
    pub async fn invalidate(&self) {
        let mut guard = self.session.lock().await;
        *guard = None;
    }

    async fn login(&self) -> Result<Session> {
        let url = format!("{}/oauth/token", self.login_url);
        tracing::debug!("POST {} (password grant)", url);

        let form = [
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let response = self
            .http
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                codec::basic_auth(&self.client_id, &self.client_secret),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        self.parse_token_response(response).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/oauth/token", self.login_url);
        tracing::debug!("POST {} (refresh grant)", url);

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        self.parse_token_response(response).await
    }

    async fn parse_token_response(&self, response: reqwest::Response) -> Result<Session> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("token request rejected: {}", status);
            return Err(Error::Authentication { status, body });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(Session {
            expires_at: expiry_instant(token.expires_in),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }
}

/// Compute the local expiry instant for a server-reported lifetime.
fn expiry_instant(expires_in: u64) -> Instant {
    let usable = expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN.as_secs());
    Instant::now() + Duration::from_secs(usable)
}
