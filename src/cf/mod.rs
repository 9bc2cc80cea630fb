//! Cloud Foundry API interaction module
//!
//! This module provides the core functionality for interacting with the
//! Cloud Foundry v2 API, including UAA authentication, the HTTP transport,
//! and paginated resource operations.
//!
//! # Module Structure
//!
//! - [`token`] - UAA bearer session with transparent login/refresh
//! - [`http`] - HTTP utilities for REST API calls
//! - [`resource`] - Record envelopes and server-side filters
//! - [`client`] - Main client for paginated resource operations
//!
//! # Example
//!
//! ```ignore
//! use cfvault::cf::client::CfClient;
//! use cfvault::cf::resource::Filters;
//! use cfvault::cf::token::UaaCredentials;
//!
//! async fn example() -> cfvault::Result<()> {
//!     let http = cfvault::cf::http::build_client()?;
//!     let creds = UaaCredentials::new("https://login.example.com", "user", "pw", http);
//!     let client = CfClient::new("https://api.example.com", creds)?
//!         .with_context("my-org", Some("dev"))
//!         .await?;
//!     let apps = client.apps(&Filters::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod resource;
pub mod token;
