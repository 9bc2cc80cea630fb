//! cfvault - Cloud Foundry API and Vault secrets client
//!
//! Two cooperating clients behind one crate:
//!
//! - [`cf`] talks to the Cloud Foundry v2 API: a UAA bearer session with
//!   transparent login/refresh, cursor-following pagination over list
//!   endpoints, name-to-guid resolution, and the create/delete/bind
//!   operations around apps and service instances.
//! - [`vault`] walks a Vault-style secret tree whose AppRole credentials
//!   live in a CF service binding: recursive listing, per-leaf
//!   read/write/delete, base64 file transport, and transit encryption.
//!
//! Reporting, CLIs and other front ends sit on top of these records and
//! operations; nothing in the crate prints, prompts, or formats output.

pub mod cf;
pub mod codec;
pub mod config;
pub mod error;
pub mod vault;

pub use cf::client::CfClient;
pub use cf::resource::{Filters, Resource};
pub use cf::token::UaaCredentials;
pub use config::Settings;
pub use error::{Error, Result};
pub use vault::client::VaultClient;
pub use vault::walker::{SecretsWalker, ServiceCredentialBundle};
