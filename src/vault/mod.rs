//! Vault secret store module
//!
//! - [`client`] - HTTP client: AppRole login, KV read/write/list/delete,
//!   transit encryption
//! - [`walker`] - Tree walker bootstrapped from a CF service binding

pub mod client;
pub mod walker;
