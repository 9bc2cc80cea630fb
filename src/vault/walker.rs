//! Secrets tree walker
//!
//! Bootstraps a Vault session out of a Cloud Foundry service binding and
//! walks the path-addressed secret tree under that binding's mount:
//! recursive listing, per-leaf read/write/delete, and base64 file transport.

use serde_json::{json, Value};

use super::client::VaultClient;
use crate::cf::client::CfClient;
use crate::cf::resource::Resource;
use crate::codec;
use crate::error::{Error, Result};

/// Upper bound on LIST calls per tree walk, mirroring the pagination bound
/// on the resource client.
pub const DEFAULT_MAX_LIST_CALLS: usize = 10_000;

/// The fields a secret-service binding must carry to re-establish a Vault
/// session: the AppRole pair and the KV mount the binding is scoped to.
///
/// Produced once per service binding, consumed by the walker's
/// construction-time handshake.
#[derive(Debug, Clone)]
pub struct ServiceCredentialBundle {
    pub role_id: String,
    pub secret_id: String,
    /// KV mount path, with any `v1/` API prefix stripped.
    pub mount: String,
}

impl ServiceCredentialBundle {
    /// Decode the bundle from one service key record.
    pub fn from_binding(binding: &Resource) -> Result<Self> {
        let creds = binding
            .credentials()
            .ok_or(Error::Credentials("credentials"))?;
        let role_id = creds
            .get("role_id")
            .and_then(Value::as_str)
            .ok_or(Error::Credentials("role_id"))?;
        let secret_id = creds
            .get("secret_id")
            .and_then(Value::as_str)
            .ok_or(Error::Credentials("secret_id"))?;
        let secret_path = creds
            .get("service_secret_path")
            .and_then(Value::as_str)
            .ok_or(Error::Credentials("service_secret_path"))?;

        Ok(Self {
            role_id: role_id.to_string(),
            secret_id: secret_id.to_string(),
            mount: normalize_mount(secret_path),
        })
    }

    /// Decode the bundle from the first service key that carries the
    /// required fields.
    pub fn from_bindings(bindings: &[Resource]) -> Result<Self> {
        bindings
            .iter()
            .find_map(|b| Self::from_binding(b).ok())
            .ok_or(Error::Credentials("role_id/secret_id/service_secret_path"))
    }
}

/// Strip the API prefix and surrounding separators from a stored mount path.
fn normalize_mount(raw: &str) -> String {
    let path = raw.trim_matches('/');
    let path = path.strip_prefix("v1/").unwrap_or(path);
    path.trim_matches('/').to_string()
}

/// Join two path segments with single separators; naive concatenation
/// artifacts (`//`, leading/trailing separators) are collapsed.
pub fn join_paths(base: &str, child: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    segments.extend(base.split('/').filter(|s| !s.is_empty()));
    segments.extend(child.split('/').filter(|s| !s.is_empty()));
    segments.join("/")
}

/// Walker over one binding's secret tree.
pub struct SecretsWalker {
    vault: VaultClient,
    mount: String,
    max_list_calls: usize,
}

impl SecretsWalker {
    /// Full construction handshake:
    ///
    /// 1. verify the named secret-service instance exists in the client's
    ///    space (fatal when missing; no degraded mode),
    /// 2. fetch or create a service key and decode its
    ///    [`ServiceCredentialBundle`],
    /// 3. exchange the AppRole pair for a Vault session.
    ///
    /// The handshake runs once; the resulting Vault token is not refreshed.
    /// When it expires, operations fail with an authentication error and the
    /// walker must be reconstructed.
    pub async fn connect(
        cf: &CfClient,
        service_instance_name: &str,
        vault_url: &str,
    ) -> Result<Self> {
        if !cf.service_instance_exists(service_instance_name).await? {
            return Err(Error::NotFound {
                collection: "service instance",
                name: service_instance_name.to_string(),
            });
        }
        let bindings = cf.service_credentials(service_instance_name).await?;
        let bundle = ServiceCredentialBundle::from_bindings(&bindings)?;
        tracing::info!(
            service = service_instance_name,
            mount = bundle.mount.as_str(),
            "secret-service binding resolved"
        );
        Self::from_bundle(vault_url, &bundle).await
    }

    /// Skip the CF lookup and log in from an already-decoded bundle.
    pub async fn from_bundle(vault_url: &str, bundle: &ServiceCredentialBundle) -> Result<Self> {
        let vault =
            VaultClient::approle_login(vault_url, &bundle.role_id, &bundle.secret_id).await?;
        Ok(Self {
            vault,
            mount: bundle.mount.clone(),
            max_list_calls: DEFAULT_MAX_LIST_CALLS,
        })
    }

    /// Override the tree-walk bound.
    pub fn with_max_list_calls(mut self, max_list_calls: usize) -> Self {
        self.max_list_calls = max_list_calls;
        self
    }

    /// The KV mount this walker is scoped to.
    pub fn mount(&self) -> &str {
        &self.mount
    }

    fn store_path(&self, path: &str) -> String {
        join_paths(&self.mount, path)
    }

    /// Enumerate every leaf path under `root` (paths are returned rooted at
    /// `root`, never including directory markers).
    ///
    /// Traversal is depth-first over an explicit work list, in whatever order
    /// the backing store returns children. Repeated calls re-read the tree
    /// and are idempotent, but a walk racing concurrent mutation of the tree
    /// sees no consistency guarantee.
    pub async fn list_tree(&self, root: &str) -> Result<Vec<String>> {
        let root = root.trim_matches('/');
        let keys = self
            .vault
            .list(&self.store_path(root))
            .await?
            .ok_or_else(|| Error::SecretPath {
                path: root.to_string(),
                reason: "not a listable directory (leaf value or missing)".to_string(),
            })?;

        let mut leaves = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        collect_children(root, keys, &mut leaves, &mut pending);

        let mut calls = 1usize;
        while let Some(dir) = pending.pop() {
            if calls >= self.max_list_calls {
                return Err(Error::SecretPath {
                    path: dir,
                    reason: format!("tree walk exceeded {} list calls", self.max_list_calls),
                });
            }
            calls += 1;
            // A subtree deleted mid-walk lists as nothing; only the root is
            // required to be a directory.
            let keys = self
                .vault
                .list(&self.store_path(&dir))
                .await?
                .unwrap_or_default();
            collect_children(&dir, keys, &mut leaves, &mut pending);
        }

        tracing::debug!(root, leaves = leaves.len(), calls, "tree walk complete");
        Ok(leaves)
    }

    /// Read one field of the leaf at `path`. `None` when the leaf or the
    /// field is absent.
    pub async fn read(&self, path: &str, field: &str) -> Result<Option<Value>> {
        let data = self.vault.read(&self.store_path(path)).await?;
        Ok(data.and_then(|mut fields| fields.remove(field)))
    }

    /// Write fields to the leaf at `path`, replacing the stored value.
    pub async fn write(&self, path: &str, fields: &Value) -> Result<()> {
        self.vault.write(&self.store_path(path), fields).await
    }

    /// Store a username/password pair at `path`.
    pub async fn write_credentials(&self, path: &str, username: &str, password: &str) -> Result<()> {
        self.write(path, &json!({ "username": username, "password": password }))
            .await
    }

    /// Delete the leaf at `path`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.vault.delete(&self.store_path(path)).await
    }

    /// Store binary content under the leaf's `file` field, base64-encoded
    /// for transport.
    pub async fn store_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let fields = json!({ "file": codec::encode(content) });
        self.write(path, &fields).await
    }

    /// Fetch and decode the `file` field at `path`. Round-trips exactly with
    /// [`store_file`](Self::store_file).
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let data = self
            .vault
            .read(&self.store_path(path))
            .await?
            .ok_or_else(|| Error::SecretPath {
                path: path.to_string(),
                reason: "no value stored".to_string(),
            })?;
        let encoded = data
            .get("file")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::SecretPath {
                path: path.to_string(),
                reason: "value has no file field".to_string(),
            })?;
        codec::decode(encoded)
    }

    /// Store externally produced ciphertext at `path`.
    pub async fn write_encrypted(&self, path: &str, ciphertext: &str) -> Result<()> {
        self.write(path, &json!({ "ciphertext": ciphertext })).await
    }

    /// Encrypt plaintext with a named transit key. Returns ciphertext only;
    /// decryption happens on the receiving side.
    pub async fn encrypt(
        &self,
        transit_mount: &str,
        key_name: &str,
        plaintext: &[u8],
    ) -> Result<String> {
        self.vault
            .transit_encrypt(transit_mount, key_name, plaintext)
            .await
    }

    /// End the Vault session.
    pub fn logout(&mut self) {
        self.vault.logout();
    }
}

/// Split a listing into leaves (collected) and subdirectories (pushed for
/// later visits, reversed so the stack pops them in store order).
fn collect_children(
    dir: &str,
    keys: Vec<String>,
    leaves: &mut Vec<String>,
    pending: &mut Vec<String>,
) {
    let mut subdirs = Vec::new();
    for key in keys {
        match key.strip_suffix('/') {
            Some(name) => subdirs.push(join_paths(dir, name)),
            None => leaves.push(join_paths(dir, &key)),
        }
    }
    pending.extend(subdirs.into_iter().rev());
}
