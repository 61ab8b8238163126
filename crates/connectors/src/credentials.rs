//! Symbolic credential reference resolution.
//!
//! `PlatformAccount.credentials` never carries plaintext secrets — every
//! value must be a string beginning with `env:` or `secret:`. This module
//! resolves those references into the actual values an adapter needs,
//! without ever letting a plaintext literal through.

use crate::{ConnectorError, Platform, ResolvedCredentials};
use std::collections::HashMap;

const ENV_PREFIX: &str = "env:";
const SECRET_PREFIX: &str = "secret:";

/// Resolves a symbolic reference to its underlying value.
///
/// `env:NAME` reads `std::env::var(NAME)`. `secret:NAME` is resolved via the
/// injected `SecretSource` — secret storage itself is a collaborator,
/// referenced only by this symbolic interface.
pub trait SecretSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// A `SecretSource` backed entirely by process environment variables, for
/// deployments that store `secret:`-prefixed references as env vars too.
pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolve the raw `credentials` map for an account (symbolic references
/// only) into a `ResolvedCredentials` the adapter can use.
///
/// Fails fast with `CredentialPlaintextForbidden` if any value is not an
/// `env:`/`secret:` reference, and with `CredentialMissing` if a required
/// key is absent or its reference target cannot be resolved.
pub fn resolve_credentials(
    platform: Platform,
    raw: &HashMap<String, String>,
    secrets: &dyn SecretSource,
) -> Result<ResolvedCredentials, ConnectorError> {
    let mut resolved = HashMap::with_capacity(raw.len());

    for key in platform.required_credential_keys() {
        let reference = raw
            .get(*key)
            .ok_or_else(|| ConnectorError::CredentialMissing((*key).to_string()))?;
        let value = resolve_one(key, reference, secrets)?;
        resolved.insert((*key).to_string(), value);
    }

    Ok(ResolvedCredentials(resolved))
}

fn resolve_one(
    key: &str,
    reference: &str,
    secrets: &dyn SecretSource,
) -> Result<String, ConnectorError> {
    if let Some(name) = reference.strip_prefix(ENV_PREFIX) {
        return std::env::var(name)
            .map_err(|_| ConnectorError::CredentialMissing(key.to_string()));
    }
    if let Some(name) = reference.strip_prefix(SECRET_PREFIX) {
        return secrets
            .lookup(name)
            .ok_or_else(|| ConnectorError::CredentialMissing(key.to_string()));
    }
    Err(ConnectorError::CredentialPlaintextForbidden(key.to_string()))
}
