//! Object-storage credential lookup
//!
//! The stage tasks embed an access-key/secret pair in the bulk-copy command.
//! They resolve it by id through a [`CredentialProvider`] handed to them at
//! construction time.

use crate::config::CredentialsConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// Access-key/secret pair for object storage
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl AccessKeyPair {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for AccessKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyPair")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// Resolves a credentials id at execution time
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, id: &str) -> Result<AccessKeyPair>;
}

/// Credentials from the `[credentials.<id>]` config sections
///
/// A field missing from the file is read from the environment:
/// `<ID>_ACCESS_KEY_ID` and `<ID>_SECRET_ACCESS_KEY`, where `<ID>` is the
/// credentials id upper-cased with every non-alphanumeric character replaced
/// by `_` (`aws_credentials` → `AWS_CREDENTIALS_ACCESS_KEY_ID`).
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: BTreeMap<String, CredentialsConfig>,
}

impl CredentialStore {
    pub fn new(entries: BTreeMap<String, CredentialsConfig>) -> Self {
        Self { entries }
    }

    /// Register a fixed pair, replacing any existing entry
    pub fn with(mut self, id: impl Into<String>, pair: AccessKeyPair) -> Self {
        self.entries.insert(
            id.into(),
            CredentialsConfig {
                access_key_id: Some(pair.access_key_id),
                secret_access_key: Some(pair.secret_access_key),
            },
        );
        self
    }

    fn lookup(&self, id: &str) -> Result<AccessKeyPair> {
        let entry = self.entries.get(id);
        let prefix = env_prefix(id);

        let access_key_id = entry
            .and_then(|e| e.access_key_id.clone())
            .or_else(|| non_empty_env(&format!("{}_ACCESS_KEY_ID", prefix)));
        let secret_access_key = entry
            .and_then(|e| e.secret_access_key.clone())
            .or_else(|| non_empty_env(&format!("{}_SECRET_ACCESS_KEY", prefix)));

        match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(AccessKeyPair {
                access_key_id,
                secret_access_key,
            }),
            _ => Err(Error::UnknownCredentials(id.to_string())),
        }
    }
}

fn env_prefix(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[async_trait]
impl CredentialProvider for CredentialStore {
    async fn credentials(&self, id: &str) -> Result<AccessKeyPair> {
        self.lookup(id)
    }
}
