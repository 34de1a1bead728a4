//! Credentials for tools and test harnesses.
//!
//! The client itself takes an account name and a token; this module only
//! loads them. The JSON layout matches the historical `test-config.json`
//! (`AccountName`, `AuthToken`), and unknown keys are ignored so OAuth
//! material in the same file does no harm.

use std::path::Path;

use serde::Deserialize;

use crate::client::Api;
use crate::error::ConfigError;

pub const ACCOUNT_VAR: &str = "LEDGER_ACCOUNT";
pub const TOKEN_VAR: &str = "LEDGER_TOKEN";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthConfig {
    pub account_name: String,
    pub auth_token: String,
}

impl AuthConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Read `LEDGER_ACCOUNT` and `LEDGER_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let account_name = lookup(ACCOUNT_VAR).ok_or(ConfigError::MissingVar(ACCOUNT_VAR))?;
        let auth_token = lookup(TOKEN_VAR).ok_or(ConfigError::MissingVar(TOKEN_VAR))?;
        Ok(Self { account_name, auth_token })
    }

    /// A client for this account over the default transport.
    pub fn api(&self) -> Api {
        Api::new(&self.account_name, &self.auth_token)
    }
}
