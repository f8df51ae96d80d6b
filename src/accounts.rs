//! Account registry: per-account collaborators and provisioning defaults.
//!
//! The registry is built once at startup and handed to the orchestrator. It
//! maps the account alias used in requests to the account number, the
//! defaults applied to new filesystems, and the clients bound to that
//! account.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ProvisionError;
use crate::provider::{ControlPlane, IdentityProvider, SubnetDirectory};

/// Provisioning defaults of one account.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountDefaults {
    /// Subnets used when a create request names none.
    #[serde(default)]
    pub default_subnets: Vec<String>,
    /// Security groups used when a create request names none.
    #[serde(default)]
    pub default_security_groups: Vec<String>,
    /// Encryption key used when a create request names none.
    #[serde(default)]
    pub default_kms_key_id: String,
}

/// Settings of one account as stored in the accounts file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountSettings {
    /// Provider account number.
    pub number: String,
    /// Provisioning defaults.
    #[serde(flatten)]
    pub defaults: AccountDefaults,
}

/// Errors raised while loading account settings.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum AccountsError {
    /// Raised when the file cannot be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file is not valid account settings JSON.
    #[error("failed to parse account settings: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when an account is missing a required value.
    #[error("account {alias} is missing {field}")]
    MissingField {
        /// Alias of the incomplete account.
        alias: String,
        /// Name of the missing field.
        field: String,
    },
}

/// Contents of the accounts file, keyed by alias.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountsFile {
    /// Accounts keyed by alias.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountSettings>,
}

impl AccountsFile {
    /// Parses and validates account settings.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::Parse`] for malformed JSON and
    /// [`AccountsError::MissingField`] for incomplete accounts.
    pub fn from_json(text: &str) -> Result<Self, AccountsError> {
        let file: Self = serde_json::from_str(text).map_err(|err| AccountsError::Parse {
            message: err.to_string(),
        })?;
        file.validate()?;
        Ok(file)
    }

    /// Reads account settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::Io`] when the file cannot be read, or any
    /// error from [`AccountsFile::from_json`].
    pub fn load(path: &Utf8Path) -> Result<Self, AccountsError> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| AccountsError::Io {
            path: path.to_path_buf(),
            message: String::from("path is missing a file name"),
        })?;

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
            AccountsError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let contents = dir.read_to_string(file_name).map_err(|err| AccountsError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        Self::from_json(&contents)
    }

    /// Checks that every account has a number.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::MissingField`] for the first incomplete
    /// account.
    pub fn validate(&self) -> Result<(), AccountsError> {
        for (alias, settings) in &self.accounts {
            if settings.number.trim().is_empty() {
                return Err(AccountsError::MissingField {
                    alias: alias.clone(),
                    field: String::from("number"),
                });
            }
        }
        Ok(())
    }
}

/// Clients bound to one account.
#[derive(Clone)]
pub struct AccountClients {
    /// Resource control plane.
    pub control_plane: Arc<dyn ControlPlane>,
    /// Identity management.
    pub identity: Arc<dyn IdentityProvider>,
    /// Subnet lookups for one-zone placement.
    pub subnets: Arc<dyn SubnetDirectory>,
}

impl fmt::Debug for AccountClients {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("AccountClients").finish_non_exhaustive()
    }
}

/// One registered account.
#[derive(Clone, Debug)]
pub struct Account {
    /// Alias used in requests.
    pub alias: String,
    /// Provider account number.
    pub number: String,
    /// Provisioning defaults.
    pub defaults: AccountDefaults,
    /// Bound clients.
    pub clients: AccountClients,
}

/// Registry of accounts keyed by alias.
#[derive(Clone, Debug, Default)]
pub struct AccountRegistry {
    accounts: HashMap<String, Account>,
}

impl AccountRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from account settings, binding clients with
    /// `connect`.
    pub fn from_settings(
        file: &AccountsFile,
        mut connect: impl FnMut(&str, &AccountSettings) -> AccountClients,
    ) -> Self {
        let mut registry = Self::new();
        for (alias, settings) in &file.accounts {
            registry.insert(Account {
                alias: alias.clone(),
                number: settings.number.clone(),
                defaults: settings.defaults.clone(),
                clients: connect(alias, settings),
            });
        }
        registry
    }

    /// Registers an account, replacing any previous entry with its alias.
    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.alias.clone(), account);
    }

    /// Resolves an alias.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`ProvisionError`] for unknown aliases.
    pub fn get(&self, alias: &str) -> Result<&Account, ProvisionError> {
        self.accounts
            .get(alias)
            .ok_or_else(|| ProvisionError::not_found(format!("account {alias} doesn't exist")))
    }

    /// Returns registered aliases in sorted order.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.accounts.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}
