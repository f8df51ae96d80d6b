//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::accounts::{AccountsError, AccountsFile};
use crate::logging::LogFormat;
use crate::orchestrator::WorkflowTiming;
use crate::retry::RetryPolicy;
use crate::tags::TagKeys;

/// Orchestrator settings derived from defaults, configuration files, and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FSORCH",
    discovery(
        app_name = "fsorch",
        env_var = "FSORCH_CONFIG_PATH",
        config_file_name = "fsorch.toml",
        dotfile_name = ".fsorch.toml",
        project_file_name = "fsorch.toml"
    )
)]
pub struct OrchestratorConfig {
    /// Organization identifier written into every org tag. Required.
    #[ortho_config(default = String::new())]
    pub org: String,
    /// Namespace of the org and space tag keys.
    #[ortho_config(default = "spinup".to_owned())]
    pub tag_namespace: String,
    /// First path component of every filesystem user.
    #[ortho_config(default = "fsorch".to_owned())]
    pub user_path_prefix: String,
    /// Base name of the per-org admin group.
    #[ortho_config(default = "SpinupEFSAdminGroup".to_owned())]
    pub admin_group: String,
    /// Base name of the per-org admin policy.
    #[ortho_config(default = "SpinupEFSAdminPolicy".to_owned())]
    pub admin_policy: String,
    /// Path to the JSON account settings file.
    pub accounts_file: Option<String>,
    /// Attempts used when awaiting provider state changes.
    #[ortho_config(default = 10)]
    pub retry_attempts: u32,
    /// Initial backoff between await attempts, in milliseconds.
    #[ortho_config(default = 2000)]
    pub retry_backoff_ms: u64,
    /// Attempts used for the final filesystem delete.
    #[ortho_config(default = 3)]
    pub delete_attempts: u32,
    /// Deadline for running a rollback stack, in seconds.
    #[ortho_config(default = 120)]
    pub rollback_timeout_secs: u64,
    /// Log output format, `pretty` or `json`.
    #[ortho_config(default = "pretty".to_owned())]
    pub log_format: String,
    /// Log filter used when `RUST_LOG` is unset.
    #[ortho_config(default = "info".to_owned())]
    pub log_level: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl OrchestratorConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to fsorch.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: set {} or {} in fsorch.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("fsorch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.org,
            &FieldMetadata::new("organization identifier", "FSORCH_ORG", "org"),
        )?;
        Self::require_field(
            &self.tag_namespace,
            &FieldMetadata::new("tag namespace", "FSORCH_TAG_NAMESPACE", "tag_namespace"),
        )?;
        Self::require_field(
            &self.user_path_prefix,
            &FieldMetadata::new(
                "user path prefix",
                "FSORCH_USER_PATH_PREFIX",
                "user_path_prefix",
            ),
        )?;
        Self::require_field(
            &self.admin_group,
            &FieldMetadata::new("admin group name", "FSORCH_ADMIN_GROUP", "admin_group"),
        )?;
        Self::require_field(
            &self.admin_policy,
            &FieldMetadata::new("admin policy name", "FSORCH_ADMIN_POLICY", "admin_policy"),
        )?;
        Self::require_positive(
            u64::from(self.retry_attempts),
            &FieldMetadata::new("retry attempts", "FSORCH_RETRY_ATTEMPTS", "retry_attempts"),
        )?;
        Self::require_positive(
            u64::from(self.delete_attempts),
            &FieldMetadata::new("delete attempts", "FSORCH_DELETE_ATTEMPTS", "delete_attempts"),
        )?;
        Self::require_positive(
            self.rollback_timeout_secs,
            &FieldMetadata::new(
                "rollback timeout",
                "FSORCH_ROLLBACK_TIMEOUT_SECS",
                "rollback_timeout_secs",
            ),
        )?;
        self.log_format()?;
        Ok(())
    }

    /// Parses the configured log format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything but `pretty` or `json`.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse().map_err(ConfigError::Invalid)
    }

    /// Returns the tag keys derived from the namespace.
    #[must_use]
    pub fn tag_keys(&self) -> TagKeys {
        TagKeys::with_namespace(&self.tag_namespace)
    }

    /// Returns the retry and rollback timing used by workflows.
    #[must_use]
    pub const fn timing(&self) -> WorkflowTiming {
        let backoff = Duration::from_millis(self.retry_backoff_ms);
        WorkflowTiming {
            await_policy: RetryPolicy::new(self.retry_attempts, backoff),
            delete_policy: RetryPolicy::new(self.delete_attempts, backoff),
            rollback_timeout: Duration::from_secs(self.rollback_timeout_secs),
        }
    }

    /// Loads the account settings file, or an empty set when none is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Accounts`] when the file cannot be loaded.
    pub fn load_accounts(&self) -> Result<AccountsFile, ConfigError> {
        match self.accounts_file.as_deref() {
            Some(path) if !path.trim().is_empty() => {
                Ok(AccountsFile::load(&Utf8PathBuf::from(path))?)
            }
            _ => Ok(AccountsFile::default()),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces errors from the account settings file.
    #[error("account settings error: {0}")]
    Accounts(#[from] AccountsError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
