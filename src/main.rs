//! Binary entry point for the fsorch CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use fsorch::{
    AccessPolicyFlags, AccountsFile, ConfigError, OrchestratorConfig, OrchestratorSettings,
    ProvisionError, init_logging, resource_policy,
};

mod cli;

use cli::{Cli, RenderPolicyCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("policy rendering failed: {0}")]
    Policy(#[from] ProvisionError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli, &mut io::stdout()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    match cli {
        Cli::CheckConfig => check_config(out),
        Cli::RenderPolicy(command) => render_policy(&command, out),
    }
}

fn check_config(out: &mut impl Write) -> Result<(), CliError> {
    let config = OrchestratorConfig::load_without_cli_args()?;
    config.validate()?;
    init_logging(config.log_format()?, &config.log_level);

    let accounts = config.load_accounts()?;
    accounts.validate().map_err(ConfigError::from)?;
    let settings = OrchestratorSettings::from_config(&config);
    info!(
        org = %settings.org,
        accounts = accounts.accounts.len(),
        "configuration is valid"
    );
    write_summary(out, &settings, &accounts)
}

fn write_summary(
    out: &mut impl Write,
    settings: &OrchestratorSettings,
    accounts: &AccountsFile,
) -> Result<(), CliError> {
    let timing = settings.timing;
    writeln!(out, "org: {}", settings.org)?;
    writeln!(
        out,
        "tag keys: {}, {}",
        settings.tag_keys.org, settings.tag_keys.space
    )?;
    writeln!(out, "admin group: {}", settings.admin_group_name())?;
    writeln!(out, "admin policy: {}", settings.admin_policy_name())?;
    writeln!(
        out,
        "await: {} attempt(s), initial backoff {}ms",
        timing.await_policy.attempts,
        timing.await_policy.initial_backoff.as_millis()
    )?;
    writeln!(out, "delete: {} attempt(s)", timing.delete_policy.attempts)?;
    writeln!(out, "rollback timeout: {}s", timing.rollback_timeout.as_secs())?;
    for (alias, account) in &accounts.accounts {
        let defaults = &account.defaults;
        writeln!(
            out,
            "account {alias}: number {}, subnets [{}], security groups [{}], kms key {}",
            account.number,
            defaults.default_subnets.join(", "),
            defaults.default_security_groups.join(", "),
            defaults.default_kms_key_id
        )?;
    }
    Ok(())
}

fn render_policy(command: &RenderPolicyCommand, out: &mut impl Write) -> Result<(), CliError> {
    let flags = AccessPolicyFlags {
        allow_anonymous_access: command.allow_anonymous_access,
        enforce_encrypted_transport: command.enforce_encrypted_transport,
        allow_execution_role: command.allow_execution_role,
    };
    let rendered = resource_policy(
        &command.account,
        &command.space,
        &command.resource_arn,
        Some(&flags),
    )
    .map(|document| document.to_json())
    .transpose()?
    .unwrap_or_else(|| String::from("null"));
    writeln!(out, "{rendered}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
