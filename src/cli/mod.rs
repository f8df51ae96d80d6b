//! Command-line interface definitions for the `fsorch` binary.
//!
//! The clap parser structures live here so both the main binary and the
//! build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `fsorch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fsorch",
    about = "Inspect provisioning configuration and render filesystem access policies",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Load and validate configuration and account settings.
    #[command(
        name = "check-config",
        about = "Load and validate configuration and account settings"
    )]
    CheckConfig,
    /// Print the resource access policy produced by a set of flags.
    #[command(
        name = "render-policy",
        about = "Print the resource access policy produced by a set of flags"
    )]
    RenderPolicy(RenderPolicyCommand),
}

/// Arguments for the `fsorch render-policy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RenderPolicyCommand {
    /// Provider account number owning the filesystem.
    #[arg(long, value_name = "NUMBER")]
    pub(crate) account: String,
    /// Space whose task execution role may be granted access.
    #[arg(long, value_name = "SPACE")]
    pub(crate) space: String,
    /// Resource name of the filesystem the policy protects.
    #[arg(long, value_name = "ARN")]
    pub(crate) resource_arn: String,
    /// Allow clients without identity-based authorization to mount.
    #[arg(long)]
    pub(crate) allow_anonymous_access: bool,
    /// Deny any request not made over an encrypted transport.
    #[arg(long)]
    pub(crate) enforce_encrypted_transport: bool,
    /// Allow the space's task execution role to mount and write.
    #[arg(long)]
    pub(crate) allow_execution_role: bool,
}
