//! Command-line interface definitions for the `gce-machines` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `gce-machines` binary.
#[derive(Debug, Parser)]
#[command(
    name = "gce-machines",
    about = "Allocate, ready, stop and destroy Compute Engine machines",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create the instance for a machine unless it already exists.
    #[command(
        name = "allocate",
        about = "Create the instance for a machine and print its reference"
    )]
    Allocate(AllocateCommand),
    /// Start a machine if needed and wait until it accepts connections.
    #[command(
        name = "ready",
        about = "Start a machine if needed and print user@host once connectable"
    )]
    Ready(ReadyCommand),
    /// Stop a machine and wait until it is terminated.
    #[command(name = "stop", about = "Stop a machine and wait until it is terminated")]
    Stop(MachineTarget),
    /// Delete a machine's instance.
    #[command(name = "destroy", about = "Delete a machine's instance")]
    Destroy(MachineTarget),
    /// Manage SSH key pairs held in project metadata.
    #[command(name = "key-pair", about = "Manage SSH key pairs in project metadata")]
    #[command(subcommand)]
    KeyPair(KeyPairCommand),
}

/// Names a machine and, optionally, the reference recorded at allocation.
#[derive(Debug, Args)]
pub(crate) struct MachineTarget {
    /// Instance name.
    pub(crate) name: String,
    /// JSON file holding the reference printed by `allocate`.
    #[arg(long, value_name = "PATH")]
    pub(crate) reference: Option<String>,
}

/// Connection preferences shared by `allocate` and `ready`.
#[derive(Debug, Args)]
pub(crate) struct ConnectionArgs {
    /// Login name to connect with.
    #[arg(long, value_name = "USER")]
    pub(crate) ssh_username: Option<String>,
    /// Jump host to reach the instance through.
    #[arg(long, value_name = "HOST")]
    pub(crate) ssh_gateway: Option<String>,
    /// Name of the key pair used to log in.
    #[arg(long, value_name = "NAME")]
    pub(crate) key_name: Option<String>,
    /// Prefix remote commands with sudo (derived from the user when omitted).
    #[arg(long, value_name = "BOOL")]
    pub(crate) sudo: Option<bool>,
}

/// Arguments for the `gce-machines allocate` subcommand.
#[derive(Debug, Args)]
pub(crate) struct AllocateCommand {
    /// Instance name.
    pub(crate) name: String,
    /// JSON object merged onto the default insert request. Prefix with `@`
    /// to read it from a file.
    #[arg(long, value_name = "JSON")]
    pub(crate) insert_options: Option<String>,
    /// Node requesting the machine, recorded in the reference.
    #[arg(long, value_name = "NODE")]
    pub(crate) host_node: Option<String>,
    /// Connection preferences recorded in the reference.
    #[command(flatten)]
    pub(crate) connection: ConnectionArgs,
}

/// Arguments for the `gce-machines ready` subcommand.
#[derive(Debug, Args)]
pub(crate) struct ReadyCommand {
    /// Machine to ready.
    #[command(flatten)]
    pub(crate) target: MachineTarget,
    /// TCP port probed for SSH availability.
    #[arg(long, value_name = "PORT")]
    pub(crate) ssh_port: Option<u16>,
    /// Connection preferences; recorded values take precedence.
    #[command(flatten)]
    pub(crate) connection: ConnectionArgs,
}

/// Subcommands of `gce-machines key-pair`.
#[derive(Debug, Subcommand)]
pub(crate) enum KeyPairCommand {
    /// Upload a public key under a logical name.
    #[command(name = "create", about = "Upload a public key under a logical name")]
    Create(KeyPairCreateCommand),
    /// Remove the key and mapping filed under a logical name.
    #[command(
        name = "destroy",
        about = "Remove the key and mapping filed under a logical name"
    )]
    Destroy(KeyPairDestroyCommand),
}

/// Arguments for `gce-machines key-pair create`.
#[derive(Debug, Args)]
pub(crate) struct KeyPairCreateCommand {
    /// Logical key pair name.
    pub(crate) name: String,
    /// OpenSSH public key file (for example `~/.ssh/id_ed25519.pub`).
    #[arg(long, value_name = "PATH")]
    pub(crate) public_key: String,
    /// Replace a different key already filed under this name.
    #[arg(long)]
    pub(crate) allow_overwrite: bool,
}

/// Arguments for `gce-machines key-pair destroy`.
#[derive(Debug, Args)]
pub(crate) struct KeyPairDestroyCommand {
    /// Logical key pair name.
    pub(crate) name: String,
}
