//! Command-line interface definitions for the `hcloud-imager` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `hcloud-imager` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hcloud-imager",
    version,
    about = "Build Hetzner Cloud snapshot images from temporary servers",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a server, provision it, snapshot it, and tear it down.
    #[command(
        name = "build",
        about = "Create a server, provision it, snapshot it, and tear it down"
    )]
    Build(BuildCommand),
}

/// Arguments for the `hcloud-imager build` subcommand.
///
/// Every flag overrides the matching value loaded from configuration files
/// and `HCLOUD_*` environment variables.
#[derive(Debug, Parser)]
pub(crate) struct BuildCommand {
    /// Server type id or name for the temporary server (for example `cx11`).
    #[arg(long, value_name = "TYPE")]
    pub(crate) server_type: Option<String>,
    /// Image id or name the temporary server boots from.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) source_image: Option<String>,
    /// Name recorded on the resulting snapshot.
    #[arg(long, value_name = "NAME")]
    pub(crate) image_name: Option<String>,
    /// Location name to place the server in.
    #[arg(long, value_name = "LOCATION")]
    pub(crate) location: Option<String>,
    /// Datacenter name to place the server in.
    #[arg(long, value_name = "DATACENTER")]
    pub(crate) datacenter: Option<String>,
    /// User-data payload passed to the server on first boot.
    #[arg(long, value_name = "USER_DATA", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// Read the user-data payload from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
}
