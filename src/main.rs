//! Binary entry point for the hcloud-imager CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use hcloud_imager::{
    BuildConfig, BuildError, BuildOverrides, CommandProvisioner, ConfigError, ConsoleUi,
    HcloudClient, HcloudError, ImageBuilder, KeyGenerator, ProcessCommandRunner, Provisioner,
    ReportingProvisioner,
    telemetry::{self, LogFormat, TelemetryError},
};

mod cli;

use cli::{BuildCommand, Cli};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("client error: {0}")]
    Client(#[from] HcloudError),
    #[error("build failed: {0}")]
    Build(#[from] BuildError<HcloudError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Build(command) => build(command).await,
    }
}

async fn build(args: BuildCommand) -> Result<(), CliError> {
    let mut config = BuildConfig::load_without_cli_args()?;
    config.apply_overrides(overrides_from(args));
    telemetry::initialise(&config.log_filter, LogFormat::from_json_flag(config.log_json))?;

    let request = config.as_request()?;
    let client = HcloudClient::new(&config.token, &config.endpoint, config.request_timeout())?;
    let builder = ImageBuilder::new(
        Arc::new(client),
        Arc::new(ConsoleUi),
        provisioner_for(&config),
        KeyGenerator::new(ProcessCommandRunner, config.ssh_keygen_bin.clone()),
        config.timings(),
    );

    let artifact = builder.build(&request).await?;
    writeln!(io::stdout(), "{artifact}").ok();
    Ok(())
}

fn overrides_from(args: BuildCommand) -> BuildOverrides {
    let BuildCommand {
        server_type,
        source_image,
        image_name,
        location,
        datacenter,
        user_data,
        user_data_file,
    } = args;
    BuildOverrides {
        server_type,
        source_image,
        image_name,
        location,
        datacenter,
        user_data,
        user_data_file,
    }
}

fn provisioner_for(config: &BuildConfig) -> Arc<dyn Provisioner> {
    match &config.provision_command {
        Some(program) => Arc::new(CommandProvisioner::new(ProcessCommandRunner, program.clone())),
        None => Arc::new(ReportingProvisioner),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_flags_become_overrides() {
        let Cli::Build(command) = Cli::parse_from([
            "hcloud-imager",
            "build",
            "--server-type",
            "cx22",
            "--image-name",
            "nightly",
            "--user-data-file",
            "./user-data.yml",
        ]);

        let overrides = overrides_from(command);

        assert_eq!(overrides.server_type.as_deref(), Some("cx22"));
        assert_eq!(overrides.image_name.as_deref(), Some("nightly"));
        assert_eq!(overrides.user_data_file.as_deref(), Some("./user-data.yml"));
        assert_eq!(overrides.source_image, None);
    }

    #[test]
    fn user_data_flags_conflict() {
        let result = Cli::try_parse_from([
            "hcloud-imager",
            "build",
            "--user-data",
            "#cloud-config",
            "--user-data-file",
            "./user-data.yml",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn errors_render_on_one_line() {
        let mut buffer = Vec::new();
        let err = CliError::Client(HcloudError::Config(String::from("API token is empty")));

        write_error(&mut buffer, &err);

        assert_eq!(
            String::from_utf8_lossy(&buffer),
            "client error: configuration error: API token is empty\n"
        );
    }
}
