//! Hand-off point where external provisioning logic configures the server.

use std::ffi::OsString;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;

use crate::command::{CommandRunner, OutputStream, SpawnError};
use crate::ui::Ui;

/// How provisioners reach the temporary server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connection {
    /// Public address of the server.
    pub host: IpAddr,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Private key matching the key installed on the server, when this
    /// build generated one.
    pub private_key: Option<Utf8PathBuf>,
}

/// Errors raised by provisioners.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the provisioner program cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when the provisioner program exits unsuccessfully.
    #[error("provisioner {program} exited with status {status_text}: {stderr}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Human readable exit status.
        status_text: String,
        /// Captured stderr.
        stderr: String,
    },
}

/// Future returned by provisioners.
pub type ProvisionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>>;

/// External logic run against the ready server before it is imaged.
pub trait Provisioner: Send + Sync {
    /// Configures the server reachable through `connection`.
    fn provision<'a>(&'a self, connection: &'a Connection, ui: &'a dyn Ui) -> ProvisionFuture<'a>;
}

/// Provisioner that only reports where the server can be reached.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportingProvisioner;

impl Provisioner for ReportingProvisioner {
    fn provision<'a>(&'a self, connection: &'a Connection, ui: &'a dyn Ui) -> ProvisionFuture<'a> {
        Box::pin(async move {
            ui.say(&format!(
                "Server reachable at {}@{}:{}",
                connection.username, connection.host, connection.port
            ));
            Ok(())
        })
    }
}

/// Runs a local program, passing the connection as arguments:
/// `<host> <port> <username> [private-key-path]`.
#[derive(Clone, Debug)]
pub struct CommandProvisioner<R: CommandRunner> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> CommandProvisioner<R> {
    /// Creates a provisioner invoking `program` through `runner`.
    #[must_use]
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn arguments(connection: &Connection) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(connection.host.to_string()),
            OsString::from(connection.port.to_string()),
            OsString::from(&connection.username),
        ];
        if let Some(key) = &connection.private_key {
            args.push(OsString::from(key.as_str()));
        }
        args
    }
}

impl<R: CommandRunner + Clone + 'static> Provisioner for CommandProvisioner<R> {
    fn provision<'a>(&'a self, connection: &'a Connection, ui: &'a dyn Ui) -> ProvisionFuture<'a> {
        Box::pin(async move {
            ui.say(&format!("Running provisioner {}", self.program));
            let (sender, mut receiver) = mpsc::unbounded_channel();
            let runner = self.runner.clone();
            let program = self.program.clone();
            let args = Self::arguments(connection);
            let task = task::spawn_blocking(move || {
                runner.run_streaming(&program, &args, &mut |stream: OutputStream, line: &str| {
                    sender.send((stream, line.to_owned())).ok();
                })
            });

            while let Some((stream, line)) = receiver.recv().await {
                match stream {
                    OutputStream::Stdout => ui.say(&line),
                    OutputStream::Stderr => ui.error(&line),
                }
            }

            let output = task.await.map_err(|err| SpawnError {
                program: self.program.clone(),
                message: err.to_string(),
            })??;
            if !output.is_success() {
                return Err(ProvisionError::Failed {
                    program: self.program.clone(),
                    status_text: output.status_text(),
                    stderr: output.stderr,
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::test_support::{RecordingUi, ScriptedRunner};

    fn connection(private_key: Option<&str>) -> Connection {
        Connection {
            host: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
            port: 22,
            username: String::from("root"),
            private_key: private_key.map(Utf8PathBuf::from),
        }
    }

    #[tokio::test]
    async fn command_provisioner_passes_connection_arguments() {
        let runner = ScriptedRunner::new();
        runner.push_success();
        let provisioner = CommandProvisioner::new(runner.clone(), "./provision.sh");
        let ui = RecordingUi::new();

        provisioner
            .provision(&connection(Some("/tmp/key")), &ui)
            .await
            .expect("provisioner succeeds");

        let invocation = runner.invocations().pop().expect("invocation recorded");
        assert_eq!(
            invocation.command_string(),
            "./provision.sh 192.0.2.10 22 root /tmp/key"
        );
    }

    #[tokio::test]
    async fn command_provisioner_output_reaches_the_user() {
        let runner = ScriptedRunner::new();
        runner.push_printed(
            0,
            "PLAY [all]\nTASK [Gathering Facts]\n",
            "[WARNING]: no inventory\n",
        );
        let provisioner = CommandProvisioner::new(runner, "ansible-playbook");
        let ui = RecordingUi::new();

        provisioner
            .provision(&connection(None), &ui)
            .await
            .expect("provisioner succeeds");

        assert_eq!(
            ui.said(),
            vec![
                String::from("Running provisioner ansible-playbook"),
                String::from("PLAY [all]"),
                String::from("TASK [Gathering Facts]"),
            ]
        );
        assert_eq!(ui.errors(), vec![String::from("[WARNING]: no inventory")]);
    }

    #[tokio::test]
    async fn command_provisioner_reports_failure() {
        let runner = ScriptedRunner::new();
        runner.push_failure(3, "ansible exploded");
        let provisioner = CommandProvisioner::new(runner, "./provision.sh");
        let ui = RecordingUi::new();

        let err = provisioner
            .provision(&connection(None), &ui)
            .await
            .expect_err("provisioner fails");

        assert!(
            matches!(err, ProvisionError::Failed { ref status_text, .. } if status_text == "3"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn reporting_provisioner_says_endpoint() {
        let ui = RecordingUi::new();
        ReportingProvisioner
            .provision(&connection(None), &ui)
            .await
            .expect("reporting never fails");
        assert_eq!(ui.said(), vec![String::from("Server reachable at root@192.0.2.10:22")]);
    }
}
