//! Core library for building Hetzner Cloud snapshot images.
//!
//! A build is a fixed sequence of steps (register an SSH key, create a
//! server, wait for it, hand it to a provisioner, snapshot it) executed by
//! [`StepRunner`]. Whatever happens, every step that started is cleaned up
//! in reverse order before the result is returned, so temporary servers and
//! keys do not outlive the build.

pub mod artifact;
pub mod builder;
pub mod client;
pub mod command;
pub mod config;
pub mod hcloud;
pub mod keygen;
pub mod naming;
pub mod provision;
pub mod request;
pub mod resources;
pub mod runner;
pub mod state;
pub mod step;
pub mod steps;
pub mod telemetry;
pub mod test_support;
pub mod ui;
pub mod user_data;

pub use artifact::ImageArtifact;
pub use builder::ImageBuilder;
pub use client::CloudClient;
pub use command::{CommandOutput, CommandRunner, OutputStream, ProcessCommandRunner, SpawnError};
pub use config::{BuildConfig, BuildOverrides, ConfigError};
pub use hcloud::{HcloudClient, HcloudError};
pub use keygen::{KeyGenerator, KeygenError};
pub use provision::{CommandProvisioner, Connection, Provisioner, ReportingProvisioner};
pub use request::{ImageRequest, ImageRequestBuilder, RequestError};
pub use runner::{BuildError, StepRunner};
pub use state::{BuildState, BuildTimings};
pub use step::{Step, StepError};
pub use ui::{ConsoleUi, Ui};
