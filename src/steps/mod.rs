//! The concrete build steps, in pipeline order.

pub(crate) mod action;
mod capture_image;
mod create_server;
mod ready;
mod ssh_key;

pub use capture_image::CaptureImage;
pub use create_server::CreateServer;
pub use ready::{HandOffToProvisioners, SSH_PORT, WaitForServer};
pub use ssh_key::EnsureSshKey;
