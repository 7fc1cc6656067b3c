//! Provider resources as seen by the build pipeline.
//!
//! These types are independent of the Hetzner wire format; the `hcloud`
//! module converts API payloads into them.

use std::fmt;
use std::net::IpAddr;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw provider identifier.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw provider identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns `true` for the zero identifier, which the provider
            /// never assigns.
            #[must_use]
            pub const fn is_unset(self) -> bool {
                self.0 == 0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

resource_id!(
    /// Identifier of a server.
    ServerId
);
resource_id!(
    /// Identifier of an image or snapshot.
    ImageId
);
resource_id!(
    /// Identifier of a registered SSH key.
    SshKeyId
);
resource_id!(
    /// Identifier of a server type.
    ServerTypeId
);
resource_id!(
    /// Identifier of a location.
    LocationId
);
resource_id!(
    /// Identifier of a datacenter.
    DatacenterId
);
resource_id!(
    /// Identifier of an asynchronous provider action.
    ActionId
);

/// Lifecycle status reported for a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    /// Server is being created.
    Initializing,
    /// Server is booting.
    Starting,
    /// Server is up.
    Running,
    /// Server is shutting down.
    Stopping,
    /// Server is powered off.
    Off,
    /// Server is being deleted.
    Deleting,
    /// Server is migrating between hosts.
    Migrating,
    /// Server is being rebuilt.
    Rebuilding,
    /// Status not recognised by this client.
    Unknown,
}

impl ServerStatus {
    /// Parses the provider's status string, mapping unrecognised values to
    /// [`ServerStatus::Unknown`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "initializing" => Self::Initializing,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "off" => Self::Off,
            "deleting" => Self::Deleting,
            "migrating" => Self::Migrating,
            "rebuilding" => Self::Rebuilding,
            _ => Self::Unknown,
        }
    }
}

/// A cloud server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    /// Provider identifier.
    pub id: ServerId,
    /// Server name.
    pub name: String,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Primary public IPv4 address, once assigned.
    pub public_ipv4: Option<IpAddr>,
}

/// A server type (hardware flavour).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerType {
    /// Provider identifier.
    pub id: ServerTypeId,
    /// Name such as `cx11`.
    pub name: String,
}

/// Kind of image stored by the provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    /// Public distribution image.
    System,
    /// Application image.
    App,
    /// User snapshot.
    Snapshot,
    /// Automatic backup.
    Backup,
    /// Temporary image.
    Temporary,
    /// Kind not recognised by this client.
    Unknown,
}

impl ImageKind {
    /// Parses the provider's image type string.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "system" => Self::System,
            "app" => Self::App,
            "snapshot" => Self::Snapshot,
            "backup" => Self::Backup,
            "temporary" => Self::Temporary,
            _ => Self::Unknown,
        }
    }
}

/// An image or snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider identifier.
    pub id: ImageId,
    /// Unique name; snapshots usually have none.
    pub name: Option<String>,
    /// Free-form description.
    pub description: String,
    /// Image kind.
    pub kind: ImageKind,
}

/// A registered SSH public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshKey {
    /// Provider identifier.
    pub id: SshKeyId,
    /// Key name.
    pub name: String,
    /// Key fingerprint.
    pub fingerprint: String,
}

/// A location such as `fsn1`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// Provider identifier.
    pub id: LocationId,
    /// Location name.
    pub name: String,
}

/// A datacenter such as `fsn1-dc14`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datacenter {
    /// Provider identifier.
    pub id: DatacenterId,
    /// Datacenter name.
    pub name: String,
}

/// Progress of an asynchronous provider action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActionStatus {
    /// Still in progress.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Error,
}

/// Error details attached to a failed action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionError {
    /// Machine readable code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// An asynchronous provider action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Action {
    /// Provider identifier.
    pub id: ActionId,
    /// Command name, for example `create_image`.
    pub command: String,
    /// Current status.
    pub status: ActionStatus,
    /// Completion percentage.
    pub progress: u8,
    /// Error details when `status` is [`ActionStatus::Error`].
    pub error: Option<ActionError>,
}

impl Action {
    /// Returns `true` once the action has stopped running.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self.status, ActionStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("running", ServerStatus::Running)]
    #[case("off", ServerStatus::Off)]
    #[case("initializing", ServerStatus::Initializing)]
    #[case("unheard-of", ServerStatus::Unknown)]
    fn server_status_parses_wire_values(#[case] raw: &str, #[case] expected: ServerStatus) {
        assert_eq!(ServerStatus::from_wire(raw), expected);
    }

    #[test]
    fn zero_identifier_is_unset() {
        assert!(ServerId::new(0).is_unset());
        assert!(!ServerId::new(42).is_unset());
        assert_eq!(ServerId::from(42).to_string(), "42");
    }
}
