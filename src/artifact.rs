//! The snapshot image produced by a build.

use std::fmt;

use crate::resources::ImageId;

/// Snapshot produced by a successful build. Ownership passes to the
/// operator; nothing in this crate deletes it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageArtifact {
    /// Provider identifier of the snapshot.
    pub id: ImageId,
    /// Name recorded for the snapshot.
    pub name: String,
}

impl fmt::Display for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A snapshot was created: '{}' (ID: {})", self.name, self.id)
    }
}
