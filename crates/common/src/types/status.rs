use serde::{Deserialize, Serialize};

/// Relationship label shown to a viewer looking at a subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    /// Viewer is looking at themselves.
    Owner,
    Connected,
    /// Viewer follows the subject (follow track only).
    Following,
    /// Viewer sent a request that has not been accepted. Also covers a request
    /// the subject ignored.
    Pending,
    /// Subject sent the viewer a request the viewer can act on.
    Request,
    None,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Connected => "CONNECTED",
            Self::Following => "FOLLOWING",
            Self::Pending => "PENDING",
            Self::Request => "REQUEST",
            Self::None => "NONE",
        }
    }
}

/// Connection and follow labels for one viewer/subject pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipView {
    pub connection: RelationshipStatus,
    pub follow: RelationshipStatus,
}
