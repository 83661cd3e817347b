use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TetherError;
use crate::ids::{EdgeId, UserId};

/// Kind of a relationship edge. Doubles as the state-machine tag for the
/// connection track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Connection requested, awaiting the target's answer.
    Pending,
    /// Mutually accepted connection. Undirected for querying purposes.
    Connected,
    /// Target dismissed the request. Still occupies the pair's slot.
    Ignored,
    /// One-way follow. Lives on its own track.
    Following,
    Blocked,
}

/// The two independent uniqueness tracks an edge can occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// At most one edge per unordered pair.
    Connection,
    /// At most one edge per directed pair.
    Following,
}

impl Track {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Following => "following",
        }
    }
}

impl EdgeKind {
    /// Kinds sharing the unordered-pair connection slot.
    pub const CONNECTION_TRACK: [EdgeKind; 4] =
        [Self::Pending, Self::Connected, Self::Ignored, Self::Blocked];

    pub fn track(&self) -> Track {
        match self {
            Self::Following => Track::Following,
            _ => Track::Connection,
        }
    }

    /// In-place transitions allowed by the state machine. Everything else is
    /// delete-and-recreate or not allowed at all.
    pub fn can_transition_to(&self, next: EdgeKind) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Connected) | (Self::Pending, Self::Ignored)
        )
    }

    /// Returns the string representation used in PostgreSQL.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Ignored => "ignored",
            Self::Following => "following",
            Self::Blocked => "blocked",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "connected" => Some(Self::Connected),
            "ignored" => Some(Self::Ignored),
            "following" => Some(Self::Following),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A directed relationship edge between two identities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: EdgeId,
    pub initiator: UserId,
    pub target: UserId,
    pub kind: EdgeKind,
    /// Creation time; re-stamped when a request is accepted.
    pub created_at: DateTime<Utc>,
    /// Whether connection counters were applied for this edge.
    /// Only ever true on `Connected` edges.
    #[serde(default)]
    pub counters_applied: bool,
}

impl RelationshipEdge {
    /// Build a fresh edge. Self-edges are rejected here so they can never
    /// reach the store.
    pub fn new(initiator: UserId, target: UserId, kind: EdgeKind) -> Result<Self, TetherError> {
        if initiator == target {
            return Err(TetherError::InvalidArgument(format!(
                "identity {} cannot hold a {} edge to itself",
                initiator,
                kind.as_db_str()
            )));
        }

        Ok(Self {
            id: EdgeId::new(),
            initiator,
            target,
            kind,
            created_at: Utc::now(),
            counters_applied: false,
        })
    }

    pub fn track(&self) -> Track {
        self.kind.track()
    }

    /// Uniqueness key for the edge's track: the unordered pair for the
    /// connection track, the directed pair for follows.
    pub fn slot_key(&self) -> (UserId, UserId) {
        match self.track() {
            Track::Connection => pair_key(self.initiator, self.target),
            Track::Following => (self.initiator, self.target),
        }
    }

    pub fn touches(&self, user: UserId) -> bool {
        self.initiator == user || self.target == user
    }

    /// The participant that isn't `subject`. Returns `None` if `subject` is
    /// not on this edge.
    pub fn other_party(&self, subject: UserId) -> Option<UserId> {
        if self.initiator == subject {
            Some(self.target)
        } else if self.target == subject {
            Some(self.initiator)
        } else {
            None
        }
    }
}

/// Canonical ordering of an unordered pair: `(min, max)`.
pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
