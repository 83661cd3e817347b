use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TetherError;
use crate::ids::{EdgeId, UserId};

use super::profile::DisplayInfo;

/// Sort key for connection listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    FirstName,
    LastName,
}

impl SortKey {
    /// Lenient parse for caller-supplied keys. Unrecognized keys fall back to
    /// `CreatedAt`.
    pub fn from_param(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first_name" | "firstname" => Self::FirstName,
            "last_name" | "lastname" => Self::LastName,
            _ => Self::CreatedAt,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn from_param(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Self::Asc,
            _ => Self::Desc,
        }
    }
}

/// 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Reject zero pages and clamp the page size to `max_page_size`.
    pub fn validated(self, max_page_size: u32) -> Result<Self, TetherError> {
        if self.page == 0 {
            return Err(TetherError::InvalidArgument("page starts at 1".into()));
        }
        if self.page_size == 0 {
            return Err(TetherError::InvalidArgument("page_size must be > 0".into()));
        }
        Ok(Self {
            page: self.page,
            page_size: self.page_size.min(max_page_size),
        })
    }

    /// `(page - 1) * page_size`
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

/// Parameters for listing a subject's connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionQuery {
    pub page: PageRequest,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_filter: Option<String>,
    /// When set, each row is annotated with whether this viewer is connected
    /// to the listed identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<UserId>,
}

impl ConnectionQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: PageRequest::new(page, page_size),
            sort_by: SortKey::CreatedAt,
            direction: SortDirection::Desc,
            name_filter: None,
            viewer: None,
        }
    }
}

/// One row of a relationship listing: the other participant plus the edge
/// that put them on the list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListedRelationship {
    pub edge_id: EdgeId,
    pub user: DisplayInfo,
    pub since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_connected: Option<bool>,
}

/// A candidate identity annotated with whether the subject is already
/// connected to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub user: DisplayInfo,
    pub connected: bool,
}

/// A page of results plus the total before pagination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            page: request.page,
            page_size: request.page_size,
            total: 0,
        }
    }
}
