//! Search query types.

use serde::{Deserialize, Serialize};

/// Sort parameters understood by every backend.
pub const SORTABLE_PARAMETERS: &[&str] = &["_id", "_lastUpdated"];

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    /// The parameter to sort by.
    pub parameter: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortDirective {
    /// Parses a sort parameter value (e.g., "-_lastUpdated" for descending).
    pub fn parse(s: &str) -> Self {
        if let Some(stripped) = s.strip_prefix('-') {
            Self {
                parameter: stripped.to_string(),
                direction: SortDirection::Descending,
            }
        } else {
            Self {
                parameter: s.to_string(),
                direction: SortDirection::Ascending,
            }
        }
    }

    /// Returns `true` if the parameter is one of [`SORTABLE_PARAMETERS`].
    pub fn is_supported(&self) -> bool {
        SORTABLE_PARAMETERS.contains(&self.parameter.as_str())
    }
}

/// A type-level search restricted by the caller's read access.
///
/// Only `_id` filtering is supported besides the access filter; search
/// parameter evaluation belongs to the surrounding server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The resource type being searched.
    pub resource_type: String,

    /// Restrict to these logical ids (`_id`). Empty means no restriction.
    pub ids: Vec<String>,

    /// Sort directives, applied in order.
    pub sort: Vec<SortDirective>,

    /// Page size (`_count`).
    pub count: Option<u32>,

    /// Number of matches to skip.
    pub offset: Option<u32>,
}

impl SearchQuery {
    /// Creates a query over all resources of `resource_type`.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Restricts the query to the given id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    /// Adds a sort directive.
    pub fn with_sort(mut self, sort: SortDirective) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the page size.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}
