//! Stored resource types.
//!
//! This module defines the [`StoredResource`] type, which wraps FHIR resources
//! with persistence metadata such as version and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A FHIR resource with persistence metadata.
///
/// # Examples
///
/// ```
/// use fhir_access_persistence::types::StoredResource;
/// use serde_json::json;
///
/// let resource = StoredResource::new(
///     "Task",
///     "123",
///     json!({"resourceType": "Task", "id": "123"}),
/// );
///
/// assert_eq!(resource.url(), "Task/123");
/// assert_eq!(resource.version_id(), "1");
/// assert_eq!(resource.versioned_url(), "Task/123/_history/1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    resource_type: String,
    id: String,
    version_id: String,
    content: Value,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl StoredResource {
    /// Creates a first version of a resource, timestamped now.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, content: Value) -> Self {
        let now = Utc::now();
        Self::from_storage(resource_type, id, "1", content, now, now)
    }

    /// Creates a stored resource from existing data (e.g., loaded from database).
    pub fn from_storage(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version_id: impl Into<String>,
        content: Value,
        created_at: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: version_id.into(),
            content,
            created_at,
            last_modified,
        }
    }

    /// Returns the FHIR resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the resource's logical ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version ID.
    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    /// Returns the resource content as JSON.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Returns when the resource was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the resource was last modified.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns the relative URL of this resource (e.g., "Task/123").
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Returns the versioned URL (e.g., "Task/123/_history/2").
    pub fn versioned_url(&self) -> String {
        format!("{}/{}/_history/{}", self.resource_type, self.id, self.version_id)
    }
}
