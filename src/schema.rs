//! Schema collaborator: where column paths and group assignments come from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row of a grouping answer: the tree named `name` belongs to group
/// `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAssignment {
    /// Group label.
    pub label: String,
    /// Name of a top-level tree.
    pub name: String,
}

impl GroupAssignment {
    /// Create an assignment.
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
        }
    }
}

/// A database-like source of column paths.
///
/// Implementations typically run a schema-listing query and a grouping
/// query against a remote engine; failures come back as
/// [`Error::Schema`](crate::Error::Schema).
pub trait SchemaSource: Send + Sync {
    /// All column paths, dotted.
    fn list_column_paths(&self) -> Result<Vec<String>>;

    /// Assign each of `names` (top-level tree names) to a group. Names the
    /// source cannot place may be left out.
    fn merge_labels(&self, names: &[String]) -> Result<Vec<GroupAssignment>>;
}

impl<S: SchemaSource + ?Sized> SchemaSource for Arc<S> {
    fn list_column_paths(&self) -> Result<Vec<String>> {
        (**self).list_column_paths()
    }

    fn merge_labels(&self, names: &[String]) -> Result<Vec<GroupAssignment>> {
        (**self).merge_labels(names)
    }
}

/// In-memory schema with fixed paths and a fixed grouping table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSchema {
    /// Column paths.
    pub paths: Vec<String>,
    /// Grouping table; only rows whose name is asked for are returned.
    #[serde(default)]
    pub groups: Vec<GroupAssignment>,
}

impl StaticSchema {
    /// Create a schema over `paths` with no grouping.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            groups: Vec::new(),
        }
    }

    /// Add a grouping row.
    pub fn with_group(mut self, label: impl Into<String>, name: impl Into<String>) -> Self {
        self.groups.push(GroupAssignment::new(label, name));
        self
    }

    /// Decode from JSON (`{"paths": [...], "groups": [{"label", "name"}]}`).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl SchemaSource for StaticSchema {
    fn list_column_paths(&self) -> Result<Vec<String>> {
        Ok(self.paths.clone())
    }

    fn merge_labels(&self, names: &[String]) -> Result<Vec<GroupAssignment>> {
        Ok(self
            .groups
            .iter()
            .filter(|g| names.contains(&g.name))
            .cloned()
            .collect())
    }
}
