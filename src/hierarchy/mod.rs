//! Path forests: tries built from dotted column names.
//!
//! A schema listing such as
//!
//! ```text
//! station1.temperature.max
//! station1.temperature.min
//! station1.humidity
//! station2.temperature
//! ```
//!
//! becomes a forest hanging off one virtual root:
//!
//! ```text
//! root
//! ├── station1
//! │   ├── temperature
//! │   │   ├── max
//! │   │   └── min
//! │   └── humidity
//! └── station2
//!     └── temperature
//! ```
//!
//! Each top-level tree is one candidate cluster; the merge engine later
//! groups similar top-level trees under synthetic concept nodes.
//!
//! # Module Overview
//!
//! - [`TreeNode`]: owned tree node with path, label, children and optional
//!   embedding; iterative traversal, path rewriting, shape equality and
//!   [`Outline`] flattening.
//! - [`PathForest`]: trie construction, optionally parallel across
//!   top-level trees.
//! - [`validate_forest`] / [`HealthCheck`]: structural health reports.

mod forest;
mod node;
mod validate;

pub use forest::{PathForest, DEFAULT_ROOT_LABEL};
pub use node::{Iter, Outline, OutlineRow, TreeNode};
pub use validate::{
    validate_forest, validate_links, HealthCheck, HealthReport, Severity,
    ValidationIssue, ValidationReport,
};
