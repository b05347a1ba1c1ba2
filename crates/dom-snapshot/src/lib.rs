//! Document snapshots for locator healing.
//!
//! A [`Document`] is a flat arena of nodes built either from page source
//! (lenient HTML parsing) or from a captured DOM snapshot that also carries
//! element geometry. Locators are resolved against it with small CSS and
//! XPath engines covering the selector shapes automated tests use.

pub mod css;
pub mod document;
pub mod errors;
pub mod html;
pub mod query;
pub mod snapshot;
pub mod style;
pub mod xpath;

pub use document::{normalize_whitespace, Document, Node, NodeId, NodeKind, Rect, XPathIndex};
pub use errors::{DomError, QueryError};
pub use query::{resolve, resolve_str};
pub use snapshot::SnapshotNode;
