//! # pushlog-diff
//!
//! Entity-aware diffs of localization resource files.
//!
//! Files are parsed into ordered `key -> text` entities (`.properties`,
//! Fluent `.ftl`, and `.dtd`), compared entity by entity, and each changed
//! value is aligned word by word with character-level refinement.
//!
//! ## Key Types
//!
//! - [`ResourceFormat`] - Format dispatch by file extension
//! - [`EntityDiffEngine`] - Per-path entity records between two revisions
//! - [`FileDiff`] - Result for one path, including the "cannot parse" case
//! - [`DataTree`] - Results nested by path segment, serializable to JSON
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushlog_diff::EntityDiffEngine;
//! use pushlog_vcs::PathTracker;
//!
//! let changed = PathTracker::new(repo.as_ref()).paths("abc123", "tip")?;
//! let tree = EntityDiffEngine::new(repo.as_ref(), &changed).diff_tree()?;
//! println!("{}", serde_json::to_string_pretty(&tree)?);
//! ```

mod engine;
mod format;
mod tokens;
mod tree;

pub use engine::{
    build_tree, diff_entities, DiffValue, EntityClass, EntityDiff, EntityDiffEngine, FileClass,
    FileDiff,
};
pub use format::{decode, Entities, ParseError, ResourceFormat};
pub use tokens::{diff_tokens, Token, TokenClass};
pub use tree::{DataTree, Node};
