//! Stackpad file trees.
//!
//! A project is a nested tree of named files and directories. This crate
//! provides the tree model itself, path-based construction, the overlay
//! [`merge`] used to apply generated files on top of an existing project, and
//! the conversions to and from flat starter templates.

pub mod ignore;
pub mod merge;
pub mod template;
pub mod tree;

pub use ignore::{filter_ignored, IgnoreRules};
pub use merge::merge;
pub use template::{tree_from_template, tree_to_template};
pub use tree::{path_segments, FileNode, FileTree};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Path has no file name: '{path}'")]
    EmptyPath { path: String },
}

pub type Result<T> = std::result::Result<T, TreeError>;
