// ABOUTME: Recursive project file tree with path-based construction helpers
// ABOUTME: Serializes to the nested {"file":{"contents"}} / {"directory":{..}} shape used by sandboxes and storage

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Result, TreeError};

/// A single entry in a [`FileTree`].
///
/// Externally tagged so that a file serializes as `{"file":{"contents":"..."}}`
/// and a directory as `{"directory":{...children...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileNode {
    #[serde(rename = "file")]
    File { contents: String },
    #[serde(rename = "directory")]
    Directory(FileTree),
}

impl FileNode {
    pub fn file(contents: impl Into<String>) -> Self {
        FileNode::File {
            contents: contents.into(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FileNode::File { .. })
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FileNode::Directory(_))
    }
}

/// The children of one directory, keyed by entry name.
///
/// The root of a project is itself a `FileTree`. Names are unique within a
/// directory and kept in sorted order so that snapshots and serialized output
/// are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    entries: BTreeMap<String, FileNode>,
}

/// Split a '/'-separated path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree holding a single file at `path`, with every intermediate
    /// directory created.
    pub fn from_file(path: &str, contents: impl Into<String>) -> Result<Self> {
        let mut tree = Self::new();
        tree.insert_file(path, contents)?;
        Ok(tree)
    }

    /// Write a file at `path`, creating intermediate directories as needed.
    ///
    /// A file sitting where a directory is required is replaced by an empty
    /// directory, and an existing entry at the final segment is overwritten,
    /// so repeated writes to the same path are last-write-wins.
    pub fn insert_file(&mut self, path: &str, contents: impl Into<String>) -> Result<()> {
        let segments = path_segments(path);
        let Some((file_name, dirs)) = segments.split_last() else {
            return Err(TreeError::EmptyPath {
                path: path.to_string(),
            });
        };

        self.insert_at(dirs, file_name, contents.into());
        Ok(())
    }

    fn insert_at(&mut self, dirs: &[&str], file_name: &str, contents: String) {
        let Some((dir, rest)) = dirs.split_first() else {
            self.entries
                .insert(file_name.to_string(), FileNode::file(contents));
            return;
        };
        let entry = self
            .entries
            .entry((*dir).to_string())
            .or_insert_with(|| FileNode::Directory(FileTree::new()));
        match entry {
            FileNode::Directory(children) => children.insert_at(rest, file_name, contents),
            FileNode::File { .. } => {
                let mut children = FileTree::new();
                children.insert_at(rest, file_name, contents);
                *entry = FileNode::Directory(children);
            }
        }
    }

    /// Insert a raw node under a single entry name.
    pub fn insert_node(&mut self, name: impl Into<String>, node: FileNode) -> Option<FileNode> {
        self.entries.insert(name.into(), node)
    }

    /// Look up the node at `path`.
    pub fn get(&self, path: &str) -> Option<&FileNode> {
        let segments = path_segments(path);
        let (last, dirs) = segments.split_last()?;
        let mut current = self;
        for dir in dirs {
            match current.entries.get(*dir)? {
                FileNode::Directory(children) => current = children,
                FileNode::File { .. } => return None,
            }
        }
        current.entries.get(*last)
    }

    /// Contents of the file at `path`, if it exists and is a file.
    pub fn read_file(&self, path: &str) -> Option<&str> {
        match self.get(path)? {
            FileNode::File { contents } => Some(contents.as_str()),
            FileNode::Directory(_) => None,
        }
    }

    /// Remove and return the node at `path`.
    pub fn remove(&mut self, path: &str) -> Option<FileNode> {
        let segments = path_segments(path);
        let (last, dirs) = segments.split_last()?;
        let mut current = self;
        for dir in dirs {
            match current.entries.get_mut(*dir)? {
                FileNode::Directory(children) => current = children,
                FileNode::File { .. } => return None,
            }
        }
        current.entries.remove(*last)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FileNode)> {
        self.entries.iter()
    }

    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every file in the tree as `(full_path, contents)`, depth-first in name order.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in &self.entries {
            let full_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            match node {
                FileNode::File { contents } => out.push((full_path, contents.as_str())),
                FileNode::Directory(children) => children.collect_files(&full_path, out),
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                FileNode::File { .. } => 1,
                FileNode::Directory(children) => children.file_count(),
            })
            .sum()
    }
}

impl FromIterator<(String, FileNode)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (String, FileNode)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_file_builds_nested_directories() {
        let tree = FileTree::from_file("src/app/page.tsx", "X").unwrap();
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "src": {"directory": {
                    "app": {"directory": {
                        "page.tsx": {"file": {"contents": "X"}}
                    }}
                }}
            })
        );
    }

    #[test]
    fn test_insert_file_last_write_wins() {
        let mut tree = FileTree::new();
        tree.insert_file("a/b.ts", "first").unwrap();
        tree.insert_file("a/b.ts", "second").unwrap();
        assert_eq!(tree.read_file("a/b.ts"), Some("second"));
        assert_eq!(tree.file_count(), 1);
    }

    #[test]
    fn test_insert_file_replaces_file_with_directory() {
        let mut tree = FileTree::new();
        tree.insert_file("a", "was a file").unwrap();
        tree.insert_file("a/b.ts", "nested").unwrap();
        assert!(tree.get("a").unwrap().is_directory());
        assert_eq!(tree.read_file("a/b.ts"), Some("nested"));
    }

    #[test]
    fn test_insert_file_replaces_nested_file_on_the_way_down() {
        let mut tree = FileTree::new();
        tree.insert_file("src/lib", "stale").unwrap();
        tree.insert_file("src/main.ts", "main").unwrap();
        tree.insert_file("src/lib/util/fmt.ts", "fmt").unwrap();

        assert!(tree.get("src/lib").unwrap().is_directory());
        assert!(tree.get("src/lib/util").unwrap().is_directory());
        assert_eq!(tree.read_file("src/lib/util/fmt.ts"), Some("fmt"));
        assert_eq!(tree.read_file("src/main.ts"), Some("main"));
        assert_eq!(tree.file_count(), 2);
    }

    #[test]
    fn test_insert_file_ignores_empty_segments() {
        let tree = FileTree::from_file("/src//main.ts", "x").unwrap();
        assert_eq!(tree.read_file("src/main.ts"), Some("x"));
    }

    #[test]
    fn test_insert_file_rejects_empty_path() {
        let mut tree = FileTree::new();
        assert!(matches!(
            tree.insert_file("//", "x"),
            Err(TreeError::EmptyPath { .. })
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_get_through_file_is_none() {
        let tree = FileTree::from_file("a.ts", "x").unwrap();
        assert!(tree.get("a.ts/b.ts").is_none());
        assert!(tree.read_file("missing").is_none());
    }

    #[test]
    fn test_remove() {
        let mut tree = FileTree::from_file("src/a.ts", "a").unwrap();
        tree.insert_file("src/b.ts", "b").unwrap();
        assert_eq!(tree.remove("src/a.ts"), Some(FileNode::file("a")));
        assert_eq!(tree.files(), vec![("src/b.ts".to_string(), "b")]);
    }

    #[test]
    fn test_files_are_listed_in_path_order() {
        let mut tree = FileTree::new();
        tree.insert_file("src/z.ts", "z").unwrap();
        tree.insert_file("package.json", "{}").unwrap();
        tree.insert_file("src/a.ts", "a").unwrap();
        let paths: Vec<String> = tree.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["package.json", "src/a.ts", "src/z.ts"]);
    }

    #[test]
    fn test_deserialize_nested_shape() {
        let tree: FileTree = serde_json::from_value(json!({
            "package.json": {"file": {"contents": "{}"}},
            "src": {"directory": {"index.ts": {"file": {"contents": "run()"}}}}
        }))
        .unwrap();
        assert_eq!(tree.read_file("src/index.ts"), Some("run()"));
        assert_eq!(tree.file_count(), 2);
    }
}
