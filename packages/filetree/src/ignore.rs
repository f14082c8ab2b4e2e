// ABOUTME: Ignore rules that hide generated, binary and config noise from a project tree
// ABOUTME: Patterns come from the project's .stack/ignore file plus a fixed built-in list

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::tree::{FileNode, FileTree};

/// Directory holding project metadata; never shown in filtered output.
pub const STACK_DIR: &str = ".stack";

/// Path of the per-project ignore file inside the tree.
pub const IGNORE_FILE_PATH: &str = ".stack/ignore";

const ALWAYS_IGNORED: &[&str] = &[
    "package-lock.json",
    "tsconfig.json",
    "components.json",
    ".npmrc",
    ".gitignore",
    ".prettierrc",
];

const IGNORED_ROOTS: &[&str] = &["assets", "public"];

static IMAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(png|jpg|jpeg|svg)$").expect("image pattern is valid"));

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Wildcard(Regex),
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        if !raw.contains('*') {
            return Some(Pattern::Exact(raw.to_string()));
        }
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{}$", body)) {
            Ok(regex) => Some(Pattern::Wildcard(regex)),
            Err(e) => {
                warn!("Ignoring invalid ignore pattern '{}': {}", raw, e);
                None
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Exact(exact) => exact == path,
            Pattern::Wildcard(regex) => regex.is_match(path),
        }
    }
}

/// Compiled set of ignore rules for one project.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Rules from explicit pattern lines. Blank lines are skipped; `*` matches
    /// any run of characters and patterns are anchored to the full path.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = lines
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref().trim();
                if line.is_empty() {
                    None
                } else {
                    Pattern::parse(line)
                }
            })
            .collect();
        Self { patterns }
    }

    /// Rules read from the tree's own `.stack/ignore` file, if present.
    pub fn from_tree(tree: &FileTree) -> Self {
        match tree.read_file(IGNORE_FILE_PATH) {
            Some(contents) => Self::new(contents.lines()),
            None => Self::default(),
        }
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        if ALWAYS_IGNORED.contains(&path) {
            return true;
        }
        if IMAGE_FILE.is_match(path) {
            return true;
        }
        if IGNORED_ROOTS
            .iter()
            .any(|root| path == *root || path.starts_with(&format!("{}/", root)))
        {
            return true;
        }
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    /// Copy of `tree` without ignored entries, the `.stack` directory, or
    /// directories left empty by filtering.
    pub fn filter(&self, tree: &FileTree) -> FileTree {
        self.filter_dir(tree, "")
    }

    fn filter_dir(&self, tree: &FileTree, prefix: &str) -> FileTree {
        let mut filtered = FileTree::new();
        for (name, node) in tree.entries() {
            if name == STACK_DIR {
                continue;
            }
            let full_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            if self.is_ignored(&full_path) {
                continue;
            }
            match node {
                FileNode::File { .. } => {
                    filtered.insert_node(name.clone(), node.clone());
                }
                FileNode::Directory(children) => {
                    let children = self.filter_dir(children, &full_path);
                    if !children.is_empty() {
                        filtered.insert_node(name.clone(), FileNode::Directory(children));
                    }
                }
            }
        }
        filtered
    }
}

/// Filter `tree` with the rules declared in its own `.stack/ignore` file.
pub fn filter_ignored(tree: &FileTree) -> FileTree {
    IgnoreRules::from_tree(tree).filter(tree)
}
