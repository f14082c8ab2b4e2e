// ABOUTME: Tolerant parser turning a possibly-incomplete model reply into an Artifact
// ABOUTME: Re-parsing a longer prefix never un-completes a file that was already completed

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use stackpad_filetree::FileTree;

use crate::types::{Artifact, FileProgress, FileStatus};

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

const FILE_PATH_ATTRIBUTE: &str = "filePath";
const TITLE_ATTRIBUTE: &str = "title";

/// Tag names delimiting the artifact and its file blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactGrammar {
    pub artifact_tag: String,
    pub action_tag: String,
}

impl Default for ArtifactGrammar {
    fn default() -> Self {
        Self::new("artifact", "action")
    }
}

impl ArtifactGrammar {
    pub fn new(artifact_tag: impl Into<String>, action_tag: impl Into<String>) -> Self {
        Self {
            artifact_tag: artifact_tag.into(),
            action_tag: action_tag.into(),
        }
    }

    /// `<stackArtifact>` / `<stackAction>` markers used by the hosted prompt.
    pub fn stack() -> Self {
        Self::new("stackArtifact", "stackAction")
    }
}

/// One `<action filePath=...>` block found in the buffer.
#[derive(Debug)]
struct ActionBlock<'a> {
    path: &'a str,
    content: &'a str,
    completed: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactParser {
    grammar: ArtifactGrammar,
    artifact_open: String,
    artifact_close: String,
    action_open: String,
    action_close: String,
}

impl Default for ArtifactParser {
    fn default() -> Self {
        Self::new(ArtifactGrammar::default())
    }
}

impl ArtifactParser {
    pub fn new(grammar: ArtifactGrammar) -> Self {
        Self {
            artifact_open: format!("<{}", grammar.artifact_tag),
            artifact_close: format!("</{}>", grammar.artifact_tag),
            action_open: format!("<{}", grammar.action_tag),
            action_close: format!("</{}>", grammar.action_tag),
            grammar,
        }
    }

    pub fn grammar(&self) -> &ArtifactGrammar {
        &self.grammar
    }

    /// Parse the full buffer received so far. Never fails: missing or
    /// truncated markup yields empty fields or `Processing` files.
    pub fn parse(&self, buffer: &str) -> Artifact {
        let artifact_start = find_open_tag(buffer, &self.artifact_open, 0);

        let introduction = match artifact_start {
            Some(start) => buffer[..start].trim(),
            None => strip_partial_marker(buffer, &self.artifact_open).trim(),
        };

        let title = artifact_start
            .map(|start| {
                let tag = opening_tag_text(buffer, start + self.artifact_open.len());
                attribute(tag, TITLE_ATTRIBUTE).unwrap_or_default()
            })
            .unwrap_or_default();

        let mut file_tree = FileTree::new();
        let mut file_progress: Vec<FileProgress> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for block in self.action_blocks(buffer) {
            if let Err(e) = file_tree.insert_file(block.path, block.content) {
                debug!("Skipping file block: {}", e);
                continue;
            }
            let status = if block.completed {
                FileStatus::Completed
            } else {
                FileStatus::Processing
            };
            match positions.get(block.path) {
                Some(&index) => {
                    if status == FileStatus::Completed {
                        file_progress[index].status = FileStatus::Completed;
                    }
                }
                None => {
                    positions.insert(block.path.to_string(), file_progress.len());
                    file_progress.push(FileProgress {
                        path: block.path.to_string(),
                        status,
                    });
                }
            }
        }

        let conclusion = buffer
            .rfind(&self.artifact_close)
            .map(|end| buffer[end + self.artifact_close.len()..].trim())
            .unwrap_or_default();

        Artifact {
            introduction: introduction.to_string(),
            title,
            file_tree,
            file_progress,
            conclusion: conclusion.to_string(),
        }
    }

    fn action_blocks<'a>(&self, buffer: &'a str) -> Vec<ActionBlock<'a>> {
        let mut blocks = Vec::new();
        let mut cursor = 0;

        while let Some(open) = find_open_tag(buffer, &self.action_open, cursor) {
            let name_end = open + self.action_open.len();
            // Opening tag still streaming; nothing after it can be parsed yet.
            let Some(tag_len) = buffer[name_end..].find('>') else {
                break;
            };
            let tag_end = name_end + tag_len;
            let content_start = tag_end + 1;

            let close = find_from(buffer, &self.action_close, content_start);
            let end = [
                find_open_tag(buffer, &self.action_open, content_start),
                close,
                find_from(buffer, &self.artifact_close, content_start),
            ]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(buffer.len());

            let closed = close == Some(end);
            let raw = buffer[content_start..end].trim();
            let content = if closed {
                raw
            } else {
                strip_dangling_tag(raw).trim_end()
            };

            cursor = if closed {
                end + self.action_close.len()
            } else {
                end
            };

            match attribute_slice(&buffer[name_end..tag_end], FILE_PATH_ATTRIBUTE) {
                Some(path) if !path.is_empty() => {
                    blocks.push(ActionBlock {
                        path,
                        content,
                        completed: closed && !content.is_empty(),
                    });
                }
                _ => debug!("Skipping action block without a file path at byte {}", open),
            }

            if cursor >= buffer.len() {
                break;
            }
        }

        blocks
    }
}

/// Parse with the default `<artifact>` / `<action>` grammar.
pub fn parse(buffer: &str) -> Artifact {
    ArtifactParser::default().parse(buffer)
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|i| from + i)
}

/// Position of `marker` followed by a tag boundary (whitespace, `>` or `/`).
/// A marker at the very end of the buffer also counts since the boundary may
/// not have arrived yet.
fn find_open_tag(haystack: &str, marker: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(found) = find_from(haystack, marker, search) {
        match haystack[found + marker.len()..].chars().next() {
            None => return Some(found),
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => return Some(found),
            Some(_) => search = found + marker.len(),
        }
    }
    None
}

/// Text of an opening tag starting right after its name, up to `>` or the
/// end of the buffer.
fn opening_tag_text(buffer: &str, name_end: usize) -> &str {
    let rest = &buffer[name_end..];
    match rest.find('>') {
        Some(end) => &rest[..end],
        None => rest,
    }
}

fn attribute_slice<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        if caps.get(1).map(|m| m.as_str()) != Some(name) {
            return None;
        }
        caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str())
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    attribute_slice(tag, name).map(str::to_string)
}

/// Drop a trailing `<...` fragment that has not been closed with `>` yet.
fn strip_dangling_tag(content: &str) -> &str {
    match content.rfind('<') {
        Some(start) if !content[start..].contains('>') => &content[..start],
        _ => content,
    }
}

/// Drop a trailing prefix of `marker`, e.g. `<arti` while `<artifact` is
/// still arriving.
fn strip_partial_marker<'a>(buffer: &'a str, marker: &str) -> &'a str {
    // Prefix lengths must fall on char boundaries for non-ASCII tag names.
    marker
        .char_indices()
        .rev()
        .map(|(len, _)| len)
        .filter(|&len| len > 0)
        .find(|&len| buffer.ends_with(&marker[..len]))
        .map(|len| &buffer[..buffer.len() - len])
        .unwrap_or(buffer)
}
