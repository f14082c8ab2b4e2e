// ABOUTME: Accumulates streamed reply deltas and reports file start/completion transitions
// ABOUTME: Each push re-parses the whole buffer so output is always a pure function of the text so far

use serde::Serialize;

use crate::parser::ArtifactParser;
use crate::types::{Artifact, FileStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    FileStarted { path: String },
    FileCompleted { path: String },
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactStream {
    parser: ArtifactParser,
    buffer: String,
    artifact: Artifact,
}

impl ArtifactStream {
    pub fn new(parser: ArtifactParser) -> Self {
        Self {
            parser,
            buffer: String::new(),
            artifact: Artifact::default(),
        }
    }

    /// Append a delta and return the transitions it caused, in file order.
    pub fn push(&mut self, delta: &str) -> Vec<StreamEvent> {
        if delta.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(delta);
        let next = self.parser.parse(&self.buffer);

        let mut events = Vec::new();
        for file in &next.file_progress {
            let before = self.artifact.status_of(&file.path);
            if before.is_none() {
                events.push(StreamEvent::FileStarted {
                    path: file.path.clone(),
                });
            }
            if file.status == FileStatus::Completed && before != Some(FileStatus::Completed) {
                events.push(StreamEvent::FileCompleted {
                    path: file.path.clone(),
                });
            }
        }

        self.artifact = next;
        events
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn finish(self) -> Artifact {
        self.artifact
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.artifact = Artifact::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ArtifactGrammar;
    use pretty_assertions::assert_eq;

    fn started(path: &str) -> StreamEvent {
        StreamEvent::FileStarted {
            path: path.to_string(),
        }
    }

    fn done(path: &str) -> StreamEvent {
        StreamEvent::FileCompleted {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_events_follow_chunk_boundaries() {
        let mut stream = ArtifactStream::default();

        assert_eq!(stream.push("Intro <artifact title=\"X\">"), vec![]);
        assert_eq!(stream.push("<action filePath=\"a.ts\">con"), vec![started("a.ts")]);
        assert_eq!(stream.push("st a = 1;</act"), vec![]);
        assert_eq!(stream.push("ion>"), vec![done("a.ts")]);
        assert_eq!(
            stream.push("<action filePath=\"b.ts\">b</action></artifact>"),
            vec![started("b.ts"), done("b.ts")]
        );
        assert_eq!(stream.push(" bye"), vec![]);

        let artifact = stream.finish();
        assert_eq!(artifact.title, "X");
        assert_eq!(artifact.introduction, "Intro");
        assert_eq!(artifact.conclusion, "bye");
        assert_eq!(artifact.file_tree.read_file("a.ts"), Some("const a = 1;"));
    }

    #[test]
    fn test_single_chunk_reports_start_and_completion() {
        let mut stream = ArtifactStream::new(ArtifactParser::new(ArtifactGrammar::stack()));
        let events = stream.push("<stackArtifact><stackAction filePath=\"x\">1</stackAction>");
        assert_eq!(events, vec![started("x"), done("x")]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut stream = ArtifactStream::default();
        stream.push("<artifact><action filePath=\"a\">1</action>");
        stream.reset();
        assert_eq!(stream.buffer(), "");
        assert!(!stream.artifact().has_files());
        assert_eq!(
            stream.push("<artifact><action filePath=\"a\">2"),
            vec![started("a")]
        );
    }
}
