use colored::*;
use stackpad_artifact::{Artifact, ArtifactGrammar, ArtifactParser, ArtifactStream, StreamEvent};
use std::path::Path;

use super::read_response;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrammarArg {
    /// `<artifact>` / `<action>` tags
    Artifact,
    /// `<stackArtifact>` / `<stackAction>` tags
    Stack,
}

impl GrammarArg {
    pub fn grammar(self) -> ArtifactGrammar {
        match self {
            GrammarArg::Artifact => ArtifactGrammar::default(),
            GrammarArg::Stack => ArtifactGrammar::stack(),
        }
    }
}

pub fn parse_command(file: &Path, grammar: GrammarArg, chunk: Option<usize>) -> anyhow::Result<()> {
    let response = read_response(file)?;
    let parser = ArtifactParser::new(grammar.grammar());

    let artifact = match chunk {
        Some(size) => replay(parser, &response, size),
        None => parser.parse(&response),
    };

    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

/// Feed the response through a stream the way it would arrive from a model,
/// printing each file transition as it happens.
fn replay(parser: ArtifactParser, response: &str, size: usize) -> Artifact {
    let mut stream = ArtifactStream::new(parser);
    for delta in split_chunks(response, size) {
        for event in stream.push(delta) {
            eprintln!("{}", describe_event(&event));
        }
    }
    stream.finish()
}

fn describe_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::FileStarted { path } => format!("{} {}", "writing ".yellow(), path),
        StreamEvent::FileCompleted { path } => format!("{} {}", "complete".green(), path),
    }
}

/// Split `text` into pieces of at most `size` characters. A size of zero is
/// treated as one.
pub fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use stackpad_artifact::FileStatus;

    #[rstest]
    #[case("abcdef", 2, vec!["ab", "cd", "ef"])]
    #[case("abcde", 2, vec!["ab", "cd", "e"])]
    #[case("abc", 10, vec!["abc"])]
    #[case("abc", 0, vec!["a", "b", "c"])]
    #[case("", 3, vec![])]
    fn test_split_chunks(#[case] text: &str, #[case] size: usize, #[case] expected: Vec<&str>) {
        assert_eq!(split_chunks(text, size), expected);
    }

    #[test]
    fn test_split_chunks_respects_char_boundaries() {
        let chunks = split_chunks("héllo wörld", 3);
        assert_eq!(chunks.concat(), "héllo wörld");
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    #[test]
    fn test_grammar_arg_selects_tag_vocabulary() {
        assert_eq!(GrammarArg::Artifact.grammar(), ArtifactGrammar::default());
        assert_eq!(GrammarArg::Stack.grammar(), ArtifactGrammar::stack());
    }

    #[test]
    fn test_replay_matches_whole_parse() {
        let response = "Intro\n<artifact title=\"Demo\">\
            <action type=\"file\" filePath=\"index.html\"><h1>hi</h1></action>\
            <action type=\"file\" filePath=\"src/main.ts\">console.log(1)</action>\
            </artifact>\nDone";
        let grammar = GrammarArg::Artifact.grammar();

        let whole = ArtifactParser::new(grammar.clone()).parse(response);
        let replayed = replay(ArtifactParser::new(grammar), response, 7);

        assert_eq!(replayed, whole);
        assert_eq!(replayed.status_of("src/main.ts"), Some(FileStatus::Completed));
    }
}
