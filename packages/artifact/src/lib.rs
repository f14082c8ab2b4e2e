//! Parsing of streamed model replies into project artifacts.
//!
//! A reply is free text with one embedded `<artifact title="...">` block
//! holding `<action filePath="...">` file blocks. The buffer is re-parsed in
//! full on every update, so partial tags and unterminated blocks must never
//! cause an error.

pub mod parser;
pub mod stream;
pub mod types;

pub use parser::{parse, ArtifactGrammar, ArtifactParser};
pub use stream::{ArtifactStream, StreamEvent};
pub use types::{Artifact, FileProgress, FileStatus};
