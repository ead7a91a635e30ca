use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid DBLP person id: {0}")]
    #[diagnostic(help("expected a pid such as `d/DoeJ` or a profile URL like https://dblp.org/pid/d/DoeJ.html"))]
    InvalidPid(String),

    #[error("no usable profile data for {0}")]
    ProfileFetch(String),

    #[error("DBLP request failed: {0}")]
    DblpHttp(String),

    #[error("DBLP returned status {status}: {message}")]
    DblpStatus { status: u16, message: String },

    #[error("failed to parse DBLP profile: {0}")]
    ProfileParse(String),

    #[error("note {path} is occupied by another record (key {key})")]
    WriteCollision { path: String, key: String },

    #[error("note has no well-formed metadata block: {0}")]
    MalformedNote(String),

    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}
